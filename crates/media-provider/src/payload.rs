//! Submit payload construction from batch settings and the model's field mapping.

use crate::{ModelSpec, ProviderError};
use media_types::{BatchSettings, ModelParams};
use serde_json::{json, Map, Value};

/// Keys the client owns. Values under these names in `extra` are dropped so they can never
/// contradict the model's mapping (e.g. `guidance_scale` reaching a `cfg_scale` model).
const MANAGED_KEYS: &[&str] = &[
    "prompt",
    "seed",
    "negative_prompt",
    "guidance_scale",
    "cfg_scale",
    "guidance",
    "image",
    "images",
    "end_image",
    "last_image",
    "tail_image",
    "reference_images",
];

fn is_managed(spec: &ModelSpec, key: &str) -> bool {
    MANAGED_KEYS.contains(&key)
        || spec.guidance_field.as_deref() == Some(key)
        || spec.end_image_field.as_deref() == Some(key)
        || spec.reference_field.as_deref() == Some(key)
}

/// Build the JSON body for `spec` from task settings.
///
/// Fails with [`ProviderError::Configuration`] when the settings' parameter kind does not match
/// the model family. Parameters the model does not support are dropped, not sent.
pub fn build_payload(
    spec: &ModelSpec,
    settings: &BatchSettings,
) -> Result<Map<String, Value>, ProviderError> {
    if settings.params.family() != spec.family {
        return Err(ProviderError::Configuration(format!(
            "model {} takes {} parameters, got {}",
            spec.id,
            spec.family.as_str(),
            settings.params.family().as_str()
        )));
    }

    let mut body = Map::new();
    body.insert("prompt".to_string(), json!(settings.prompt));
    if let Some(seed) = settings.seed {
        body.insert("seed".to_string(), json!(seed));
    }
    if let Some(neg) = settings.params.negative_prompt() {
        body.insert("negative_prompt".to_string(), json!(neg));
    }
    if let Some(guidance) = settings.params.guidance() {
        match spec.guidance_field {
            Some(ref field) => {
                body.insert(field.clone(), json!(guidance));
            }
            None => tracing::debug!(model = %spec.id, "model has no guidance field; dropped"),
        }
    }

    let primary = settings.params.image();
    let references = settings.params.reference_images();
    match spec.reference_field {
        Some(ref field) => {
            let images: Vec<&str> = primary
                .into_iter()
                .chain(references.iter().map(String::as_str))
                .collect();
            if !images.is_empty() {
                body.insert(field.clone(), json!(images));
            }
        }
        None => {
            if let Some(image) = primary {
                body.insert("image".to_string(), json!(image));
            }
            if !references.is_empty() {
                tracing::warn!(
                    model = %spec.id,
                    dropped = references.len(),
                    "model takes a single image; reference images dropped"
                );
            }
        }
    }

    match settings.params {
        ModelParams::Image(ref p) => {
            if let (Some(w), Some(h)) = (p.width, p.height) {
                body.insert("size".to_string(), json!(format!("{}*{}", w, h)));
            }
            if let Some(ref ar) = p.aspect_ratio {
                body.insert("aspect_ratio".to_string(), json!(ar));
            }
        }
        ModelParams::Video(ref p) => {
            if let Some(d) = p.duration {
                body.insert("duration".to_string(), json!(d));
            }
            if let Some(ref r) = p.resolution {
                body.insert("resolution".to_string(), json!(r));
            }
            if let Some(ref ar) = p.aspect_ratio {
                body.insert("aspect_ratio".to_string(), json!(ar));
            }
            if let Some(ref end) = p.end_image {
                match spec.end_image_field {
                    Some(ref field) => {
                        body.insert(field.clone(), json!(end));
                    }
                    None => {
                        tracing::debug!(model = %spec.id, "model has no end image field; dropped")
                    }
                }
            }
        }
    }

    for (key, value) in &settings.extra {
        if is_managed(spec, key) || body.contains_key(key) {
            tracing::warn!(model = %spec.id, key = %key, "extra parameter shadows a managed field; dropped");
            continue;
        }
        body.insert(key.clone(), value.clone());
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_types::{ImageParams, VideoParams};

    fn image_settings(params: ImageParams) -> BatchSettings {
        let mut s = BatchSettings::new("a red fox", "m", 1);
        s.params = ModelParams::Image(params);
        s
    }

    fn video_settings(params: VideoParams) -> BatchSettings {
        let mut s = BatchSettings::new("waves at dusk", "m", 1);
        s.params = ModelParams::Video(params);
        s
    }

    #[test]
    fn guidance_goes_to_the_configured_field_only() {
        let settings = image_settings(ImageParams {
            guidance: Some(7.5),
            ..Default::default()
        });

        let cfg = ModelSpec::image("cfg-model", "x/cfg").guidance_field("cfg_scale");
        let body = build_payload(&cfg, &settings).unwrap();
        assert_eq!(body["cfg_scale"], json!(7.5));
        assert!(!body.contains_key("guidance_scale"));

        let gs = ModelSpec::image("gs-model", "x/gs").guidance_field("guidance_scale");
        let body = build_payload(&gs, &settings).unwrap();
        assert_eq!(body["guidance_scale"], json!(7.5));
        assert!(!body.contains_key("cfg_scale"));

        let none = ModelSpec::image("plain", "x/plain");
        let body = build_payload(&none, &settings).unwrap();
        assert!(!body.contains_key("cfg_scale") && !body.contains_key("guidance_scale"));
    }

    #[test]
    fn extra_cannot_smuggle_the_other_guidance_field() {
        let mut settings = image_settings(ImageParams {
            guidance: Some(4.0),
            ..Default::default()
        });
        settings.extra.insert("guidance_scale".into(), json!(9));
        settings.extra.insert("prompt".into(), json!("override"));
        settings.extra.insert("num_inference_steps".into(), json!(28));

        let cfg = ModelSpec::image("cfg-model", "x/cfg").guidance_field("cfg_scale");
        let body = build_payload(&cfg, &settings).unwrap();
        assert!(!body.contains_key("guidance_scale"));
        assert_eq!(body["prompt"], json!("a red fox"));
        assert_eq!(body["num_inference_steps"], json!(28));
    }

    #[test]
    fn end_image_uses_model_field_or_is_dropped() {
        let settings = video_settings(VideoParams {
            image: Some("https://in/first.png".into()),
            end_image: Some("https://in/last.png".into()),
            duration: Some(5),
            ..Default::default()
        });

        let kling = ModelSpec::video("k", "k").end_image_field("end_image");
        let body = build_payload(&kling, &settings).unwrap();
        assert_eq!(body["end_image"], json!("https://in/last.png"));
        assert_eq!(body["image"], json!("https://in/first.png"));
        assert_eq!(body["duration"], json!(5));

        let wan = ModelSpec::video("w", "w").end_image_field("last_image");
        let body = build_payload(&wan, &settings).unwrap();
        assert_eq!(body["last_image"], json!("https://in/last.png"));
        assert!(!body.contains_key("end_image"));

        let plain = ModelSpec::video("p", "p");
        let body = build_payload(&plain, &settings).unwrap();
        assert!(!body.contains_key("end_image") && !body.contains_key("last_image"));
    }

    #[test]
    fn multi_reference_models_get_one_ordered_array() {
        let settings = image_settings(ImageParams {
            image: Some("https://in/main.png".into()),
            reference_images: vec!["https://in/r1.png".into(), "https://in/r2.png".into()],
            ..Default::default()
        });

        let edit = ModelSpec::image("edit", "e").reference_field("images");
        let body = build_payload(&edit, &settings).unwrap();
        assert_eq!(
            body["images"],
            json!(["https://in/main.png", "https://in/r1.png", "https://in/r2.png"])
        );
        assert!(!body.contains_key("image"));

        let single = ModelSpec::image("single", "s");
        let body = build_payload(&single, &settings).unwrap();
        assert_eq!(body["image"], json!("https://in/main.png"));
        assert!(!body.contains_key("images"));
    }

    #[test]
    fn seed_size_and_family_mismatch() {
        let mut settings = image_settings(ImageParams {
            width: Some(1024),
            height: Some(768),
            ..Default::default()
        });
        settings.seed = Some(42);
        let spec = ModelSpec::image("i", "i");
        let body = build_payload(&spec, &settings).unwrap();
        assert_eq!(body["seed"], json!(42));
        assert_eq!(body["size"], json!("1024*768"));

        settings.seed = None;
        let body = build_payload(&spec, &settings).unwrap();
        assert!(!body.contains_key("seed"));

        let video = ModelSpec::video("v", "v");
        assert!(matches!(
            build_payload(&video, &settings),
            Err(ProviderError::Configuration(_))
        ));
    }
}
