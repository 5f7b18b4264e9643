//! Model table: endpoint paths, aliases and per-model wire field names.

use media_types::ModelFamily;
use std::time::Duration;

/// How often and how long to poll for a job result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Video: 2s x 180 (~6 min). Image: 5s x 60 (~5 min).
    pub fn default_for(family: ModelFamily) -> Self {
        match family {
            ModelFamily::Video => Self::new(Duration::from_secs(2), 180),
            ModelFamily::Image => Self::new(Duration::from_secs(5), 60),
        }
    }
}

/// One model as the provider exposes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Canonical id.
    pub id: String,
    /// Short names accepted in place of `id`.
    pub aliases: Vec<String>,
    /// Path under the provider base URL, without leading slash.
    pub endpoint: String,
    pub family: ModelFamily,
    /// Field carrying guidance strength (`guidance_scale`, `cfg_scale`, ...). `None` drops it.
    pub guidance_field: Option<String>,
    /// Field for an optional last frame. `None` means unsupported; the value is dropped.
    pub end_image_field: Option<String>,
    /// When set, all input images go as one ordered array under this field.
    pub reference_field: Option<String>,
}

impl ModelSpec {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>, family: ModelFamily) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            id: id.into(),
            aliases: Vec::new(),
            endpoint: endpoint.trim_start_matches('/').to_string(),
            family,
            guidance_field: None,
            end_image_field: None,
            reference_field: None,
        }
    }

    pub fn image(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(id, endpoint, ModelFamily::Image)
    }

    pub fn video(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(id, endpoint, ModelFamily::Video)
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn guidance_field(mut self, field: impl Into<String>) -> Self {
        self.guidance_field = Some(field.into());
        self
    }

    pub fn end_image_field(mut self, field: impl Into<String>) -> Self {
        self.end_image_field = Some(field.into());
        self
    }

    pub fn reference_field(mut self, field: impl Into<String>) -> Self {
        self.reference_field = Some(field.into());
        self
    }

    fn matches(&self, model_id: &str) -> bool {
        self.id.eq_ignore_ascii_case(model_id)
            || self.endpoint.eq_ignore_ascii_case(model_id)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(model_id))
    }
}

/// Lookup table from model id or alias to [`ModelSpec`].
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    specs: Vec<ModelSpec>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Models known out of the box.
    pub fn builtin() -> Self {
        Self::new()
            .with(
                ModelSpec::image("flux-dev", "wavespeed-ai/flux-dev")
                    .alias("flux")
                    .guidance_field("guidance_scale"),
            )
            .with(
                ModelSpec::image("sdxl", "stability-ai/sdxl")
                    .alias("stable-diffusion-xl")
                    .guidance_field("cfg_scale"),
            )
            .with(
                ModelSpec::image("seedream-v4-edit", "bytedance/seedream-v4/edit")
                    .alias("seedream-edit")
                    .reference_field("images"),
            )
            .with(
                ModelSpec::image("nano-banana-edit", "google/nano-banana/edit")
                    .reference_field("images"),
            )
            .with(
                ModelSpec::video("kling-v2.1-i2v-pro", "kwaivgi/kling-v2.1-i2v-pro")
                    .alias("kling-i2v")
                    .alias("kling")
                    .guidance_field("guidance_scale")
                    .end_image_field("end_image"),
            )
            .with(
                ModelSpec::video("wan-2.2-i2v-720p", "wavespeed-ai/wan-2.2/i2v-720p")
                    .alias("wan-i2v")
                    .end_image_field("last_image"),
            )
            .with(
                ModelSpec::video("hunyuan-video-i2v", "wavespeed-ai/hunyuan-video/i2v")
                    .alias("hunyuan")
                    .guidance_field("cfg_scale"),
            )
            .with(
                ModelSpec::video("seedance-v1-pro-i2v", "bytedance/seedance-v1-pro-i2v-720p")
                    .alias("seedance"),
            )
            .with(
                ModelSpec::video("vidu-reference", "vidu/reference-to-video-q1")
                    .reference_field("images"),
            )
    }

    /// Add or replace (by canonical id) a model.
    pub fn with(mut self, spec: ModelSpec) -> Self {
        self.register(spec);
        self
    }

    pub fn register(&mut self, spec: ModelSpec) {
        self.specs.retain(|s| s.id != spec.id);
        self.specs.push(spec);
    }

    pub fn resolve(&self, model_id: &str) -> Option<&ModelSpec> {
        let model_id = model_id.trim();
        self.specs.iter().find(|s| s.matches(model_id))
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
