//! Generation settings shared by every task of a batch.

use serde::{Deserialize, Serialize};

/// Output family of a model; decides the parameter shape and the poll cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Image,
    Video,
}

impl ModelFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Image => "image",
            ModelFamily::Video => "video",
        }
    }
}

/// Named parameters for still-image models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    /// Guidance strength; the wire field name depends on the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// Primary input image (edit / image-to-image models).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Supplementary reference images, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_images: Vec<String>,
}

/// Named parameters for video models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoParams {
    /// Clip length in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// First frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Optional last frame; only some models accept it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_images: Vec<String>,
}

/// Per-family parameters, tagged by `kind` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModelParams {
    Image(ImageParams),
    Video(VideoParams),
}

impl Default for ModelParams {
    fn default() -> Self {
        ModelParams::Image(ImageParams::default())
    }
}

impl ModelParams {
    pub fn family(&self) -> ModelFamily {
        match self {
            ModelParams::Image(_) => ModelFamily::Image,
            ModelParams::Video(_) => ModelFamily::Video,
        }
    }

    pub fn guidance(&self) -> Option<f64> {
        match self {
            ModelParams::Image(p) => p.guidance,
            ModelParams::Video(p) => p.guidance,
        }
    }

    pub fn image(&self) -> Option<&str> {
        match self {
            ModelParams::Image(p) => p.image.as_deref(),
            ModelParams::Video(p) => p.image.as_deref(),
        }
    }

    pub fn reference_images(&self) -> &[String] {
        match self {
            ModelParams::Image(p) => &p.reference_images,
            ModelParams::Video(p) => &p.reference_images,
        }
    }

    pub fn negative_prompt(&self) -> Option<&str> {
        match self {
            ModelParams::Image(p) => p.negative_prompt.as_deref(),
            ModelParams::Video(p) => p.negative_prompt.as_deref(),
        }
    }
}

/// Settings shared by all tasks of one batch job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    pub prompt: String,
    /// Model id or short alias, resolved by the provider client.
    pub model: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    /// Per-task timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Base seed; task `i` runs with `seed + i`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default)]
    pub params: ModelParams,
    /// Provider parameters without a named field. Never overrides managed fields.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_provider() -> String {
    "wavespeed".to_string()
}

fn default_count() -> u32 {
    1
}

impl BatchSettings {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>, count: u32) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            provider: default_provider(),
            count,
            max_concurrency: None,
            timeout_ms: None,
            seed: None,
            params: ModelParams::default(),
            extra: serde_json::Map::new(),
        }
    }

    /// Seed task `index` runs with, if the batch forces one.
    pub fn derived_seed(&self, index: usize) -> Option<i64> {
        self.seed.map(|s| s.wrapping_add(index as i64))
    }

    /// Settings as seen by task `index`: identical except for the derived seed.
    pub fn for_task(&self, index: usize) -> BatchSettings {
        let mut settings = self.clone();
        settings.seed = self.derived_seed(index);
        settings
    }
}
