//! HTTP client for one hosted generation back-end.

use crate::envelope::{normalize_poll, normalize_submit};
use crate::{build_payload, ModelRegistry, ModelSpec, PollOutcome, PollPolicy, ProviderError, SubmitOutcome};
use media_types::{BatchSettings, ModelFamily};
use serde_json::{Map, Value};
use std::fmt;

/// Connection settings for one provider.
#[derive(Clone)]
pub struct ProviderConfig {
    /// Name callers put in `BatchSettings::provider`.
    pub name: String,
    /// Base URL; endpoint paths are appended to it.
    pub base_url: String,
    /// Checked at first submit, not at construction.
    pub api_key: Option<String>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_env() -> Self {
        let name = std::env::var("PROVIDER_NAME").unwrap_or_else(|_| "wavespeed".to_string());
        let base_url = std::env::var("PROVIDER_BASE_URL")
            .unwrap_or_else(|_| "https://api.wavespeed.ai/api/v3".to_string());
        let api_key = std::env::var("PROVIDER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::new(name, base_url, api_key)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Submit/poll client for one provider.
pub struct ProviderClient {
    client: reqwest::Client,
    config: ProviderConfig,
    models: ModelRegistry,
    image_poll: PollPolicy,
    video_poll: PollPolicy,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig, models: ModelRegistry) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            models,
            image_poll: PollPolicy::default_for(ModelFamily::Image),
            video_poll: PollPolicy::default_for(ModelFamily::Video),
        }
    }

    /// Client for the provider described by `PROVIDER_*` env vars, with the builtin model table.
    pub fn from_env() -> Self {
        Self::new(ProviderConfig::from_env(), ModelRegistry::builtin())
    }

    /// Override the poll cadence for one model family.
    pub fn with_poll_policy(mut self, family: ModelFamily, policy: PollPolicy) -> Self {
        match family {
            ModelFamily::Image => self.image_poll = policy,
            ModelFamily::Video => self.video_poll = policy,
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn poll_policy(&self, family: ModelFamily) -> PollPolicy {
        match family {
            ModelFamily::Image => self.image_poll,
            ModelFamily::Video => self.video_poll,
        }
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.config.api_key.as_deref().ok_or_else(|| {
            ProviderError::Configuration(format!(
                "no API key configured for provider {}",
                self.config.name
            ))
        })
    }

    pub fn resolve(&self, model_id: &str) -> Result<&ModelSpec, ProviderError> {
        self.models.resolve(model_id).ok_or_else(|| {
            ProviderError::Configuration(format!(
                "unknown model {} for provider {}",
                model_id, self.config.name
            ))
        })
    }

    /// Submit a job for `model_id` (id or alias).
    pub async fn submit(
        &self,
        model_id: &str,
        payload: &Map<String, Value>,
    ) -> Result<SubmitOutcome, ProviderError> {
        let key = self.api_key()?;
        let spec = self.resolve(model_id)?;
        let url = format!("{}/{}", self.config.base_url, spec.endpoint);

        let res = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(payload)
            .send()
            .await?;
        let body = Self::read_json(res, "submit").await?;
        let outcome = normalize_submit(&body, |id| {
            format!("{}/predictions/{}/result", self.config.base_url, id)
        })?;
        tracing::debug!(
            provider = %self.config.name,
            model = %spec.id,
            inline = matches!(outcome, SubmitOutcome::Inline(_)),
            "job submitted"
        );
        Ok(outcome)
    }

    /// One status check.
    pub async fn poll(&self, url: &str) -> Result<PollOutcome, ProviderError> {
        let key = self.api_key()?;
        let res = self.client.get(url).bearer_auth(key).send().await?;
        let body = Self::read_json(res, "poll").await?;
        normalize_poll(&body)
    }

    /// Poll `url` on the family's cadence until outputs arrive or the attempt budget runs out.
    pub async fn wait_for_outputs(
        &self,
        url: &str,
        family: ModelFamily,
    ) -> Result<Vec<String>, ProviderError> {
        let policy = self.poll_policy(family);
        for attempt in 1..=policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
            match self.poll(url).await? {
                PollOutcome::Ready(outputs) => {
                    tracing::debug!(attempt, "job finished");
                    return Ok(outputs);
                }
                PollOutcome::Failed(msg) => return Err(ProviderError::Generation(msg)),
                PollOutcome::Pending => {
                    tracing::trace!(attempt, max = policy.max_attempts, "job still running");
                }
            }
        }
        Err(ProviderError::Timeout(format!(
            "no result after {} poll attempts ({:?} apart)",
            policy.max_attempts, policy.interval
        )))
    }

    /// Full two-phase run for one task: build payload, submit, poll if needed.
    pub async fn generate(&self, settings: &BatchSettings) -> Result<Vec<String>, ProviderError> {
        let spec = self.resolve(&settings.model)?;
        let payload = build_payload(spec, settings)?;
        match self.submit(&spec.id, &payload).await? {
            SubmitOutcome::Inline(outputs) => Ok(outputs),
            SubmitOutcome::Poll(url) => self.wait_for_outputs(&url, spec.family).await,
        }
    }

    async fn read_json(res: reqwest::Response, phase: &str) -> Result<Value, ProviderError> {
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Protocol(format!(
                "{} returned {}: {}",
                phase, status, text
            )));
        }
        serde_json::from_str(&text).map_err(|e| {
            ProviderError::Protocol(format!("{} response is not valid JSON: {}", phase, e))
        })
    }
}

impl fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderClient")
            .field("config", &self.config)
            .field("models", &self.models.len())
            .finish()
    }
}
