//! Adapter from provider clients to the scheduler's `Generator` seam.

use crate::ProviderClient;
use async_trait::async_trait;
use media_types::{BatchSettings, GeneratedArtifact, Generator, TaskError};
use std::collections::HashMap;
use std::sync::Arc;

/// Routes each task to the client named by `settings.provider`.
#[derive(Default)]
pub struct ProviderGenerator {
    /// lowercase provider name -> client.
    clients: HashMap<String, Arc<ProviderClient>>,
}

impl ProviderGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: ProviderClient) -> Self {
        self.clients
            .insert(client.name().to_ascii_lowercase(), Arc::new(client));
        self
    }

    pub fn from_env() -> Self {
        Self::new().with_client(ProviderClient::from_env())
    }

    pub fn providers(&self) -> Vec<&str> {
        self.clients.keys().map(String::as_str).collect()
    }
}

#[async_trait]
impl Generator for ProviderGenerator {
    async fn generate(
        &self,
        settings: &BatchSettings,
        index: usize,
    ) -> Result<GeneratedArtifact, TaskError> {
        let client = self
            .clients
            .get(&settings.provider.to_ascii_lowercase())
            .ok_or_else(|| {
                TaskError::configuration(format!("unknown provider {}", settings.provider))
            })?;
        let outputs = client.generate(settings).await.map_err(|e| {
            tracing::warn!(
                provider = %settings.provider,
                model = %settings.model,
                index,
                error = %e,
                "generation failed"
            );
            TaskError::from(e)
        })?;
        Ok(GeneratedArtifact { outputs })
    }
}
