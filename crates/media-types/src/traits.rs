//! Traits for the job store, the generation back-end and the artifact persister.

use crate::{BatchJob, BatchSettings, PersistError, StoreError, TaskError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// In-place mutation applied to a stored job under the store's write lock.
pub type JobMutation = Box<dyn FnOnce(&mut BatchJob) + Send>;

/// Registry of batch jobs.
///
/// Contract: `get` and `update` return `Ok(None)` when the job id is unknown (never created or
/// already evicted). Every returned job is a snapshot taken after the mutation was applied.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: BatchJob) -> Result<(), StoreError>;

    async fn get(&self, job_id: &str) -> Result<Option<BatchJob>, StoreError>;

    /// Apply `mutation` atomically and return the resulting snapshot.
    async fn update(
        &self,
        job_id: &str,
        mutation: JobMutation,
    ) -> Result<Option<BatchJob>, StoreError>;

    /// Jobs for one owner, newest first.
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<BatchJob>, StoreError>;

    /// Evict settled terminal jobs (`completed_at` set) created before `cutoff`; returns how
    /// many were removed.
    async fn remove_terminal_older_than(&self, cutoff: DateTime<Utc>)
        -> Result<usize, StoreError>;
}

/// Output of one successful generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    /// Remote artifact URLs, in provider order. The first one is persisted.
    pub outputs: Vec<String>,
}

impl GeneratedArtifact {
    pub fn primary(&self) -> Option<&str> {
        self.outputs.first().map(String::as_str)
    }
}

/// Produces one artifact for one task of a batch.
#[async_trait]
pub trait Generator: Send + Sync {
    /// `settings` already carries the task's derived seed.
    async fn generate(
        &self,
        settings: &BatchSettings,
        index: usize,
    ) -> Result<GeneratedArtifact, TaskError>;
}

/// Where a persisted artifact belongs.
#[derive(Debug, Clone)]
pub struct PersistContext {
    pub job_id: String,
    pub owner_id: String,
    pub index: usize,
}

/// Stores a remote artifact durably and returns a stable local locator.
#[async_trait]
pub trait ResultPersister: Send + Sync {
    async fn persist(&self, ctx: &PersistContext, remote_url: &str)
        -> Result<String, PersistError>;
}
