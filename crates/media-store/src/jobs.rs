//! In-memory job registry (process lifetime only).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use media_types::{BatchJob, JobMutation, JobStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory implementation of JobStore.
/// Each mutation runs under the write lock, so readers only ever see whole updates.
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    /// job_id -> job.
    jobs: Arc<RwLock<HashMap<String, BatchJob>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: BatchJob) -> Result<(), StoreError> {
        let mut guard = self.jobs.write().await;
        if guard.contains_key(&job.id) {
            return Err(StoreError::Other(format!("duplicate job id: {}", job.id)));
        }
        guard.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<BatchJob>, StoreError> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn update(
        &self,
        job_id: &str,
        mutation: JobMutation,
    ) -> Result<Option<BatchJob>, StoreError> {
        let mut guard = self.jobs.write().await;
        Ok(guard.get_mut(job_id).map(|job| {
            mutation(job);
            job.clone()
        }))
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<BatchJob>, StoreError> {
        let guard = self.jobs.read().await;
        let mut out: Vec<BatchJob> = guard
            .values()
            .filter(|j| j.owner_id == owner_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn remove_terminal_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut guard = self.jobs.write().await;
        let before = guard.len();
        // A cancelled job is terminal before its in-flight tasks drain; keep it until settled.
        guard.retain(|_, j| {
            !(j.status.is_terminal() && j.completed_at.is_some() && j.created_at < cutoff)
        });
        let evicted = before - guard.len();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted old batch jobs");
        }
        Ok(evicted)
    }
}
