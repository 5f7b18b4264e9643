//! Batch job model: the record the scheduler mutates and the snapshot callers read.

use crate::{BatchSettings, TaskError, TaskErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a whole batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Status of one result slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl ResultStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResultStatus::Completed | ResultStatus::Failed)
    }

    /// Slots only move forward: pending -> running -> completed | failed.
    pub fn can_transition_to(&self, next: ResultStatus) -> bool {
        matches!(
            (self, next),
            (ResultStatus::Pending, ResultStatus::Running)
                | (ResultStatus::Running, ResultStatus::Completed)
                | (ResultStatus::Running, ResultStatus::Failed)
        )
    }
}

/// One task of a batch, addressed by its stable index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJobResult {
    pub id: String,
    pub index: usize,
    #[serde(default)]
    pub status: ResultStatus,
    /// Locator of the persisted artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Provider URL the artifact was persisted from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<TaskErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl BatchJobResult {
    pub fn pending(index: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            index,
            status: ResultStatus::Pending,
            result: None,
            remote_url: None,
            error: None,
            error_kind: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }
}

/// A user-initiated request for `count` independent artifacts from shared settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: String,
    pub owner_id: String,
    pub status: JobStatus,
    pub total_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub results: Vec<BatchJobResult>,
    pub settings: BatchSettings,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchJob {
    /// New pending job with one pending slot per requested artifact.
    pub fn new(owner_id: impl Into<String>, settings: BatchSettings) -> Self {
        let total = settings.count as usize;
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            status: JobStatus::Pending,
            total_count: total,
            completed_count: 0,
            failed_count: 0,
            results: (0..total).map(BatchJobResult::pending).collect(),
            settings,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn pending_indices(&self) -> Vec<usize> {
        self.results
            .iter()
            .filter(|r| r.status == ResultStatus::Pending)
            .map(|r| r.index)
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == ResultStatus::Running)
            .count()
    }

    /// Flip to running unless a cancel already landed. Returns false if the job was not pending.
    pub fn mark_started(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Running;
        self.started_at = Some(now);
        true
    }

    fn transition(&mut self, index: usize, next: ResultStatus) -> Option<&mut BatchJobResult> {
        let slot = self.results.get_mut(index)?;
        if !slot.status.can_transition_to(next) {
            return None;
        }
        slot.status = next;
        Some(slot)
    }

    pub fn mark_task_running(&mut self, index: usize, now: DateTime<Utc>) -> bool {
        match self.transition(index, ResultStatus::Running) {
            Some(slot) => {
                slot.started_at = Some(now);
                true
            }
            None => false,
        }
    }

    pub fn mark_task_completed(
        &mut self,
        index: usize,
        locator: String,
        remote_url: Option<String>,
        now: DateTime<Utc>,
        duration_ms: u64,
    ) -> bool {
        match self.transition(index, ResultStatus::Completed) {
            Some(slot) => {
                slot.result = Some(locator);
                slot.remote_url = remote_url;
                slot.completed_at = Some(now);
                slot.duration_ms = Some(duration_ms);
                self.completed_count += 1;
                true
            }
            None => false,
        }
    }

    pub fn mark_task_failed(
        &mut self,
        index: usize,
        error: &TaskError,
        now: DateTime<Utc>,
        duration_ms: u64,
    ) -> bool {
        match self.transition(index, ResultStatus::Failed) {
            Some(slot) => {
                slot.error = Some(error.message.clone());
                slot.error_kind = Some(error.kind);
                slot.completed_at = Some(now);
                slot.duration_ms = Some(duration_ms);
                self.failed_count += 1;
                true
            }
            None => false,
        }
    }

    /// Settle the final status once the dispatch loop has exited.
    pub fn finish(&mut self, cancelled: bool, now: DateTime<Utc>) {
        self.status = if cancelled || self.status == JobStatus::Cancelled {
            JobStatus::Cancelled
        } else if self.failed_count == self.total_count {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        self.completed_at = Some(now);
    }

    /// Request cancellation. Returns whether it took effect.
    pub fn cancel(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Cancelled;
        true
    }
}
