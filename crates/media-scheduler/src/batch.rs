//! Batch execution: FIFO dispatch under a concurrency cap, per-task timeout, cooperative cancel.
//!
//! The dispatch loop is the only writer of task slots while a batch runs. Other callers touch a
//! running job only through `cancel_job`, which flips the job status; the loop observes that
//! between dispatch cycles and stops starting new tasks. Tasks already in flight are never
//! aborted. They run to completion or timeout and their results are recorded, even when the
//! caller of `execute_batch` stops waiting: the loop runs on its own task.

use crate::{SchedulerConfig, SchedulerError};
use chrono::{DateTime, Utc};
use media_types::{
    BatchJob, BatchSettings, Generator, JobStatus, JobStore, PersistContext, ResultPersister,
    ResultStatus, TaskError,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::{self, JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Called with a fresh job snapshot after every state change of a running batch.
pub type ProgressCallback = Arc<dyn Fn(&BatchJob) + Send + Sync>;

/// job id -> token of the execution currently driving it.
type RunningJobs = Arc<Mutex<HashMap<String, CancellationToken>>>;

fn lock(running: &RunningJobs) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
    running.lock().unwrap_or_else(|e| e.into_inner())
}

struct StoredArtifact {
    locator: String,
    remote_url: String,
}

struct TaskOutcome {
    index: usize,
    result: Result<StoredArtifact, TaskError>,
    elapsed: Duration,
}

/// Creates batch jobs and drives them to a terminal state.
pub struct BatchScheduler {
    store: Arc<dyn JobStore>,
    persister: Arc<dyn ResultPersister>,
    config: SchedulerConfig,
    running: RunningJobs,
}

impl BatchScheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        persister: Arc<dyn ResultPersister>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            persister,
            config,
            running: Arc::default(),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Validate settings and register a pending job with `count` pending slots.
    pub async fn create_job(
        &self,
        owner_id: &str,
        settings: BatchSettings,
    ) -> Result<BatchJob, SchedulerError> {
        validate(&settings)?;
        let job = BatchJob::new(owner_id, settings);
        self.store.insert(job.clone()).await?;
        tracing::info!(
            job_id = %job.id,
            owner_id = %owner_id,
            model = %job.settings.model,
            count = job.total_count,
            "batch job created"
        );
        Ok(job)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<BatchJob>, SchedulerError> {
        Ok(self.store.get(job_id).await?)
    }

    /// Jobs of one owner, newest first.
    pub async fn list_jobs_for_owner(&self, owner_id: &str) -> Result<Vec<BatchJob>, SchedulerError> {
        Ok(self.store.list_for_owner(owner_id).await?)
    }

    /// Request cooperative cancellation. Returns whether the job went to `cancelled`; false for
    /// unknown and already terminal jobs.
    pub async fn cancel_job(&self, job_id: &str) -> Result<bool, SchedulerError> {
        match self.store.get(job_id).await? {
            Some(job) if !job.status.is_terminal() => {}
            _ => return Ok(false),
        }
        let snapshot = self
            .store
            .update(
                job_id,
                Box::new(|j: &mut BatchJob| {
                    j.cancel();
                }),
            )
            .await?;
        let took_effect = snapshot.is_some_and(|j| j.status == JobStatus::Cancelled);
        if took_effect {
            if let Some(token) = lock(&self.running).get(job_id) {
                token.cancel();
            }
            tracing::info!(job_id = %job_id, "batch cancellation requested");
        }
        Ok(took_effect)
    }

    /// Evict settled terminal jobs created more than `max_age` ago. Returns how many were removed.
    pub async fn cleanup_old_jobs(&self, max_age: Duration) -> Result<usize, SchedulerError> {
        let age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let Some(cutoff) = Utc::now().checked_sub_signed(age) else {
            return Ok(0);
        };
        let evicted = self.store.remove_terminal_older_than(cutoff).await?;
        if evicted > 0 {
            tracing::info!(evicted, cutoff = %cutoff, "old batch jobs evicted");
        }
        Ok(evicted)
    }

    /// Run `execute_batch` on a background task.
    pub fn spawn_batch(
        self: &Arc<Self>,
        job_id: &str,
        generator: Arc<dyn Generator>,
        on_progress: Option<ProgressCallback>,
    ) -> JoinHandle<Result<BatchJob, SchedulerError>> {
        let scheduler = Arc::clone(self);
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            let result = scheduler.execute_batch(&job_id, generator, on_progress).await;
            if let Err(ref e) = result {
                tracing::error!(job_id = %job_id, error = %e, "batch execution failed");
            }
            result
        })
    }

    /// Drive a job to its terminal state and return the final snapshot.
    ///
    /// Jobs that already finished are returned unchanged. A job cancelled before it started
    /// settles as `cancelled` without dispatching anything. Dropping the returned future does
    /// not stop the batch.
    pub async fn execute_batch(
        &self,
        job_id: &str,
        generator: Arc<dyn Generator>,
        on_progress: Option<ProgressCallback>,
    ) -> Result<BatchJob, SchedulerError> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;
        match job.status {
            JobStatus::Running => return Err(SchedulerError::AlreadyRunning(job_id.to_string())),
            JobStatus::Completed | JobStatus::Failed => return Ok(job),
            JobStatus::Cancelled if job.completed_at.is_some() => return Ok(job),
            JobStatus::Pending | JobStatus::Cancelled => {}
        }

        let token = CancellationToken::new();
        let entry = {
            let mut running = lock(&self.running);
            if running.contains_key(job_id) {
                return Err(SchedulerError::AlreadyRunning(job_id.to_string()));
            }
            running.insert(job_id.to_string(), token.clone());
            RunningEntry {
                running: Arc::clone(&self.running),
                job_id: job_id.to_string(),
            }
        };

        let driver = Driver {
            store: Arc::clone(&self.store),
            persister: Arc::clone(&self.persister),
            config: self.config,
        };
        let handle = tokio::spawn(async move {
            let _entry = entry;
            driver.run(job, generator, on_progress, token).await
        });
        handle
            .await
            .map_err(|e| SchedulerError::Other(format!("batch driver ended abnormally: {}", e)))?
    }
}

/// Unregisters a job from the running map when its driver task ends, however it ends.
struct RunningEntry {
    running: RunningJobs,
    job_id: String,
}

impl Drop for RunningEntry {
    fn drop(&mut self) {
        lock(&self.running).remove(&self.job_id);
    }
}

/// Owned handles for the dispatch loop, which runs on its own task.
struct Driver {
    store: Arc<dyn JobStore>,
    persister: Arc<dyn ResultPersister>,
    config: SchedulerConfig,
}

impl Driver {
    async fn run(
        self,
        job: BatchJob,
        generator: Arc<dyn Generator>,
        on_progress: Option<ProgressCallback>,
        token: CancellationToken,
    ) -> Result<BatchJob, SchedulerError> {
        let job_id = job.id.clone();
        let mut in_flight = JoinSet::new();
        let result = self
            .drive(job, generator, on_progress.as_ref(), &token, &mut in_flight)
            .await;
        if result.is_err() && !in_flight.is_empty() {
            tracing::warn!(
                job_id = %job_id,
                in_flight = in_flight.len(),
                "batch bookkeeping failed; detaching in-flight tasks"
            );
            in_flight.detach_all();
        }
        result
    }

    async fn drive(
        &self,
        job: BatchJob,
        generator: Arc<dyn Generator>,
        on_progress: Option<&ProgressCallback>,
        token: &CancellationToken,
        in_flight: &mut JoinSet<TaskOutcome>,
    ) -> Result<BatchJob, SchedulerError> {
        let job_id = job.id.clone();
        let notify = |snapshot: &BatchJob| {
            if let Some(cb) = on_progress {
                cb(snapshot);
            }
        };
        let max_concurrency = job
            .settings
            .max_concurrency
            .unwrap_or(self.config.max_concurrency)
            .max(1);
        let task_timeout = job
            .settings
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.task_timeout);

        let snapshot = self
            .mutate(&job_id, |j: &mut BatchJob| {
                j.mark_started(Utc::now());
            })
            .await?;
        notify(&snapshot);
        let mut cancelled = token.is_cancelled() || snapshot.status == JobStatus::Cancelled;
        let mut queue: VecDeque<usize> = snapshot.pending_indices().into();
        let owner_id = snapshot.owner_id.clone();
        let settings = snapshot.settings.clone();
        // task id -> slot index, so a task that panics can still be attributed.
        let mut slots: HashMap<task::Id, usize> = HashMap::new();
        tracing::info!(
            job_id = %job_id,
            total = snapshot.total_count,
            max_concurrency,
            timeout_ms = task_timeout.as_millis() as u64,
            "batch started"
        );

        loop {
            while !cancelled && in_flight.len() < max_concurrency {
                let Some(index) = queue.pop_front() else {
                    break;
                };
                let snapshot = self
                    .mutate(&job_id, move |j: &mut BatchJob| {
                        j.mark_task_running(index, Utc::now());
                    })
                    .await?;
                if snapshot.results.get(index).map(|r| r.status) != Some(ResultStatus::Running) {
                    tracing::warn!(job_id = %job_id, index, "slot not dispatchable; skipped");
                    continue;
                }
                notify(&snapshot);
                tracing::debug!(job_id = %job_id, index, in_flight = in_flight.len() + 1, "task dispatched");
                let ctx = PersistContext {
                    job_id: job_id.clone(),
                    owner_id: owner_id.clone(),
                    index,
                };
                let handle = in_flight.spawn(run_task(
                    Arc::clone(&generator),
                    Arc::clone(&self.persister),
                    settings.for_task(index),
                    ctx,
                    task_timeout,
                ));
                slots.insert(handle.id(), index);
            }

            let Some(joined) = in_flight.join_next_with_id().await else {
                break;
            };
            let snapshot = match joined {
                Ok((id, outcome)) => {
                    slots.remove(&id);
                    Some(self.record(&job_id, outcome).await?)
                }
                Err(e) => match slots.remove(&e.id()) {
                    Some(index) => Some(self.record_abnormal(&job_id, index, e).await?),
                    None => {
                        tracing::error!(job_id = %job_id, error = %e, "unattributed task ended abnormally");
                        None
                    }
                },
            };
            if let Some(snapshot) = snapshot {
                notify(&snapshot);
                cancelled |= snapshot.status == JobStatus::Cancelled;
            }
            cancelled |= token.is_cancelled();
        }

        cancelled |= token.is_cancelled();
        let snapshot = self
            .mutate(&job_id, move |j: &mut BatchJob| {
                let now = Utc::now();
                settle_orphans(j, now);
                j.finish(cancelled, now);
            })
            .await?;
        notify(&snapshot);
        tracing::info!(
            job_id = %job_id,
            status = ?snapshot.status,
            completed = snapshot.completed_count,
            failed = snapshot.failed_count,
            pending = snapshot.pending_indices().len(),
            "batch finished"
        );
        Ok(snapshot)
    }

    async fn record(&self, job_id: &str, outcome: TaskOutcome) -> Result<BatchJob, SchedulerError> {
        let TaskOutcome {
            index,
            result,
            elapsed,
        } = outcome;
        let duration_ms = elapsed_ms(elapsed);
        match result {
            Ok(stored) => {
                tracing::debug!(job_id = %job_id, index, duration_ms, "task completed");
                self.mutate(job_id, move |j: &mut BatchJob| {
                    j.mark_task_completed(
                        index,
                        stored.locator,
                        Some(stored.remote_url),
                        Utc::now(),
                        duration_ms,
                    );
                })
                .await
            }
            Err(error) => {
                tracing::warn!(
                    job_id = %job_id,
                    index,
                    duration_ms,
                    kind = ?error.kind,
                    error = %error,
                    "task failed"
                );
                self.mutate(job_id, move |j: &mut BatchJob| {
                    j.mark_task_failed(index, &error, Utc::now(), duration_ms);
                })
                .await
            }
        }
    }

    /// Fail the slot of a task that panicked or was aborted, freeing its place under the cap.
    async fn record_abnormal(
        &self,
        job_id: &str,
        index: usize,
        e: JoinError,
    ) -> Result<BatchJob, SchedulerError> {
        tracing::error!(job_id = %job_id, index, error = %e, "task ended abnormally");
        let error = if e.is_panic() {
            TaskError::internal("task panicked")
        } else {
            TaskError::internal("task was aborted")
        };
        self.mutate(job_id, move |j: &mut BatchJob| {
            let now = Utc::now();
            let duration_ms = j
                .results
                .get(index)
                .map(|r| ms_since(r.started_at, now))
                .unwrap_or(0);
            j.mark_task_failed(index, &error, now, duration_ms);
        })
        .await
    }

    async fn mutate<F>(&self, job_id: &str, f: F) -> Result<BatchJob, SchedulerError>
    where
        F: FnOnce(&mut BatchJob) + Send + 'static,
    {
        self.store
            .update(job_id, Box::new(f))
            .await?
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))
    }
}

fn validate(settings: &BatchSettings) -> Result<(), SchedulerError> {
    if settings.count < 1 {
        return Err(SchedulerError::Validation("count must be at least 1".into()));
    }
    if settings.model.trim().is_empty() {
        return Err(SchedulerError::Validation("model is required".into()));
    }
    if settings.max_concurrency == Some(0) {
        return Err(SchedulerError::Validation(
            "max_concurrency must be at least 1".into(),
        ));
    }
    if settings.timeout_ms == Some(0) {
        return Err(SchedulerError::Validation("timeout_ms must be positive".into()));
    }
    Ok(())
}

/// Whole milliseconds, rounded up so a task that ran at all never reports zero.
fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros().div_ceil(1000)).unwrap_or(u64::MAX)
}

fn ms_since(started_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
    started_at
        .map(|s| (now - s).num_milliseconds().max(0) as u64)
        .unwrap_or(0)
}

/// Fail slots still marked running after the loop exited. Abnormal task ends are recorded as
/// they happen, so this only catches slots whose task could not be attributed.
fn settle_orphans(job: &mut BatchJob, now: DateTime<Utc>) {
    let orphans: Vec<(usize, u64)> = job
        .results
        .iter()
        .filter(|r| r.status == ResultStatus::Running)
        .map(|r| (r.index, ms_since(r.started_at, now)))
        .collect();
    let error = TaskError::internal("task ended without reporting a result");
    for (index, duration_ms) in orphans {
        job.mark_task_failed(index, &error, now, duration_ms);
    }
}

async fn run_task(
    generator: Arc<dyn Generator>,
    persister: Arc<dyn ResultPersister>,
    settings: BatchSettings,
    ctx: PersistContext,
    timeout: Duration,
) -> TaskOutcome {
    let started = Instant::now();
    let result = generate_and_persist(
        generator.as_ref(),
        persister.as_ref(),
        &settings,
        &ctx,
        timeout,
    )
    .await;
    TaskOutcome {
        index: ctx.index,
        result,
        elapsed: started.elapsed(),
    }
}

async fn generate_and_persist(
    generator: &dyn Generator,
    persister: &dyn ResultPersister,
    settings: &BatchSettings,
    ctx: &PersistContext,
    timeout: Duration,
) -> Result<StoredArtifact, TaskError> {
    let artifact = match tokio::time::timeout(timeout, generator.generate(settings, ctx.index)).await
    {
        Ok(generated) => generated?,
        Err(_) => {
            return Err(TaskError::timeout(format!(
                "no result within {} ms",
                timeout.as_millis()
            )))
        }
    };
    let remote_url = artifact
        .primary()
        .ok_or_else(|| TaskError::protocol("generator returned no outputs"))?
        .to_string();
    let locator = persister.persist(ctx, &remote_url).await?;
    Ok(StoredArtifact {
        locator,
        remote_url,
    })
}
