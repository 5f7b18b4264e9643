use media_types::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Rejected batch settings; nothing was created.
    #[error("invalid batch settings: {0}")]
    Validation(String),
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("job {0} is already running")]
    AlreadyRunning(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("scheduler error: {0}")]
    Other(String),
}
