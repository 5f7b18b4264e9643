//! Batch scheduler: runs the tasks of a batch job under a concurrency cap.
//!
//! Each task delegates to a [`media_types::Generator`], is raced against a per-task timeout,
//! and has its artifact stored through a [`media_types::ResultPersister`]. Task failures are
//! recorded on the result slot and never abort the batch.

mod batch;
mod config;
mod error;

pub use batch::{BatchScheduler, ProgressCallback};
pub use config::SchedulerConfig;
pub use error::SchedulerError;
