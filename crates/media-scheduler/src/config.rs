//! Scheduler defaults, overridable per batch.

use std::time::Duration;

pub const DEFAULT_MAX_CONCURRENCY: usize = 10;
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(12 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Cap on in-flight tasks per batch when the settings do not set one.
    pub max_concurrency: usize,
    /// Per-task deadline when the settings do not set one.
    pub task_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }
}

impl SchedulerConfig {
    /// Read `BATCH_MAX_CONCURRENCY` and `BATCH_TASK_TIMEOUT_MS`. Unset, unparsable or zero
    /// values fall back to the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = positive_env("BATCH_MAX_CONCURRENCY") {
            config.max_concurrency = n as usize;
        }
        if let Some(ms) = positive_env("BATCH_TASK_TIMEOUT_MS") {
            config.task_timeout = Duration::from_millis(ms);
        }
        config
    }
}

fn positive_env(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring invalid value; using default");
            None
        }
        Ok(n) => Some(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = SchedulerConfig::default();
        assert_eq!(c.max_concurrency, 10);
        assert_eq!(c.task_timeout, Duration::from_millis(720_000));
    }
}
