//! Mock generator for tests: scripted per-index outcomes, no network.

use async_trait::async_trait;
use media_types::{BatchSettings, GeneratedArtifact, Generator, TaskError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

/// One recorded `generate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub index: usize,
    pub seed: Option<i64>,
}

/// Generator whose outcome per task index is scripted up front.
///
/// Default behaviour: succeed with `https://mock.invalid/{index}.png` after `delay`.
#[derive(Default)]
pub struct MockGenerator {
    delay: Duration,
    fail: HashMap<usize, String>,
    fail_all: Option<String>,
    hang: HashSet<usize>,
    gate: Option<Arc<Semaphore>>,
    started: Option<mpsc::UnboundedSender<usize>>,
    calls: Mutex<Vec<MockCall>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: AtomicUsize,
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_on(mut self, indices: &[usize], message: &str) -> Self {
        for i in indices {
            self.fail.insert(*i, message.to_string());
        }
        self
    }

    pub fn fail_all(mut self, message: &str) -> Self {
        self.fail_all = Some(message.to_string());
        self
    }

    /// These indices never answer.
    pub fn hang_on(mut self, indices: &[usize]) -> Self {
        self.hang.extend(indices.iter().copied());
        self
    }

    /// Each call takes one permit before answering; tests release calls by adding permits.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Receive the index of every call as it starts.
    pub fn notify_started(mut self, tx: mpsc::UnboundedSender<usize>) -> Self {
        self.started = Some(tx);
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn output_url(index: usize) -> String {
        format!("https://mock.invalid/{}.png", index)
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(
        &self,
        settings: &BatchSettings,
        index: usize,
    ) -> Result<GeneratedArtifact, TaskError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockCall {
                index,
                seed: settings.seed,
            });
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(Arc::clone(&self.in_flight));
        if let Some(ref tx) = self.started {
            let _ = tx.send(index);
        }

        if self.hang.contains(&index) {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(ref gate) = self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if let Some(msg) = self.fail.get(&index).or(self.fail_all.as_ref()) {
            return Err(TaskError::generation(msg.clone()));
        }
        Ok(GeneratedArtifact {
            outputs: vec![Self::output_url(index)],
        })
    }
}
