//! Job-protocol client for hosted generation back-ends.
//!
//! Every back-end speaks some variant of "submit, then poll": a POST creates the job and either
//! returns the outputs inline or a URL to poll. [`ProviderClient`] normalizes both shapes (root
//! level or nested under a legacy `data` wrapper) into [`SubmitOutcome`] / [`PollOutcome`], and
//! [`ModelRegistry`] maps each model to its endpoint and wire field names.

mod client;
mod envelope;
mod error;
mod generator;
#[cfg(feature = "test-util")]
pub mod mock;
mod models;
mod payload;

pub use client::{ProviderClient, ProviderConfig};
pub use envelope::{PollOutcome, SubmitOutcome};
pub use error::ProviderError;
pub use generator::ProviderGenerator;
pub use media_types::{GeneratedArtifact, Generator};
pub use models::{ModelRegistry, ModelSpec, PollPolicy};
pub use payload::build_payload;

#[cfg(feature = "test-util")]
pub use mock::{MockCall, MockGenerator};
