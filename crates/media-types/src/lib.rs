//! Core types and traits for batch media generation.
//!
//! The job model mirrors the snapshot the UI consumes; the traits are the seams
//! between the scheduler, the job store, the provider client and the persister.

mod dto;
mod error;
mod settings;
mod traits;

pub use dto::*;
pub use error::*;
pub use settings::*;
pub use traits::*;
