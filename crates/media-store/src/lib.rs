//! Job registry and artifact persisters.

mod artifacts;
mod jobs;

pub use artifacts::{LocalFilePersister, PassthroughPersister};
pub use jobs::InMemoryJobStore;
pub use media_types::{JobStore, PersistContext, PersistError, ResultPersister, StoreError};
