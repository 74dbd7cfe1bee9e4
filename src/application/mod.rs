//! Application layer: the content tree state store
//!
//! This layer owns the tree, coordinates persistence and publishes snapshots.

pub mod error;
pub mod save;
pub mod snapshot;
pub mod store;

pub use error::{ApplicationError, ApplicationResult, SaveError, StoreError};
pub use save::{SaveFuture, SaveHook};
pub use snapshot::{Snapshot, Subscription};
pub use store::{ContentTreeStore, EditPayload, StoreOptions};
