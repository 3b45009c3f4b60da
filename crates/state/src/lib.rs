//! Execution state persistence.
//!
//! Two keyspaces: execution records by id, and the latest successful outputs
//! by workflow name. The local JSON-file backend is the reference
//! implementation; alternative backends implement [`StateBackend`] and must
//! preserve atomic write semantics.

mod error;
mod local;
mod store;

pub use error::StateStoreError;
pub use local::LocalStateStore;
pub use store::StateBackend;
