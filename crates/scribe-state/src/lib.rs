//! scribe-state — durable status store for completed jobs.
//!
//! Backed by [redb](https://docs.rs/redb). Each completed job is stored as
//! a JSON-serialized `CompletedJobRecord` keyed by job id, so an upsert is
//! idempotent and a lookup is a single point read.
//!
//! The store is self-healing: a missing file is created, and a file that
//! cannot be opened or holds undecodable records is reinitialized empty.
//! Prior history is lost in that case; the scheduler keeps running.
//!
//! `StatusStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StatusStore;
pub use types::CompletedJobRecord;
