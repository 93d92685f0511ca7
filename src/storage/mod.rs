//! Durable checkpoint storage.
//!
//! The engine only sees the [`CheckpointStore`] trait. [`SqliteStore`] keeps
//! the pretty-printed JSON document in a key-value table; [`MemoryStore`]
//! keeps it in-process.

mod checkpoint;
mod schema;
mod types;

pub use checkpoint::{decode_state, encode_state, CheckpointStore, MemoryStore};
pub use schema::SqliteStore;
pub use types::{FeedState, RunState, StoreError};
