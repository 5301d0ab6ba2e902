//! Key-value settings store.
//!
//! Holds user settings and API keys as JSON values under string keys.

pub mod error;
pub mod file;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use store::{KeyValueStore, KeyValueStoreExt};
