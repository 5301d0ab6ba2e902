//! Store trait and typed helpers.

use crate::error::StoreResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// String-keyed JSON value store.
///
/// Implementations are shared across tasks, so every method takes `&self`.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Remove `key`. Returns whether it was present.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// All keys, sorted.
    fn keys(&self) -> Vec<String>;
}

/// Typed access on top of [`KeyValueStore`].
pub trait KeyValueStoreExt: KeyValueStore {
    /// Read and deserialize `key`.
    ///
    /// Returns `Ok(None)` when the key is absent.
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn set_as<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        self.set(key, serde_json::to_value(value)?)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}
