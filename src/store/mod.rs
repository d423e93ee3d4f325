//! Durable keyed storage for booking state.
//!
//! Every value carries a version number. Writers pass the version they read to `put`,
//! which only succeeds if nobody committed in between.

mod file;
#[cfg(test)]
mod memory;

pub use file::FileStore;
#[cfg(test)]
pub use memory::InMemoryStore;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreResult;

/// A stored value together with its version. Missing keys are version 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub value: String,
    pub version: u64,
}

pub trait SessionStore: Send + Sync {
    /// Read the current value of `key`.
    fn get(&self, key: &str) -> StoreResult<Option<Versioned>>;

    /// Write `value` under `key` and return the new version.
    ///
    /// With `expected = Some(v)` the write is a compare-and-set and fails with
    /// `StoreError::VersionConflict` unless the current version is `v`.
    fn put(&self, key: &str, value: String, expected: Option<u64>) -> StoreResult<u64>;

    fn remove(&self, key: &str) -> StoreResult<()>;

    /// List keys starting with `prefix`, sorted.
    fn keys(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

/// Read and deserialize `key`, returning the value with its version.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn SessionStore,
    key: &str,
) -> StoreResult<Option<(T, u64)>> {
    match store.get(key)? {
        Some(entry) => {
            let value = serde_json::from_str(&entry.value)?;
            Ok(Some((value, entry.version)))
        }
        None => Ok(None),
    }
}

/// Serialize `value` and write it under `key`.
pub fn save_json<T: Serialize>(
    store: &dyn SessionStore,
    key: &str,
    value: &T,
    expected: Option<u64>,
) -> StoreResult<u64> {
    let json = serde_json::to_string(value)?;
    store.put(key, json, expected)
}

/// Read-modify-write `key` with compare-and-set, retrying on conflict.
pub fn update_json<T, F>(store: &dyn SessionStore, key: &str, mut apply: F) -> StoreResult<T>
where
    T: Serialize + DeserializeOwned + Default,
    F: FnMut(&mut T),
{
    let mut attempt = 0;
    loop {
        let (mut value, version) = load_json::<T>(store, key)?.unwrap_or_default();
        apply(&mut value);
        match save_json(store, key, &value, Some(version)) {
            Ok(_) => return Ok(value),
            Err(crate::error::StoreError::VersionConflict { .. }) if attempt < 3 => {
                attempt += 1;
                tracing::debug!("retrying update of {} after conflict", key);
            }
            Err(e) => return Err(e),
        }
    }
}
