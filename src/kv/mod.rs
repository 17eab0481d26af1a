//! # Namespaced Key-Value Stores
//!
//! Backing stores for the `kv` and `env` capability modules. Every operation
//! takes a namespace, which the sandbox always sets to the invoking
//! function's ID, so one function can never address another function's keys.
//!
//! Per-key operations are the unit of atomicity. Concurrent `set` calls on
//! the same key are last-writer-wins; there are no cross-key transactions.

mod errors;
mod file;
mod memory;

pub use errors::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;

use std::collections::BTreeMap;

/// Narrow store interface required by the capability modules
pub trait NamespacedStore: Send + Sync + std::fmt::Debug {
    /// Read a value; `StoreError::NotFound` when the key is absent
    fn get(&self, namespace: &str, key: &str) -> StoreResult<String>;

    /// Insert or replace a value
    fn set(&self, namespace: &str, key: &str, value: &str) -> StoreResult<()>;

    /// Remove a value; deleting an absent key succeeds
    fn delete(&self, namespace: &str, key: &str) -> StoreResult<()>;

    /// All entries of one namespace, ordered by key
    fn list(&self, namespace: &str) -> StoreResult<BTreeMap<String, String>>;

    /// Remove every entry of one namespace; returns how many were removed
    fn clear(&self, namespace: &str) -> StoreResult<usize> {
        let entries = self.list(namespace)?;
        for key in entries.keys() {
            self.delete(namespace, key)?;
        }
        Ok(entries.len())
    }
}
