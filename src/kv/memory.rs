//! In-memory namespaced store

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use super::errors::{StoreError, StoreResult};
use super::NamespacedStore;

/// In-memory store: namespace -> key -> value
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NamespacedStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> StoreResult<String> {
        let data = self
            .data
            .read()
            .map_err(|_| StoreError::Backend("Lock poisoned".into()))?;

        data.get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn set(&self, namespace: &str, key: &str, value: &str) -> StoreResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| StoreError::Backend("Lock poisoned".into()))?;

        data.entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> StoreResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| StoreError::Backend("Lock poisoned".into()))?;

        if let Some(ns) = data.get_mut(namespace) {
            ns.remove(key);
        }
        Ok(())
    }

    fn list(&self, namespace: &str) -> StoreResult<BTreeMap<String, String>> {
        let data = self
            .data
            .read()
            .map_err(|_| StoreError::Backend("Lock poisoned".into()))?;

        Ok(data
            .get(namespace)
            .map(|ns| ns.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}
