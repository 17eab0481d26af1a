//! JSON file-backed namespaced store
//!
//! The whole document is rewritten on every mutation under a file lock, so
//! the CLI and a running housekeeper can share one data directory. Not meant
//! for high write rates.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::errors::{StoreError, StoreResult};
use super::NamespacedStore;
use crate::jsonfile::JsonFile;

type Document = HashMap<String, BTreeMap<String, String>>;

/// JSON file-based store
#[derive(Debug)]
pub struct FileStore {
    file: JsonFile,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }
}

impl NamespacedStore for FileStore {
    fn get(&self, namespace: &str, key: &str) -> StoreResult<String> {
        self.file.view(|doc: &Document| {
            doc.get(namespace)
                .and_then(|ns| ns.get(key))
                .cloned()
                .ok_or_else(|| StoreError::NotFound(key.to_string()))
        })
    }

    fn set(&self, namespace: &str, key: &str, value: &str) -> StoreResult<()> {
        self.file.update(|doc: &mut Document| {
            doc.entry(namespace.to_string())
                .or_default()
                .insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn delete(&self, namespace: &str, key: &str) -> StoreResult<()> {
        self.file.update(|doc: &mut Document| {
            if let Some(ns) = doc.get_mut(namespace) {
                ns.remove(key);
                if ns.is_empty() {
                    doc.remove(namespace);
                }
            }
            Ok(())
        })
    }

    fn list(&self, namespace: &str) -> StoreResult<BTreeMap<String, String>> {
        self.file
            .view(|doc: &Document| Ok(doc.get(namespace).cloned().unwrap_or_default()))
    }

    fn clear(&self, namespace: &str) -> StoreResult<usize> {
        self.file
            .update(|doc: &mut Document| Ok(doc.remove(namespace).map_or(0, |ns| ns.len())))
    }
}
