//! # Execution Store
//!
//! Durable storage for functions, their versions and their executions.
//! Both backends share one in-memory [`Catalog`] so cascade rules and
//! status transitions behave identically.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use super::errors::{FunctionError, FunctionResult};
use super::execution::{Execution, ExecutionOutcome};
use super::function::{Function, FunctionVersion, Pagination};
use crate::jsonfile::JsonFile;

/// Trait for function/execution storage
pub trait ExecutionStore: Send + Sync + std::fmt::Debug {
    fn create_function(&self, function: Function) -> FunctionResult<Function>;

    fn get_function(&self, id: &str) -> FunctionResult<Function>;

    fn update_function(&self, function: Function) -> FunctionResult<Function>;

    /// Delete a function together with its versions and executions
    fn delete_function(&self, id: &str) -> FunctionResult<()>;

    /// One page of functions ordered by name, plus the total count
    fn list_functions(&self, page: Pagination) -> FunctionResult<(Vec<Function>, usize)>;

    /// Save code as the next version of a function
    fn create_version(
        &self,
        function_id: &str,
        code: &str,
        commit_message: Option<String>,
    ) -> FunctionResult<FunctionVersion>;

    fn get_version(&self, id: &str) -> FunctionResult<FunctionVersion>;

    /// Highest-numbered version of a function
    fn active_version(&self, function_id: &str) -> FunctionResult<FunctionVersion>;

    /// Versions ordered newest first
    fn list_versions(&self, function_id: &str) -> FunctionResult<Vec<FunctionVersion>>;

    /// Delete all but the newest `keep` versions; returns how many were removed
    fn prune_versions(&self, function_id: &str, keep: usize) -> FunctionResult<usize>;

    fn create_execution(&self, execution: Execution) -> FunctionResult<Execution>;

    fn mark_running(&self, id: &str) -> FunctionResult<Execution>;

    /// Write the terminal status, output and logs in one step
    fn finalize_execution(&self, id: &str, outcome: ExecutionOutcome)
        -> FunctionResult<Execution>;

    fn get_execution(&self, id: &str) -> FunctionResult<Execution>;

    /// One page of a function's executions, newest first, plus the total count
    fn list_executions(
        &self,
        function_id: &str,
        page: Pagination,
    ) -> FunctionResult<(Vec<Execution>, usize)>;

    /// Delete every execution created strictly before `cutoff` (unix seconds)
    fn delete_old_executions(&self, cutoff: i64) -> FunctionResult<u64>;
}

/// The stored document shared by both backends
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    functions: BTreeMap<String, Function>,
    #[serde(default)]
    versions: BTreeMap<String, FunctionVersion>,
    #[serde(default)]
    executions: BTreeMap<String, Execution>,
}

impl Catalog {
    fn create_function(&mut self, function: Function) -> FunctionResult<Function> {
        if self.functions.contains_key(&function.id)
            || self.functions.values().any(|f| f.name == function.name)
        {
            return Err(FunctionError::AlreadyExists(function.name));
        }
        self.functions.insert(function.id.clone(), function.clone());
        Ok(function)
    }

    fn get_function(&self, id: &str) -> FunctionResult<Function> {
        self.functions
            .get(id)
            .cloned()
            .ok_or_else(|| FunctionError::NotFound(id.to_string()))
    }

    fn update_function(&mut self, function: Function) -> FunctionResult<Function> {
        if !self.functions.contains_key(&function.id) {
            return Err(FunctionError::NotFound(function.id));
        }
        if self
            .functions
            .values()
            .any(|f| f.name == function.name && f.id != function.id)
        {
            return Err(FunctionError::AlreadyExists(function.name));
        }
        self.functions.insert(function.id.clone(), function.clone());
        Ok(function)
    }

    fn delete_function(&mut self, id: &str) -> FunctionResult<()> {
        if self.functions.remove(id).is_none() {
            return Err(FunctionError::NotFound(id.to_string()));
        }
        self.versions.retain(|_, v| v.function_id != id);
        self.executions.retain(|_, e| e.function_id != id);
        Ok(())
    }

    fn list_functions(&self, page: Pagination) -> (Vec<Function>, usize) {
        let mut all: Vec<&Function> = self.functions.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        let total = all.len();
        let items = all
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect();
        (items, total)
    }

    fn versions_of(&self, function_id: &str) -> Vec<&FunctionVersion> {
        let mut versions: Vec<&FunctionVersion> = self
            .versions
            .values()
            .filter(|v| v.function_id == function_id)
            .collect();
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        versions
    }

    fn create_version(
        &mut self,
        function_id: &str,
        code: &str,
        commit_message: Option<String>,
    ) -> FunctionResult<FunctionVersion> {
        if !self.functions.contains_key(function_id) {
            return Err(FunctionError::NotFound(function_id.to_string()));
        }
        let next = self
            .versions_of(function_id)
            .first()
            .map(|v| v.version + 1)
            .unwrap_or(1);

        let version = FunctionVersion::new(function_id, next, code, commit_message);
        self.versions.insert(version.id.clone(), version.clone());
        Ok(version)
    }

    fn get_version(&self, id: &str) -> FunctionResult<FunctionVersion> {
        self.versions
            .get(id)
            .cloned()
            .ok_or_else(|| FunctionError::VersionNotFound(id.to_string()))
    }

    fn active_version(&self, function_id: &str) -> FunctionResult<FunctionVersion> {
        if !self.functions.contains_key(function_id) {
            return Err(FunctionError::NotFound(function_id.to_string()));
        }
        self.versions_of(function_id)
            .first()
            .map(|v| (*v).clone())
            .ok_or_else(|| FunctionError::VersionNotFound(format!("{} has no versions", function_id)))
    }

    fn prune_versions(&mut self, function_id: &str, keep: usize) -> FunctionResult<usize> {
        if !self.functions.contains_key(function_id) {
            return Err(FunctionError::NotFound(function_id.to_string()));
        }
        let doomed: Vec<String> = self
            .versions_of(function_id)
            .into_iter()
            .skip(keep)
            .map(|v| v.id.clone())
            .collect();

        for id in &doomed {
            self.versions.remove(id);
        }
        Ok(doomed.len())
    }

    fn create_execution(&mut self, execution: Execution) -> FunctionResult<Execution> {
        if !self.functions.contains_key(&execution.function_id) {
            return Err(FunctionError::NotFound(execution.function_id));
        }
        if self.executions.contains_key(&execution.id) {
            return Err(FunctionError::AlreadyExists(execution.id));
        }
        self.executions
            .insert(execution.id.clone(), execution.clone());
        Ok(execution)
    }

    fn execution_mut(&mut self, id: &str) -> FunctionResult<&mut Execution> {
        self.executions
            .get_mut(id)
            .ok_or_else(|| FunctionError::ExecutionNotFound(id.to_string()))
    }

    fn mark_running(&mut self, id: &str) -> FunctionResult<Execution> {
        let exec = self.execution_mut(id)?;
        exec.mark_running()?;
        Ok(exec.clone())
    }

    fn finalize_execution(
        &mut self,
        id: &str,
        outcome: ExecutionOutcome,
    ) -> FunctionResult<Execution> {
        let exec = self.execution_mut(id)?;
        // Finalize a copy so a rejected transition leaves the stored record untouched
        let mut updated = exec.clone();
        updated.finalize(outcome)?;
        *exec = updated.clone();
        Ok(updated)
    }

    fn get_execution(&self, id: &str) -> FunctionResult<Execution> {
        self.executions
            .get(id)
            .cloned()
            .ok_or_else(|| FunctionError::ExecutionNotFound(id.to_string()))
    }

    fn list_executions(&self, function_id: &str, page: Pagination) -> (Vec<Execution>, usize) {
        let mut all: Vec<&Execution> = self
            .executions
            .values()
            .filter(|e| e.function_id == function_id)
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let total = all.len();
        let items = all
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect();
        (items, total)
    }

    fn delete_old_executions(&mut self, cutoff: i64) -> u64 {
        let before = self.executions.len();
        self.executions.retain(|_, e| e.created_at >= cutoff);
        (before - self.executions.len()) as u64
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryExecutionStore {
    catalog: RwLock<Catalog>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Catalog) -> FunctionResult<T>) -> FunctionResult<T> {
        let catalog = self
            .catalog
            .read()
            .map_err(|_| FunctionError::Internal("Lock poisoned".into()))?;
        f(&catalog)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Catalog) -> FunctionResult<T>) -> FunctionResult<T> {
        let mut catalog = self
            .catalog
            .write()
            .map_err(|_| FunctionError::Internal("Lock poisoned".into()))?;
        f(&mut catalog)
    }
}

/// JSON file-based store
///
/// Every operation loads the document under a file lock shared with other
/// processes; mutations rewrite it atomically before the lock is released.
#[derive(Debug)]
pub struct FileExecutionStore {
    file: JsonFile,
}

impl FileExecutionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn read<T>(&self, f: impl FnOnce(&Catalog) -> FunctionResult<T>) -> FunctionResult<T> {
        self.file.view(f)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Catalog) -> FunctionResult<T>) -> FunctionResult<T> {
        self.file.update(f)
    }
}

macro_rules! impl_execution_store {
    ($ty:ty) => {
        impl ExecutionStore for $ty {
            fn create_function(&self, function: Function) -> FunctionResult<Function> {
                self.write(|c| c.create_function(function))
            }

            fn get_function(&self, id: &str) -> FunctionResult<Function> {
                self.read(|c| c.get_function(id))
            }

            fn update_function(&self, function: Function) -> FunctionResult<Function> {
                self.write(|c| c.update_function(function))
            }

            fn delete_function(&self, id: &str) -> FunctionResult<()> {
                self.write(|c| c.delete_function(id))
            }

            fn list_functions(&self, page: Pagination) -> FunctionResult<(Vec<Function>, usize)> {
                self.read(|c| Ok(c.list_functions(page)))
            }

            fn create_version(
                &self,
                function_id: &str,
                code: &str,
                commit_message: Option<String>,
            ) -> FunctionResult<FunctionVersion> {
                self.write(|c| c.create_version(function_id, code, commit_message))
            }

            fn get_version(&self, id: &str) -> FunctionResult<FunctionVersion> {
                self.read(|c| c.get_version(id))
            }

            fn active_version(&self, function_id: &str) -> FunctionResult<FunctionVersion> {
                self.read(|c| c.active_version(function_id))
            }

            fn list_versions(&self, function_id: &str) -> FunctionResult<Vec<FunctionVersion>> {
                self.read(|c| {
                    Ok(c.versions_of(function_id).into_iter().cloned().collect())
                })
            }

            fn prune_versions(&self, function_id: &str, keep: usize) -> FunctionResult<usize> {
                self.write(|c| c.prune_versions(function_id, keep))
            }

            fn create_execution(&self, execution: Execution) -> FunctionResult<Execution> {
                self.write(|c| c.create_execution(execution))
            }

            fn mark_running(&self, id: &str) -> FunctionResult<Execution> {
                self.write(|c| c.mark_running(id))
            }

            fn finalize_execution(
                &self,
                id: &str,
                outcome: ExecutionOutcome,
            ) -> FunctionResult<Execution> {
                self.write(|c| c.finalize_execution(id, outcome))
            }

            fn get_execution(&self, id: &str) -> FunctionResult<Execution> {
                self.read(|c| c.get_execution(id))
            }

            fn list_executions(
                &self,
                function_id: &str,
                page: Pagination,
            ) -> FunctionResult<(Vec<Execution>, usize)> {
                self.read(|c| Ok(c.list_executions(function_id, page)))
            }

            fn delete_old_executions(&self, cutoff: i64) -> FunctionResult<u64> {
                self.write(|c| Ok(c.delete_old_executions(cutoff)))
            }
        }
    };
}

impl_execution_store!(MemoryExecutionStore);
impl_execution_store!(FileExecutionStore);
