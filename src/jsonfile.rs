//! Whole-document JSON files shared between processes
//!
//! Backs the file stores. Every access holds an advisory lock on a sidecar
//! `<name>.lock` file: shared for reads, exclusive for read-modify-write.
//! Writes go to a temp file in the same directory, are fsynced and then
//! renamed over the target, so readers only ever see a complete document.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("Failed to parse store: {0}")]
    Parse(serde_json::Error),

    #[error("Failed to serialize store: {0}")]
    Serialize(serde_json::Error),

    #[error("Lock poisoned")]
    Poisoned,
}

fn io_err(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> FileError {
    let context = context.into();
    move |source| FileError::Io { context, source }
}

/// Advisory lock held until drop
struct FileLock {
    file: File,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// One JSON document on disk
#[derive(Debug)]
pub struct JsonFile {
    path: PathBuf,
    lock_path: PathBuf,
    temp_path: PathBuf,
    // flock is per open file; this also orders threads sharing one instance
    local: Mutex<()>,
}

impl JsonFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());

        Self {
            lock_path: path.with_file_name(format!("{}.lock", name)),
            temp_path: path.with_file_name(format!(".{}.tmp", name)),
            path,
            local: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self, exclusive: bool) -> Result<FileLock, FileError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err("Failed to create store directory"))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(io_err("Failed to open lock file"))?;

        if exclusive {
            file.lock_exclusive()
        } else {
            file.lock_shared()
        }
        .map_err(io_err("Failed to lock store"))?;

        Ok(FileLock { file })
    }

    /// Current document; a missing file is the default document
    fn load<T: DeserializeOwned + Default>(&self) -> Result<T, FileError> {
        if !self.path.exists() {
            return Ok(T::default());
        }
        let content = fs::read_to_string(&self.path).map_err(io_err("Failed to read store"))?;
        serde_json::from_str(&content).map_err(FileError::Parse)
    }

    fn save<T: Serialize>(&self, doc: &T) -> Result<(), FileError> {
        let content = serde_json::to_string_pretty(doc).map_err(FileError::Serialize)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.temp_path)
            .map_err(io_err("Failed to create temp store file"))?;
        file.write_all(content.as_bytes())
            .map_err(io_err("Failed to write store"))?;
        file.sync_all().map_err(io_err("Failed to fsync store"))?;

        fs::rename(&self.temp_path, &self.path).map_err(io_err("Failed to replace store"))?;

        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }

    /// Run `f` against the document under a shared lock
    pub fn view<T, R, E>(&self, f: impl FnOnce(&T) -> Result<R, E>) -> Result<R, E>
    where
        T: DeserializeOwned + Default,
        E: From<FileError>,
    {
        let _local = self.local.lock().map_err(|_| FileError::Poisoned)?;
        let _lock = self.lock(false)?;
        let doc = self.load()?;
        f(&doc)
    }

    /// Load, apply `f` and write back under an exclusive lock
    ///
    /// Nothing is written when `f` fails.
    pub fn update<T, R, E>(&self, f: impl FnOnce(&mut T) -> Result<R, E>) -> Result<R, E>
    where
        T: Serialize + DeserializeOwned + Default,
        E: From<FileError>,
    {
        let _local = self.local.lock().map_err(|_| FileError::Poisoned)?;
        let _lock = self.lock(true)?;
        let mut doc = self.load()?;
        let result = f(&mut doc)?;
        self.save(&doc)?;
        Ok(result)
    }
}
