//! Document store collaborator.
//!
//! The core never touches the filesystem directly; module resolution, module
//! loading and the diagnostic report all go through [`DocumentStore`], keyed by
//! vault-relative slash paths.

use crate::error::{Error, Result};
use rustc_hash::FxHashMap as HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Narrow storage interface over a vault.
pub trait DocumentStore: Send + Sync {
    /// Whether a file exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Read a file as text.
    fn read(&self, path: &str) -> Result<String>;

    /// Read a file as raw bytes.
    fn read_binary(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or replace a text file.
    fn write(&self, path: &str, text: &str) -> Result<()>;
}

/// Store backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, path: &str) -> PathBuf {
        let mut abs = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty() && *p != ".") {
            abs.push(part);
        }
        abs
    }
}

impl DocumentStore for FsStore {
    fn exists(&self, path: &str) -> bool {
        self.absolute(path).is_file()
    }

    fn read(&self, path: &str) -> Result<String> {
        livedoc_util::fs::read_text_lossy(&self.absolute(path))
            .map_err(|e| Error::store(path, e.to_string()))
    }

    fn read_binary(&self, path: &str) -> Result<Vec<u8>> {
        std::fs::read(self.absolute(path)).map_err(|e| Error::store(path, e.to_string()))
    }

    fn write(&self, path: &str, text: &str) -> Result<()> {
        livedoc_util::fs::write_atomic(&self.absolute(path), text.as_bytes())
            .map_err(|e| Error::store(path, e.to_string()))
    }
}

/// In-memory store, used by tests and by hosts that keep documents in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with_file(self, path: &str, text: &str) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&self, path: &str, text: &str) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), text.as_bytes().to_vec());
    }

    pub fn remove(&self, path: &str) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }

    /// Current content of a file, if present.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<String> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

impl DocumentStore for MemoryStore {
    fn exists(&self, path: &str) -> bool {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    fn read(&self, path: &str) -> Result<String> {
        self.get(path)
            .ok_or_else(|| Error::store(path, "file not found"))
    }

    fn read_binary(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| Error::store(path, "file not found"))
    }

    fn write(&self, path: &str, text: &str) -> Result<()> {
        self.insert(path, text);
        Ok(())
    }
}
