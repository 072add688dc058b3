//! Durable store backends for the history ledger.

use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// External key-value store holding serialized history blobs.
///
/// Callers treat any error as "no history"; implementations should not try
/// to hide failures themselves.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn load(&self, scope: &str) -> Result<Option<String>>;
    async fn save(&self, scope: &str, blob: &str) -> Result<()>;
    fn name(&self) -> &'static str;
}

#[derive(Default)]
pub struct MemoryStore {
    blobs: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw blob for a scope.
    pub fn get(&self, scope: &str) -> Option<String> {
        self.blobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(scope)
            .cloned()
    }

    pub fn insert(&self, scope: impl Into<String>, blob: impl Into<String>) {
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(scope.into(), blob.into());
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn load(&self, scope: &str) -> Result<Option<String>> {
        Ok(self.get(scope))
    }
    async fn save(&self, scope: &str, blob: &str) -> Result<()> {
        self.insert(scope, blob);
        Ok(())
    }
    fn name(&self) -> &'static str {
        "memory"
    }
}

/// One JSON file per scope inside a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, scope: &str) -> PathBuf {
        let safe: String = scope
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }

    fn store_error(&self, action: &str, path: &Path, e: std::io::Error) -> Error {
        Error::store_with_context(
            format!("failed to {} history blob", action),
            ErrorContext::new()
                .with_field_path(path.display().to_string())
                .with_details(e.to_string())
                .with_source("file_store"),
        )
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn load(&self, scope: &str) -> Result<Option<String>> {
        let path = self.path_for(scope);
        match tokio::fs::read_to_string(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.store_error("read", &path, e)),
        }
    }

    async fn save(&self, scope: &str, blob: &str) -> Result<()> {
        let path = self.path_for(scope);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.store_error("create directory for", &path, e))?;
        // write-then-rename so a crash never leaves a truncated blob
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, blob)
            .await
            .map_err(|e| self.store_error("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| self.store_error("replace", &path, e))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Discards writes and never has anything to load.
pub struct NullStore;

impl NullStore {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for NullStore {
    async fn load(&self, _: &str) -> Result<Option<String>> {
        Ok(None)
    }
    async fn save(&self, _: &str, _: &str) -> Result<()> {
        Ok(())
    }
    fn name(&self) -> &'static str {
        "null"
    }
}
