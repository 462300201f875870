use std::{
    fs,
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use serde::Serialize;
use serde_json::Value;

use crate::{error::Result, store::write_atomically};

/// Key under which the shared course map is kept
pub const COURSES_KEY: &str = "courses";

/// Durable storage for whole JSON documents
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Replace the document stored under `key`
    fn set(&self, key: &str, value: &Value) -> Result<()>;
}

/// One `<key>.json` file per document
pub struct FileBlobStore {
    dir: PathBuf,
    // Serializes writers of this process, the last one wins
    write_lock: Mutex<()>,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        match fs::read_to_string(self.path(key)) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        write_atomically(&self.path(key), value)
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<std::collections::HashMap<String, Value>>,
}

#[cfg(test)]
impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self
            .blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.clone());
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursesResponse {
    pub courses: Value,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct SavedResponse {
    pub saved: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
