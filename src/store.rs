use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

pub mod models;

pub const ACUITY_USER_ID: &str = "ACUITY_USER_ID";
pub const ACUITY_API_KEY: &str = "ACUITY_API_KEY";
pub const COURSE_TUTOR_MAP: &str = "COURSE_TUTOR_MAP";
pub const COURSE_REMOTE_URL: &str = "COURSE_REMOTE_URL";
pub const COURSE_REMOTE_TOKEN: &str = "COURSE_REMOTE_TOKEN";

/// Persistent key-value storage local to this device
pub trait KeyValueStore {
    /// Values of the requested keys, absent keys are left out
    fn get(&self, keys: &[&str]) -> Result<Map<String, Value>>;

    /// Merge the entries into the store, other keys are kept
    fn set(&self, values: Map<String, Value>) -> Result<()>;
}

/// Store backed by a single JSON object on disk
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/tutorcal/storage.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tutorcal")
            .join("storage.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::CorruptStore(self.path.clone())),
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        let mut all = self.read_all()?;
        Ok(keys
            .iter()
            .filter_map(|key| all.remove(*key).map(|value| ((*key).to_owned(), value)))
            .collect())
    }

    fn set(&self, values: Map<String, Value>) -> Result<()> {
        let mut all = self.read_all()?;
        all.extend(values);

        write_atomically(&self.path, &Value::Object(all))?;
        tracing::debug!(path = %self.path.display(), "local store updated");

        Ok(())
    }
}

/// Write JSON next to its destination then swap it in
pub fn write_atomically(path: &Path, value: &Value) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    file.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// In-memory store, nothing survives the process
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    values: std::sync::Mutex<Map<String, Value>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        let values = self.values.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(keys
            .iter()
            .filter_map(|key| values.get(*key).map(|value| ((*key).to_owned(), value.clone())))
            .collect())
    }

    fn set(&self, entries: Map<String, Value>) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend(entries);
        Ok(())
    }
}
