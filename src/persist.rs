//! Whole-document persistence for the user and history state.
//! Each document is rewritten in full on every mutation: serialize, write a
//! temp file beside the target, then rename over it.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::error::AppError;

pub const USERS_DOCUMENT: &str = "user_data.json";
pub const HISTORY_DOCUMENT: &str = "history.json";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {doc}: {source}")]
    Io { doc: String, #[source] source: std::io::Error },
    #[error("JSON error on {doc}: {source}")]
    Json { doc: String, #[source] source: serde_json::Error },
    #[error("document store rejected write of {0}")]
    Rejected(String),
}

impl From<PersistError> for AppError {
    fn from(err: PersistError) -> Self {
        error!(target: "filesync::persist", "persist failure: {}", err);
        AppError::Persist { code: "persist_failed".into(), message: err.to_string() }
    }
}

/// Durable home for named state documents.
pub trait DocumentStore: Send + Sync {
    /// Returns `None` when the document has never been written.
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, PersistError>;
    fn save(&self, name: &str, bytes: &[u8]) -> Result<(), PersistError>;
}

/// Documents stored as plain files under one directory.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    dir: PathBuf,
}

impl FsDocumentStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self { Self { dir: dir.as_ref().to_path_buf() } }

    pub fn dir(&self) -> &Path { &self.dir }

    fn doc_path(&self, name: &str) -> PathBuf { self.dir.join(name) }
}

impl DocumentStore for FsDocumentStore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, PersistError> {
        match fs::read(self.doc_path(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistError::Io { doc: name.to_string(), source: e }),
        }
    }

    fn save(&self, name: &str, bytes: &[u8]) -> Result<(), PersistError> {
        let io_err = |source| PersistError::Io { doc: name.to_string(), source };
        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let target = self.doc_path(name);
        let tmp = self.dir.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()));
        if let Err(e) = write_synced(&tmp, bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }
        debug!(target: "filesync::persist", "saved {} ({} bytes)", target.display(), bytes.len());
        Ok(())
    }
}

/// Write `bytes` to a fresh file and flush it to disk before returning.
fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut f = fs::File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}

/// Documents held in memory only; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self { Self::default() }
}

impl DocumentStore for MemoryDocumentStore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, PersistError> {
        Ok(self.docs.lock().get(name).cloned())
    }

    fn save(&self, name: &str, bytes: &[u8]) -> Result<(), PersistError> {
        self.docs.lock().insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}

pub fn load_json<T: DeserializeOwned>(store: &dyn DocumentStore, name: &str) -> Result<Option<T>, PersistError> {
    let Some(bytes) = store.load(name)? else { return Ok(None); };
    let value = serde_json::from_slice(&bytes).map_err(|source| PersistError::Json { doc: name.to_string(), source })?;
    Ok(Some(value))
}

pub fn save_json<T: Serialize>(store: &dyn DocumentStore, name: &str, value: &T) -> Result<(), PersistError> {
    let bytes = serde_json::to_vec(value).map_err(|source| PersistError::Json { doc: name.to_string(), source })?;
    store.save(name, &bytes)
}
