//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::persist::{DocumentStore, MemoryDocumentStore, PersistError};

/// In-memory documents whose writes can be switched off to simulate a full disk.
#[derive(Default)]
pub struct FlakyDocs {
    inner: MemoryDocumentStore,
    fail_writes: AtomicBool,
}

impl FlakyDocs {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn fail_writes(&self, on: bool) { self.fail_writes.store(on, Ordering::SeqCst); }

    pub fn raw(&self, name: &str) -> Option<serde_json::Value> {
        self.inner.load(name).ok().flatten().map(|b| serde_json::from_slice(&b).unwrap())
    }
}

impl DocumentStore for FlakyDocs {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, PersistError> { self.inner.load(name) }

    fn save(&self, name: &str, bytes: &[u8]) -> Result<(), PersistError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistError::Rejected(name.to_string()));
        }
        self.inner.save(name, bytes)
    }
}
