//!
//! filesync user store
//! -------------------
//! Maps an identity to its credential hash and the storage roots it owns, and
//! issues storage-root ids from a process-wide hex counter.
//!
//! The whole document (`{counter_id, users}`) is rewritten on every mutation.
//! Mutation and persistence happen under one write lock; the in-memory copy is
//! only updated after the write succeeded.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::history::{ActionKind, ChangeLog};
use crate::persist::{self, DocumentStore, USERS_DOCUMENT};
use crate::security;

/// Hex-encoded storage-root identifier.
pub type StorageRootId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub psw: String,
    /// Owned roots; the first one is the primary root.
    pub paths: Vec<StorageRootId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsersDocument {
    pub counter_id: u64,
    pub users: BTreeMap<String, UserRecord>,
}

pub struct UserStore {
    doc: RwLock<UsersDocument>,
    docs: Arc<dyn DocumentStore>,
    user_dirs: PathBuf,
}

#[inline]
fn root_id_for(counter: u64) -> StorageRootId { format!("{:x}", counter) }

/// Identities travel in HTTP Basic credentials, where ':' separates the password.
fn validate_identity(identity: &str) -> AppResult<()> {
    if identity.is_empty() {
        return Err(AppError::malformed("missing_user", "identity cannot be empty"));
    }
    if identity.chars().any(|c| c == ':' || c.is_control()) {
        return Err(AppError::malformed(
            "invalid_user",
            format!("identity {:?} cannot contain ':' or control characters", identity),
        ));
    }
    Ok(())
}

impl UserStore {
    /// Load the store from its document; storage-root directories live under `user_dirs`.
    pub fn load<P: AsRef<Path>>(docs: Arc<dyn DocumentStore>, user_dirs: P) -> AppResult<Self> {
        let doc: UsersDocument = persist::load_json(docs.as_ref(), USERS_DOCUMENT)?.unwrap_or_default();
        info!(target: "filesync::users", "loaded {} users, next root id {}", doc.users.len(), root_id_for(doc.counter_id));
        Ok(Self { doc: RwLock::new(doc), docs, user_dirs: user_dirs.as_ref().to_path_buf() })
    }

    pub fn user_dirs(&self) -> &Path { &self.user_dirs }

    /// Register a new identity with a fresh storage root.
    ///
    /// The root directory is created first, then the users document is written,
    /// then a `new` entry for the root is appended to the change log.
    pub fn register(&self, identity: &str, raw_credential: &str, history: &ChangeLog) -> AppResult<StorageRootId> {
        validate_identity(identity)?;
        let psw = security::hash_password(raw_credential)?;
        let mut doc = self.doc.write();
        if doc.users.contains_key(identity) {
            return Err(AppError::already_exists("user_exists", format!("user '{}' already exists", identity)));
        }
        let root_id = root_id_for(doc.counter_id);
        let root_dir = self.user_dirs.join(&root_id);

        let mut next = doc.clone();
        next.counter_id += 1;

        if let Err(e) = fs::create_dir(&root_dir) {
            if e.kind() != std::io::ErrorKind::AlreadyExists {
                return Err(e.into());
            }
            // The id is burned either way so the next registration moves past it.
            warn!(target: "filesync::users", "storage root '{}' already exists on disk", root_dir.display());
            persist::save_json(self.docs.as_ref(), USERS_DOCUMENT, &next)?;
            *doc = next;
            return Err(AppError::already_exists("root_exists", format!("storage root '{}' already exists", root_id)));
        }

        next.users.insert(identity.to_string(), UserRecord { psw, paths: vec![root_id.clone()] });
        if let Err(e) = persist::save_json(self.docs.as_ref(), USERS_DOCUMENT, &next) {
            let _ = fs::remove_dir(&root_dir);
            return Err(e.into());
        }
        *doc = next;
        drop(doc);

        history.record(ActionKind::New, &root_id, None)?;
        info!(target: "filesync::users", "registered user '{}' with root '{}'", identity, root_id);
        Ok(root_id)
    }

    /// Fails closed: unknown identities never verify.
    pub fn verify(&self, identity: &str, raw_credential: &str) -> bool {
        let hash = match self.doc.read().users.get(identity) {
            Some(rec) => rec.psw.clone(),
            None => return false,
        };
        security::verify_password(&hash, raw_credential)
    }

    pub fn primary_root(&self, identity: &str) -> AppResult<StorageRootId> {
        self.doc.read().users.get(identity)
            .and_then(|rec| rec.paths.first().cloned())
            .ok_or_else(|| AppError::not_found("user_not_found", format!("unknown user '{}'", identity)))
    }

    pub fn owned_paths(&self, identity: &str) -> AppResult<Vec<StorageRootId>> {
        self.doc.read().users.get(identity)
            .map(|rec| rec.paths.clone())
            .ok_or_else(|| AppError::not_found("user_not_found", format!("unknown user '{}'", identity)))
    }

    pub fn contains(&self, identity: &str) -> bool { self.doc.read().users.contains_key(identity) }

    pub fn user_count(&self) -> usize { self.doc.read().users.len() }

    /// Run `f` against the document under the read lock.
    pub fn read_with<R>(&self, f: impl FnOnce(&UsersDocument) -> R) -> R { f(&self.doc.read()) }

    /// Immutable point-in-time copy of the whole document.
    pub fn snapshot(&self) -> UsersDocument { self.doc.read().clone() }
}

#[cfg(test)]
#[path = "users_tests.rs"]
mod users_tests;
