//! Per-user file actions: upload, update, delete, copy, move and download.
//!
//! Every action resolves paths against the caller's primary storage root and
//! holds that root's lock for the whole check / mutate / record sequence, so
//! actions inside one root are serialized while different users proceed in
//! parallel. The filesystem mutation always completes before the change log is
//! written; a failure in between leaves the log stale, never ahead of the disk.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::history::{ActionKind, ChangeLog};
use crate::paths::{log_key, normalize_relative_path};
use crate::users::{StorageRootId, UserStore};

/// One file operation, as requested by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileAction {
    Upload { path: String, content: Vec<u8> },
    Update { path: String, content: Vec<u8> },
    Delete { path: String },
    Copy { src: String, dst: String },
    Move { src: String, dst: String },
}

impl FileAction {
    pub fn name(&self) -> &'static str {
        match self {
            FileAction::Upload { .. } => "upload",
            FileAction::Update { .. } => "update",
            FileAction::Delete { .. } => "delete",
            FileAction::Copy { .. } => "copy",
            FileAction::Move { .. } => "move",
        }
    }
}

/// Resolved location of a client path inside a storage root.
struct Target {
    key: String,
    disk: PathBuf,
}

pub struct FileActionEngine {
    users: Arc<UserStore>,
    history: Arc<ChangeLog>,
    root_locks: Mutex<HashMap<StorageRootId, Arc<Mutex<()>>>>,
}

impl FileActionEngine {
    pub fn new(users: Arc<UserStore>, history: Arc<ChangeLog>) -> Self {
        Self { users, history, root_locks: Mutex::new(HashMap::new()) }
    }

    fn root_lock(&self, root: &str) -> Arc<Mutex<()>> {
        self.root_locks.lock().entry(root.to_string()).or_default().clone()
    }

    fn target(&self, root: &str, relative: &str) -> AppResult<Target> {
        let rel = normalize_relative_path(relative)?;
        let mut disk = self.users.user_dirs().join(root);
        for seg in rel.split('/') {
            disk.push(seg);
        }
        Ok(Target { key: log_key(root, &rel), disk })
    }

    fn require_logged(&self, t: &Target) -> AppResult<()> {
        if self.history.get(&t.key).is_none() {
            return Err(AppError::missing_file("missing_file", format!("no change-log entry for '{}'", t.key)));
        }
        Ok(())
    }

    /// Apply one action for `identity`. Returns the change-log key it recorded
    /// (the destination key for copy and move).
    pub fn apply(&self, identity: &str, action: FileAction) -> AppResult<String> {
        let root = self.users.primary_root(identity)?;
        let lock = self.root_lock(&root);
        let _guard = lock.lock();
        let key = match &action {
            FileAction::Upload { path, content } => self.upload_locked(&root, path, content)?,
            FileAction::Update { path, content } => self.update_locked(&root, path, content)?,
            FileAction::Delete { path } => self.delete_locked(&root, path)?,
            FileAction::Copy { src, dst } => self.transfer_locked(&root, src, dst, ActionKind::Cp)?,
            FileAction::Move { src, dst } => self.transfer_locked(&root, src, dst, ActionKind::Mv)?,
        };
        info!(target: "filesync::engine", "{} ok user='{}' key='{}'", action.name(), identity, key);
        Ok(key)
    }

    pub fn upload(&self, identity: &str, path: &str, content: &[u8]) -> AppResult<String> {
        self.apply(identity, FileAction::Upload { path: path.to_string(), content: content.to_vec() })
    }

    pub fn update(&self, identity: &str, path: &str, content: &[u8]) -> AppResult<String> {
        self.apply(identity, FileAction::Update { path: path.to_string(), content: content.to_vec() })
    }

    pub fn delete(&self, identity: &str, path: &str) -> AppResult<String> {
        self.apply(identity, FileAction::Delete { path: path.to_string() })
    }

    pub fn copy(&self, identity: &str, src: &str, dst: &str) -> AppResult<String> {
        self.apply(identity, FileAction::Copy { src: src.to_string(), dst: dst.to_string() })
    }

    pub fn move_file(&self, identity: &str, src: &str, dst: &str) -> AppResult<String> {
        self.apply(identity, FileAction::Move { src: src.to_string(), dst: dst.to_string() })
    }

    /// Read a file from the caller's primary root. Records nothing.
    pub fn download(&self, identity: &str, path: &str) -> AppResult<Vec<u8>> {
        let root = self.users.primary_root(identity)?;
        let t = self.target(&root, path)?;
        let lock = self.root_lock(&root);
        let _guard = lock.lock();
        if !t.disk.is_file() {
            return Err(AppError::not_found("file_not_found", format!("'{}' not found", path)));
        }
        Ok(fs::read(&t.disk)?)
    }

    fn upload_locked(&self, root: &str, path: &str, content: &[u8]) -> AppResult<String> {
        let t = self.target(root, path)?;
        if t.disk.exists() {
            return Err(AppError::already_exists("file_exists", format!("'{}' already exists", path)));
        }
        // Walk the parent chain one segment at a time, reusing what is there.
        let mut dir = self.users.user_dirs().join(root);
        let segments: Vec<&str> = t.key.split('/').skip(1).collect();
        if let Some((_, parents)) = segments.split_last() {
            for seg in parents {
                dir.push(seg);
                if !dir.exists() {
                    fs::create_dir(&dir)?;
                } else if !dir.is_dir() {
                    return Err(AppError::already_exists(
                        "path_conflict",
                        format!("'{}' is a file, not a directory", seg),
                    ));
                }
            }
        }
        fs::write(&t.disk, content)?;
        self.history.record(ActionKind::New, &t.key, None)?;
        Ok(t.key)
    }

    fn update_locked(&self, root: &str, path: &str, content: &[u8]) -> AppResult<String> {
        let t = self.target(root, path)?;
        if !t.disk.is_file() {
            return Err(AppError::not_found("file_not_found", format!("'{}' not found", path)));
        }
        self.require_logged(&t)?;
        fs::write(&t.disk, content)?;
        self.history.record(ActionKind::Modify, &t.key, None)?;
        Ok(t.key)
    }

    fn delete_locked(&self, root: &str, path: &str) -> AppResult<String> {
        let t = self.target(root, path)?;
        if !t.disk.is_file() {
            return Err(AppError::not_found("file_not_found", format!("'{}' not found", path)));
        }
        self.require_logged(&t)?;
        fs::remove_file(&t.disk)?;
        self.history.record(ActionKind::Rm, &t.key, None)?;
        Ok(t.key)
    }

    /// Copy or move onto an existing destination.
    fn transfer_locked(&self, root: &str, src: &str, dst: &str, kind: ActionKind) -> AppResult<String> {
        let from = self.target(root, src)?;
        let to = self.target(root, dst)?;
        if from.key == to.key {
            return Err(AppError::malformed("same_path", format!("source and destination are both '{}'", src)));
        }
        if !from.disk.is_file() {
            return Err(AppError::not_found("source_not_found", format!("'{}' not found", src)));
        }
        if !to.disk.is_file() {
            return Err(AppError::destination_missing("destination_not_found", format!("'{}' not found", dst)));
        }
        self.require_logged(&from)?;
        match kind {
            ActionKind::Mv => fs::rename(&from.disk, &to.disk)?,
            _ => { fs::copy(&from.disk, &to.disk)?; }
        }
        self.history.record(kind, &from.key, Some(&to.key))?;
        Ok(to.key)
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;
