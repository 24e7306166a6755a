//!
//! filesync service
//! ----------------
//! Explicitly constructed bundle of the user store, change log and file-action
//! engine for one data root. This is the request surface: every operation
//! takes an already-authenticated identity.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::diff::{self, DiffOutcome};
use crate::engine::{FileAction, FileActionEngine};
use crate::error::{AppError, AppResult};
use crate::history::{now_secs, ChangeLog};
use crate::persist::{self, DocumentStore, FsDocumentStore, HISTORY_DOCUMENT, USERS_DOCUMENT};
use crate::paths;
use crate::users::{StorageRootId, UserStore};

pub struct SyncService {
    data_root: PathBuf,
    users: Arc<UserStore>,
    history: Arc<ChangeLog>,
    engine: FileActionEngine,
}

impl SyncService {
    /// Open (or initialise) the data root: documents live directly under it,
    /// storage roots under `<root>/user_dirs`.
    pub fn open<P: AsRef<Path>>(data_root: P) -> AppResult<Self> {
        let root = data_root.as_ref();
        fs::create_dir_all(root)?;
        let docs: Arc<dyn DocumentStore> = Arc::new(FsDocumentStore::new(root));
        Self::with_documents(root, docs)
    }

    /// Like [`SyncService::open`] but with a caller-supplied document store.
    pub fn with_documents<P: AsRef<Path>>(data_root: P, docs: Arc<dyn DocumentStore>) -> AppResult<Self> {
        let data_root = data_root.as_ref().to_path_buf();
        let user_dirs = paths::user_dirs(&data_root);
        fs::create_dir_all(&user_dirs)?;
        let users = Arc::new(UserStore::load(docs.clone(), &user_dirs)?);
        let history = Arc::new(ChangeLog::load(docs)?);
        let engine = FileActionEngine::new(users.clone(), history.clone());
        Ok(Self { data_root, users, history, engine })
    }

    pub fn data_root(&self) -> &Path { &self.data_root }
    pub fn users(&self) -> &UserStore { &self.users }
    pub fn history(&self) -> &ChangeLog { &self.history }

    pub fn register(&self, identity: &str, credential: &str) -> AppResult<StorageRootId> {
        self.users.register(identity, credential, &self.history)
    }

    pub fn verify(&self, identity: &str, credential: &str) -> bool { self.users.verify(identity, credential) }

    pub fn diffs_since(&self, identity: &str, since: f64) -> AppResult<DiffOutcome> {
        diff::since(&self.users, &self.history, identity, since)
    }

    pub fn apply(&self, identity: &str, action: FileAction) -> AppResult<String> { self.engine.apply(identity, action) }

    pub fn upload(&self, identity: &str, path: &str, content: &[u8]) -> AppResult<String> {
        self.engine.upload(identity, path, content)
    }

    pub fn update(&self, identity: &str, path: &str, content: &[u8]) -> AppResult<String> {
        self.engine.update(identity, path, content)
    }

    pub fn delete(&self, identity: &str, path: &str) -> AppResult<String> { self.engine.delete(identity, path) }

    pub fn copy(&self, identity: &str, src: &str, dst: &str) -> AppResult<String> { self.engine.copy(identity, src, dst) }

    pub fn move_file(&self, identity: &str, src: &str, dst: &str) -> AppResult<String> {
        self.engine.move_file(identity, src, dst)
    }

    pub fn download(&self, identity: &str, path: &str) -> AppResult<Vec<u8>> { self.engine.download(identity, path) }

    /// Write point-in-time copies of both documents into `folder`, or into
    /// `<root>/backup/<unix seconds>` when none is given. The folder must not exist.
    pub fn backup(&self, folder: Option<PathBuf>) -> AppResult<PathBuf> {
        let target = match folder {
            Some(f) => f,
            None => paths::backup_root(&self.data_root).join(format!("{:.6}", now_secs())),
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Err(e) = fs::create_dir(&target) {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                warn!(target: "filesync::backup", "backup folder '{}' already exists", target.display());
                return Err(AppError::already_exists(
                    "backup_exists",
                    format!("backup folder '{}' already exists", target.display()),
                ));
            }
            return Err(e.into());
        }
        // Both read guards are held together so no registration lands between the copies.
        let (users, history) = self.users.read_with(|u| self.history.read_with(|h| (u.clone(), h.clone())));
        let out = FsDocumentStore::new(&target);
        persist::save_json(&out, USERS_DOCUMENT, &users)?;
        persist::save_json(&out, HISTORY_DOCUMENT, &history)?;
        info!(
            target: "filesync::backup",
            "backup written to '{}' ({} users, {} log entries)",
            target.display(), users.users.len(), history.len()
        );
        Ok(target)
    }
}
