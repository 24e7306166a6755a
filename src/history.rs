//!
//! filesync change log
//! -------------------
//! Per-path record of the most recent mutation. The log only ever inserts or
//! overwrites keys, so it holds one entry per path ever touched and no history
//! of intermediate states.
//!
//! Persisted as a single JSON object rewritten on every record:
//! `{path: [timestamp, kind]}` or `{path: [timestamp, "moved to"|"moved by"|"copied by", counterparty]}`.
//! The in-memory map is mutated under the write lock and rolled back if the
//! document cannot be written, so readers never see a change that is not durable.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::persist::{self, DocumentStore, HISTORY_DOCUMENT};

/// Seconds since the Unix epoch with microsecond resolution.
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Mutations a caller may ask the log to record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    New,
    Modify,
    Rm,
    Mv,
    Cp,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::New => "new",
            ActionKind::Modify => "modify",
            ActionKind::Rm => "rm",
            ActionKind::Mv => "mv",
            ActionKind::Cp => "cp",
        }
    }
}

impl FromStr for ActionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(ActionKind::New),
            "modify" => Ok(ActionKind::Modify),
            "rm" => Ok(ActionKind::Rm),
            "mv" => Ok(ActionKind::Mv),
            "cp" => Ok(ActionKind::Cp),
            other => Err(AppError::not_allowed("action_not_allowed", format!("unknown action kind '{}'", other))),
        }
    }
}

/// What the log says happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    New,
    Modify,
    Rm,
    MovedTo,
    MovedBy,
    CopiedBy,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::New => "new",
            ChangeKind::Modify => "modify",
            ChangeKind::Rm => "rm",
            ChangeKind::MovedTo => "moved to",
            ChangeKind::MovedBy => "moved by",
            ChangeKind::CopiedBy => "copied by",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(ChangeKind::New),
            "modify" => Some(ChangeKind::Modify),
            "rm" => Some(ChangeKind::Rm),
            "moved to" => Some(ChangeKind::MovedTo),
            "moved by" => Some(ChangeKind::MovedBy),
            "copied by" => Some(ChangeKind::CopiedBy),
            _ => None,
        }
    }

    fn has_counterparty(&self) -> bool {
        matches!(self, ChangeKind::MovedTo | ChangeKind::MovedBy | ChangeKind::CopiedBy)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Latest recorded mutation for one path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEntry", into = "RawEntry")]
pub struct ChangeEntry {
    pub timestamp: f64,
    pub kind: ChangeKind,
    pub counterparty: Option<String>,
}

impl ChangeEntry {
    fn plain(timestamp: f64, kind: ChangeKind) -> Self { Self { timestamp, kind, counterparty: None } }

    fn linked(timestamp: f64, kind: ChangeKind, other: &str) -> Self {
        Self { timestamp, kind, counterparty: Some(other.to_string()) }
    }
}

/// On-disk array form of an entry.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Linked(f64, String, String),
    Plain(f64, String),
}

impl TryFrom<RawEntry> for ChangeEntry {
    type Error = String;

    fn try_from(raw: RawEntry) -> Result<Self, Self::Error> {
        let (timestamp, kind, counterparty) = match raw {
            RawEntry::Linked(ts, k, other) => (ts, k, Some(other)),
            RawEntry::Plain(ts, k) => (ts, k, None),
        };
        let kind = ChangeKind::parse(&kind).ok_or_else(|| format!("unknown change kind '{}'", kind))?;
        if kind.has_counterparty() != counterparty.is_some() {
            return Err(format!("change kind '{}' has the wrong number of fields", kind));
        }
        Ok(ChangeEntry { timestamp, kind, counterparty })
    }
}

impl From<ChangeEntry> for RawEntry {
    fn from(e: ChangeEntry) -> Self {
        match e.counterparty {
            Some(other) => RawEntry::Linked(e.timestamp, e.kind.as_str().to_string(), other),
            None => RawEntry::Plain(e.timestamp, e.kind.as_str().to_string()),
        }
    }
}

pub type HistorySnapshot = BTreeMap<String, ChangeEntry>;

pub struct ChangeLog {
    entries: RwLock<HistorySnapshot>,
    docs: Arc<dyn DocumentStore>,
}

impl ChangeLog {
    /// Load the log from its document, starting empty when none was written yet.
    pub fn load(docs: Arc<dyn DocumentStore>) -> AppResult<Self> {
        let entries: HistorySnapshot = persist::load_json(docs.as_ref(), HISTORY_DOCUMENT)?.unwrap_or_default();
        debug!(target: "filesync::history", "loaded change log with {} entries", entries.len());
        Ok(Self { entries: RwLock::new(entries), docs })
    }

    /// Record one mutation.
    ///
    /// Every kind except `New` requires `path` to already be a key in the log;
    /// `Mv` and `Cp` require a destination. `Mv` writes both sides, `Cp` only
    /// the destination.
    pub fn record(&self, kind: ActionKind, path: &str, destination: Option<&str>) -> AppResult<()> {
        let mut map = self.entries.write();
        if kind != ActionKind::New && !map.contains_key(path) {
            return Err(AppError::missing_file("missing_file", format!("no change-log entry for '{}'", path)));
        }
        let now = now_secs();
        let updates: Vec<(String, ChangeEntry)> = match kind {
            ActionKind::New => vec![(path.to_string(), ChangeEntry::plain(now, ChangeKind::New))],
            ActionKind::Modify => vec![(path.to_string(), ChangeEntry::plain(now, ChangeKind::Modify))],
            ActionKind::Rm => vec![(path.to_string(), ChangeEntry::plain(now, ChangeKind::Rm))],
            ActionKind::Mv | ActionKind::Cp => {
                let Some(dst) = destination else {
                    return Err(AppError::missing_destination(
                        "missing_destination",
                        format!("action '{}' on '{}' requires a destination", kind.as_str(), path),
                    ));
                };
                if kind == ActionKind::Mv {
                    vec![
                        (path.to_string(), ChangeEntry::linked(now, ChangeKind::MovedTo, dst)),
                        (dst.to_string(), ChangeEntry::linked(now, ChangeKind::MovedBy, path)),
                    ]
                } else {
                    vec![(dst.to_string(), ChangeEntry::linked(now, ChangeKind::CopiedBy, path))]
                }
            }
        };

        let previous: Vec<(String, Option<ChangeEntry>)> = updates
            .iter()
            .map(|(k, _)| (k.clone(), map.get(k).cloned()))
            .collect();
        for (k, v) in updates {
            map.insert(k, v);
        }

        if let Err(e) = persist::save_json(self.docs.as_ref(), HISTORY_DOCUMENT, &*map) {
            for (k, old) in previous.into_iter().rev() {
                match old {
                    Some(v) => { map.insert(k, v); }
                    None => { map.remove(&k); }
                }
            }
            return Err(e.into());
        }
        debug!(target: "filesync::history", "recorded {} path='{}' dest={:?} ts={:.6}", kind.as_str(), path, destination, now);
        Ok(())
    }

    /// Immutable point-in-time copy of every entry.
    pub fn snapshot(&self) -> HistorySnapshot { self.entries.read().clone() }

    /// Run `f` against the whole map under the read lock.
    pub fn read_with<R>(&self, f: impl FnOnce(&HistorySnapshot) -> R) -> R { f(&self.entries.read()) }

    /// Visit every entry under one read lock; writers wait until the scan ends.
    pub fn scan<F: FnMut(&str, &ChangeEntry)>(&self, mut visit: F) {
        let map = self.entries.read();
        for (k, v) in map.iter() {
            visit(k, v);
        }
    }

    pub fn get(&self, path: &str) -> Option<ChangeEntry> { self.entries.read().get(path).cloned() }

    pub fn len(&self) -> usize { self.entries.read().len() }

    pub fn is_empty(&self) -> bool { self.entries.read().is_empty() }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod history_tests;
