//! "What changed since T" for one identity.
//!
//! A single pass over the change log under its read lock keeps entries that
//! live inside one of the caller's storage roots and are strictly newer than
//! the threshold.

use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::history::{ChangeEntry, ChangeLog};
use crate::paths::is_within_root;
use crate::users::UserStore;

/// One changed path; `action` serializes in the history-document array form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub path: String,
    pub action: ChangeEntry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiffOutcome {
    UpToDate,
    Changes(Vec<Change>),
}

impl DiffOutcome {
    pub fn changes(&self) -> &[Change] {
        match self {
            DiffOutcome::UpToDate => &[],
            DiffOutcome::Changes(v) => v,
        }
    }

    pub fn iter_paths(&self) -> impl Iterator<Item = &str> { self.changes().iter().map(|c| c.path.as_str()) }

    pub fn len(&self) -> usize { self.changes().len() }

    pub fn is_empty(&self) -> bool { self.changes().is_empty() }
}

fn bad_threshold(detail: impl std::fmt::Display) -> AppError {
    AppError::malformed("invalid_timestamp", format!("timestamp must be numeric seconds: {}", detail))
}

/// Parse a threshold given as text.
pub fn parse_since_str(raw: &str) -> AppResult<f64> {
    let ts: f64 = raw.trim().parse().map_err(|_| bad_threshold(format!("'{}'", raw)))?;
    if !ts.is_finite() {
        return Err(bad_threshold(format!("'{}'", raw)));
    }
    Ok(ts)
}

/// Parse a threshold from a JSON value: a number or a numeric string.
pub fn parse_since(value: &Value) -> AppResult<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).ok_or_else(|| bad_threshold(n)),
        Value::String(s) => parse_since_str(s),
        Value::Null => Err(AppError::malformed("missing_timestamp", "timestamp is required")),
        other => Err(bad_threshold(other)),
    }
}

/// Entries owned by `identity` with a timestamp strictly greater than `since`,
/// ordered by path.
pub fn since(users: &UserStore, history: &ChangeLog, identity: &str, since: f64) -> AppResult<DiffOutcome> {
    let roots = users.owned_paths(identity)?;
    let mut changes = Vec::new();
    history.scan(|path, entry| {
        if entry.timestamp > since && roots.iter().any(|r| is_within_root(path, r)) {
            changes.push(Change { path: path.to_string(), action: entry.clone() });
        }
    });
    if changes.is_empty() {
        Ok(DiffOutcome::UpToDate)
    } else {
        Ok(DiffOutcome::Changes(changes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FileActionEngine;
    use crate::history::{now_secs, ChangeKind};
    use crate::test_support::FlakyDocs;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (Arc<UserStore>, Arc<ChangeLog>, FileActionEngine, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = tmp.path().join("user_dirs");
        std::fs::create_dir_all(&dirs).unwrap();
        let docs = FlakyDocs::new();
        let users = Arc::new(UserStore::load(docs.clone(), &dirs).unwrap());
        let history = Arc::new(ChangeLog::load(docs).unwrap());
        let engine = FileActionEngine::new(users.clone(), history.clone());
        (users, history, engine, tmp)
    }

    #[test]
    fn test_parse_since() {
        assert_eq!(parse_since(&json!(12.5)).unwrap(), 12.5);
        assert_eq!(parse_since(&json!(3)).unwrap(), 3.0);
        assert_eq!(parse_since(&json!("1400000000.25")).unwrap(), 1400000000.25);
        for bad in [json!("yesterday"), json!("NaN"), json!("inf"), json!(true), json!([1]), json!(null)] {
            let err = parse_since(&bad).unwrap_err();
            assert!(matches!(err, AppError::MalformedRequest { .. }), "{bad}");
        }
    }

    #[test]
    fn test_latest_action_only() {
        let (users, history, engine, _tmp) = setup();
        let root = users.register("alice", "pw", &history).unwrap();
        let t0 = now_secs() - 1.0;
        engine.upload("alice", "notes.txt", b"hi").unwrap();
        engine.update("alice", "notes.txt", b"hi2").unwrap();

        let DiffOutcome::Changes(changes) = since(&users, &history, "alice", t0).unwrap() else {
            panic!("expected changes");
        };
        let notes: Vec<_> = changes.iter().filter(|c| c.path == format!("{root}/notes.txt")).collect();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].action.kind, ChangeKind::Modify);
    }

    #[test]
    fn test_threshold_is_strict() {
        let (users, history, engine, _tmp) = setup();
        users.register("alice", "pw", &history).unwrap();
        engine.upload("alice", "a.txt", b"x").unwrap();
        let ts = history.get("0/a.txt").unwrap().timestamp;
        let out = since(&users, &history, "alice", ts).unwrap();
        assert!(out.iter_paths().all(|p| p != "0/a.txt"));
        let out = since(&users, &history, "alice", ts - 0.5).unwrap();
        assert!(out.iter_paths().any(|p| p == "0/a.txt"));
    }

    #[test]
    fn test_up_to_date_and_unknown_user() {
        let (users, history, _engine, _tmp) = setup();
        users.register("alice", "pw", &history).unwrap();
        assert_eq!(since(&users, &history, "alice", now_secs() + 60.0).unwrap(), DiffOutcome::UpToDate);
        assert!(matches!(since(&users, &history, "bob", 0.0), Err(AppError::NotFound { .. })));
    }

    #[test]
    fn test_roots_do_not_leak_by_prefix() {
        let (users, history, engine, _tmp) = setup();
        for i in 0..17 {
            users.register(&format!("u{i}"), "pw", &history).unwrap();
        }
        // u1 owns root "1", u16 owns root "10"
        engine.upload("u16", "secret.txt", b"s").unwrap();
        let out = since(&users, &history, "u1", 0.0).unwrap();
        assert!(out.iter_paths().all(|p| p == "1" || p.starts_with("1/")));
        assert!(out.iter_paths().all(|p| p != "10/secret.txt"));
    }

    #[test]
    fn test_change_serializes_as_array() {
        let c = Change {
            path: "0/b.txt".into(),
            action: ChangeEntry { timestamp: 2.5, kind: ChangeKind::CopiedBy, counterparty: Some("0/a.txt".into()) },
        };
        assert_eq!(serde_json::to_value(&c).unwrap(), json!({"path": "0/b.txt", "action": [2.5, "copied by", "0/a.txt"]}));
    }
}
