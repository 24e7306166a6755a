use super::*;
use crate::persist::FsDocumentStore;
use crate::test_support::FlakyDocs;
use tempfile::tempdir;

fn new_log() -> (ChangeLog, Arc<FlakyDocs>) {
    let docs = FlakyDocs::new();
    let log = ChangeLog::load(docs.clone()).unwrap();
    (log, docs)
}

#[test]
fn new_then_modify_keeps_only_latest() {
    let (log, _docs) = new_log();
    log.record(ActionKind::New, "0/notes.txt", None).unwrap();
    let first = log.get("0/notes.txt").unwrap();
    assert_eq!(first.kind, ChangeKind::New);

    log.record(ActionKind::Modify, "0/notes.txt", None).unwrap();
    let second = log.get("0/notes.txt").unwrap();
    assert_eq!(second.kind, ChangeKind::Modify);
    assert!(second.timestamp >= first.timestamp);
    assert_eq!(log.len(), 1);
}

#[test]
fn non_new_actions_require_a_logged_path() {
    let (log, _docs) = new_log();
    for kind in [ActionKind::Modify, ActionKind::Rm] {
        let err = log.record(kind, "0/ghost.txt", None).unwrap_err();
        assert!(matches!(err, AppError::MissingFile { .. }), "{kind:?}: {err}");
    }
    let err = log.record(ActionKind::Mv, "0/ghost.txt", Some("0/b.txt")).unwrap_err();
    assert!(matches!(err, AppError::MissingFile { .. }));
    let err = log.record(ActionKind::Cp, "0/ghost.txt", Some("0/b.txt")).unwrap_err();
    assert!(matches!(err, AppError::MissingFile { .. }));
    assert!(log.is_empty());
}

#[test]
fn move_and_copy_require_destination() {
    let (log, _docs) = new_log();
    log.record(ActionKind::New, "0/a.txt", None).unwrap();
    let err = log.record(ActionKind::Mv, "0/a.txt", None).unwrap_err();
    assert!(matches!(err, AppError::MissingDestination { .. }));
    let err = log.record(ActionKind::Cp, "0/a.txt", None).unwrap_err();
    assert!(matches!(err, AppError::MissingDestination { .. }));
    assert_eq!(log.get("0/a.txt").unwrap().kind, ChangeKind::New);
}

#[test]
fn move_writes_both_sides() {
    let (log, _docs) = new_log();
    log.record(ActionKind::New, "0/a.txt", None).unwrap();
    log.record(ActionKind::Mv, "0/a.txt", Some("0/b.txt")).unwrap();

    let src = log.get("0/a.txt").unwrap();
    assert_eq!(src.kind, ChangeKind::MovedTo);
    assert_eq!(src.counterparty.as_deref(), Some("0/b.txt"));
    let dst = log.get("0/b.txt").unwrap();
    assert_eq!(dst.kind, ChangeKind::MovedBy);
    assert_eq!(dst.counterparty.as_deref(), Some("0/a.txt"));
    assert_eq!(src.timestamp, dst.timestamp);
}

#[test]
fn copy_only_touches_destination() {
    let (log, _docs) = new_log();
    log.record(ActionKind::New, "0/a.txt", None).unwrap();
    let before = log.get("0/a.txt").unwrap();
    log.record(ActionKind::Cp, "0/a.txt", Some("0/b.txt")).unwrap();

    assert_eq!(log.get("0/a.txt").unwrap(), before);
    let dst = log.get("0/b.txt").unwrap();
    assert_eq!(dst.kind, ChangeKind::CopiedBy);
    assert_eq!(dst.counterparty.as_deref(), Some("0/a.txt"));
}

#[test]
fn unknown_action_string_is_not_allowed() {
    assert_eq!("mv".parse::<ActionKind>().unwrap(), ActionKind::Mv);
    assert_eq!("cp".parse::<ActionKind>().unwrap(), ActionKind::Cp);
    let err = "chmod".parse::<ActionKind>().unwrap_err();
    assert!(matches!(err, AppError::NotAllowed { .. }));
    assert_eq!(err.http_status(), 400);
}

#[test]
fn failed_persist_rolls_back_memory() {
    let (log, docs) = new_log();
    log.record(ActionKind::New, "0/a.txt", None).unwrap();
    let before = log.snapshot();

    docs.fail_writes(true);
    let err = log.record(ActionKind::Mv, "0/a.txt", Some("0/b.txt")).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(log.snapshot(), before);
    assert!(log.get("0/b.txt").is_none());

    let err = log.record(ActionKind::New, "0/c.txt", None).unwrap_err();
    assert_eq!(err.code_str(), "persist_failed");
    assert!(log.get("0/c.txt").is_none());

    docs.fail_writes(false);
    log.record(ActionKind::Mv, "0/a.txt", Some("0/b.txt")).unwrap();
    assert_eq!(log.len(), 2);
}

#[test]
fn document_uses_array_entries() {
    let (log, docs) = new_log();
    log.record(ActionKind::New, "0/a.txt", None).unwrap();
    log.record(ActionKind::Mv, "0/a.txt", Some("0/b.txt")).unwrap();

    let raw = docs.raw(HISTORY_DOCUMENT).unwrap();
    let a = raw["0/a.txt"].as_array().unwrap();
    assert_eq!(a.len(), 3);
    assert!(a[0].is_f64());
    assert_eq!(a[1], "moved to");
    assert_eq!(a[2], "0/b.txt");
    let b = raw["0/b.txt"].as_array().unwrap();
    assert_eq!(b[1], "moved by");
    assert_eq!(b[2], "0/a.txt");
}

#[test]
fn reload_from_disk_restores_entries() {
    let tmp = tempdir().unwrap();
    let docs: Arc<dyn DocumentStore> = Arc::new(FsDocumentStore::new(tmp.path()));
    {
        let log = ChangeLog::load(docs.clone()).unwrap();
        log.record(ActionKind::New, "0", None).unwrap();
        log.record(ActionKind::New, "0/a.txt", None).unwrap();
        log.record(ActionKind::Cp, "0/a.txt", Some("0/b.txt")).unwrap();
    }
    let log = ChangeLog::load(docs).unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(log.get("0").unwrap().kind, ChangeKind::New);
    assert_eq!(log.get("0/b.txt").unwrap().counterparty.as_deref(), Some("0/a.txt"));
}

#[test]
fn rejects_document_with_unknown_kind() {
    let docs = FlakyDocs::new();
    docs.save(HISTORY_DOCUMENT, br#"{"0/a.txt": [1.5, "chmod"]}"#).unwrap();
    assert!(ChangeLog::load(docs.clone()).is_err());

    docs.save(HISTORY_DOCUMENT, br#"{"0/a.txt": [1.5, "moved to"]}"#).unwrap();
    assert!(ChangeLog::load(docs).is_err());
}

#[test]
fn reads_legacy_document_shape() {
    let docs = FlakyDocs::new();
    docs.save(
        HISTORY_DOCUMENT,
        br#"{"0": [1400000000.25, "new"], "0/x": [1400000001.5, "copied by", "0/y"]}"#,
    ).unwrap();
    let log = ChangeLog::load(docs).unwrap();
    let x = log.get("0/x").unwrap();
    assert_eq!(x.timestamp, 1400000001.5);
    assert_eq!(x.kind, ChangeKind::CopiedBy);
    assert_eq!(x.counterparty.as_deref(), Some("0/y"));
}
