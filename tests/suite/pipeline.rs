//! Wire order and versioning of document notifications.

use lockstep_lsp::{
    ChangeEvent, DID_CHANGE, DID_CLOSE, DID_OPEN, DID_SAVE, EditEvent, Position, Range,
    SavePolicy, SyncConfig, SyncKind, SyncPolicy, Version,
};
use lockstep_types::apply_changes;
use std::sync::Arc;

use crate::common::{Harness, RecordingServer, TestSession, content_changes, version_of};

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn incremental_insert_at_start() {
    let h = Harness::new(RecordingServer::new(), false);
    let doc = h.editor("a.rs", SyncKind::Incremental, &SyncConfig::headless(), "ab");
    doc.sync.open_handshake().await.unwrap();
    assert!(doc.insert(0, "x").await);

    let opens = h.server.sent(DID_OPEN);
    assert_eq!(opens.len(), 1);
    assert_eq!(version_of(&opens[0]), 1);
    assert_eq!(opens[0]["textDocument"]["text"], "ab");

    let changes = h.server.sent(DID_CHANGE);
    assert_eq!(changes.len(), 1);
    assert_eq!(version_of(&changes[0]), 2);
    let events = content_changes(&changes[0]);
    assert_eq!(
        events,
        [ChangeEvent::incremental(
            Range::empty(Position::new(0, 0)),
            0,
            "x"
        )]
    );
    assert_eq!(apply_changes("ab", &events).unwrap(), "xab");
}

#[tokio::test]
async fn edit_spanning_open_is_resent_as_full_text() {
    let h = Harness::new(RecordingServer::new(), false);
    let doc = h.editor("a.rs", SyncKind::Incremental, &SyncConfig::headless(), "ab");

    // didOpen reads "ab" between the two halves of the edit.
    doc.sync.before_edit("ab", EditEvent::insert(0, "x"));
    let handshake = doc.sync.open_handshake();
    doc.sync.after_edit("xab");
    handshake.await.unwrap();
    assert!(doc.sync.flush().await);

    let opens = h.server.sent(DID_OPEN);
    assert_eq!(opens[0]["textDocument"]["text"], "ab");
    let changes = h.server.sent(DID_CHANGE);
    assert_eq!(changes.len(), 1);
    assert_eq!(version_of(&changes[0]), 2);
    let events = content_changes(&changes[0]);
    assert_eq!(events, [ChangeEvent::full("xab")]);
    assert_eq!(apply_changes("ab", &events).unwrap(), "xab");
}

#[tokio::test]
async fn edit_finished_before_open_is_carried_by_did_open() {
    let h = Harness::new(RecordingServer::new(), false);
    let doc = h.editor("a.rs", SyncKind::Incremental, &SyncConfig::headless(), "ab");

    doc.buffer_edit(0, 0, "x");
    doc.sync.open_handshake().await.unwrap();
    assert!(doc.sync.flush().is_skipped());

    assert_eq!(h.server.sent(DID_OPEN)[0]["textDocument"]["text"], "xab");
    assert!(h.server.sent(DID_CHANGE).is_empty());
}

#[tokio::test]
async fn close_sends_buffered_change_before_close() {
    let h = Harness::new(RecordingServer::new(), false);
    let doc = h.editor("a.rs", SyncKind::Incremental, &SyncConfig::headless(), "ab");
    doc.sync.open_handshake().await.unwrap();

    doc.buffer_edit(2, 0, "c");
    assert!(doc.sync.close().await);

    assert_eq!(h.server.methods(), [DID_OPEN, DID_CHANGE, DID_CLOSE]);
    let change = &h.server.sent(DID_CHANGE)[0];
    assert_eq!(apply_changes("ab", &content_changes(change)).unwrap(), "abc");
}

#[tokio::test]
async fn versions_strictly_increase_across_open_and_changes() {
    let h = Harness::new(RecordingServer::new(), false);
    let doc = h.editor("a.rs", SyncKind::Incremental, &SyncConfig::headless(), "");
    doc.sync.open_handshake().await.unwrap();

    assert!(doc.insert(0, "fn").await);
    doc.buffer_edit(2, 0, " main");
    doc.buffer_edit(7, 0, "()");
    assert!(doc.sync.flush().await);
    assert!(doc.insert(9, " {}").await);
    assert!(doc.sync.close().await);

    let versions: Vec<i64> = h
        .server
        .notifications()
        .iter()
        .filter(|(method, _)| *method == DID_OPEN || *method == DID_CHANGE)
        .map(|(_, params)| version_of(params))
        .collect();
    assert_eq!(versions, [1, 2, 3, 4]);
    assert_eq!(doc.sync.version(), Version::new(4));
    assert_eq!(doc.text(), "fn main() {}");
}

#[tokio::test]
async fn no_change_notification_is_ever_empty() {
    let h = Harness::new(RecordingServer::new(), false);
    let doc = h.editor("a.rs", SyncKind::Incremental, &SyncConfig::headless(), "a");
    doc.sync.open_handshake().await.unwrap();

    assert!(doc.sync.flush().is_skipped());
    assert!(doc.insert(1, "b").await);
    assert!(doc.sync.flush().is_skipped());
    assert!(doc.sync.close().await);

    let changes = h.server.sent(DID_CHANGE);
    assert_eq!(changes.len(), 1);
    assert!(changes.iter().all(|c| !content_changes(c).is_empty()));
    // Skipped flushes consume no version.
    assert_eq!(doc.sync.version(), Version::new(2));
}

#[tokio::test]
async fn full_sync_sends_whole_text_once_per_flush() {
    let h = Harness::new(RecordingServer::new(), false);
    let doc = h.editor("a.rs", SyncKind::Full, &SyncConfig::headless(), "one");
    doc.sync.open_handshake().await.unwrap();

    doc.buffer_edit(3, 0, "\ntwo");
    doc.buffer_edit(0, 3, "ONE");
    assert!(doc.sync.flush().await);

    let changes = h.server.sent(DID_CHANGE);
    assert_eq!(content_changes(&changes[0]), [ChangeEvent::full("ONE\ntwo")]);
}

#[tokio::test]
async fn sync_none_sends_no_content() {
    let h = Harness::new(RecordingServer::new(), false);
    let doc = h.editor("a.rs", SyncKind::None, &SyncConfig::headless(), "a");
    doc.sync.open_handshake().await.unwrap();

    assert!(doc.insert(0, "b").is_skipped());
    assert!(doc.sync.close().await);
    assert_eq!(h.server.methods(), [DID_OPEN, DID_CLOSE]);
}

#[tokio::test]
async fn save_follows_pending_change_and_carries_text() {
    let h = Harness::new(RecordingServer::new(), false);
    let policy = SyncPolicy::new(SyncKind::Incremental, true, SavePolicy::NotifyWithText);
    let doc = h.editor_with_policy("a.rs", policy, &SyncConfig::headless(), "let");
    doc.sync.open_handshake().await.unwrap();

    doc.buffer_edit(3, 0, " x;");
    assert!(doc.sync.save().await);

    assert_eq!(h.server.methods(), [DID_OPEN, DID_CHANGE, DID_SAVE]);
    assert_eq!(h.server.sent(DID_SAVE)[0]["text"], "let x;");
}

#[tokio::test]
async fn save_without_text_when_not_requested() {
    let h = Harness::new(RecordingServer::new(), false);
    let policy = SyncPolicy::new(SyncKind::Full, true, SavePolicy::Notify);
    let doc = h.editor_with_policy("a.rs", policy, &SyncConfig::headless(), "x");
    doc.sync.open_handshake().await.unwrap();

    assert!(doc.sync.save().await);
    let save = &h.server.sent(DID_SAVE)[0];
    assert!(save.get("text").is_none());
    assert_eq!(save["textDocument"]["uri"], "file:///w/a.rs");
}

#[tokio::test]
async fn inactive_session_gets_no_close() {
    let h = Harness::new(RecordingServer::new(), false);
    let doc = h.editor("a.rs", SyncKind::Full, &SyncConfig::headless(), "");
    doc.sync.open_handshake().await.unwrap();

    h.session.set_active(false);
    assert!(doc.sync.close().is_skipped());
    settle().await;
    assert_eq!(h.server.methods(), [DID_OPEN]);
}

#[tokio::test]
async fn server_start_failure_leaves_version_alone() {
    let server = RecordingServer::new();
    let session = Arc::new(TestSession::failing(server.clone()));
    let h = Harness::with_session(session, server, false);
    let doc = h.editor("a.rs", SyncKind::Incremental, &SyncConfig::headless(), "");

    assert!(doc.sync.open_handshake().await.is_err());
    settle().await;

    assert!(!doc.insert(0, "x").await);
    assert_eq!(doc.sync.version(), Version::new(1));
    assert!(!doc.sync.close().await);
    assert!(h.server.notifications().is_empty());
}

#[tokio::test]
async fn dropping_the_synchronizer_closes_the_document() {
    let h = Harness::new(RecordingServer::new(), false);
    let doc = h.editor("a.rs", SyncKind::Full, &SyncConfig::headless(), "");
    doc.sync.open_handshake().await.unwrap();

    drop(doc);
    let server = h.server.clone();
    assert!(crate::common::eventually(|| server.methods().len() == 2).await);
    assert_eq!(server.methods(), [DID_OPEN, DID_CLOSE]);
}
