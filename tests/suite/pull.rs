//! Pull diagnostics scheduling and response handling.

use std::time::Duration;

use lockstep_lsp::{RefreshOrigin, SyncConfig, SyncEvent, SyncKind, Version};
use serde_json::json;

use crate::common::{Harness, RecordingServer, error_report, eventually, uri};

/// Interactive timings with no settle pause and a debounce long enough never to fire.
fn quiet_config() -> SyncConfig {
    SyncConfig::default()
        .with_settle_delay(Duration::ZERO)
        .with_pull_debounce(Duration::from_secs(60))
}

#[tokio::test(start_paused = true)]
async fn three_quick_edits_pull_once_at_last_version() {
    let h = Harness::new(RecordingServer::new(), true);
    let doc = h.editor("a.rs", SyncKind::Incremental, &SyncConfig::default(), "");
    doc.sync.open_handshake().await.unwrap();

    for (offset, ch) in ["a", "b", "c"].into_iter().enumerate() {
        assert!(doc.insert(offset, ch).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    assert_eq!(h.server.pull_count(), 0);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(eventually(|| doc.sync.has_errors()).await);

    assert_eq!(h.server.pull_count(), 1);
    assert_eq!(h.server.pulls()[0]["textDocument"]["uri"], "file:///w/a.rs");
    assert_eq!(doc.sync.version(), Version::new(4));
    assert_eq!(doc.sync.diagnostics()[0].message(), "pull 1");
}

#[tokio::test]
async fn workspace_refresh_is_not_suppressed_by_newer_edits() {
    let server = RecordingServer::gated();
    let h = Harness::new(server.clone(), true);
    let doc = h.editor("a.rs", SyncKind::Full, &quiet_config(), "fn main() {}");
    doc.sync.open_handshake().await.unwrap();

    doc.sync
        .refresh_pull_diagnostics(RefreshOrigin::WorkspaceRefresh);
    assert!(eventually(|| server.pull_count() == 1).await);

    // The document moves on while the refresh is in flight.
    assert!(doc.insert(0, "// ").await);
    assert_eq!(doc.sync.version(), Version::new(2));

    server.release(1);
    assert!(eventually(|| doc.sync.has_errors()).await);
    assert_eq!(doc.sync.diagnostics()[0].message(), "pull 1");
}

#[tokio::test]
async fn stale_response_leaves_cache_untouched() {
    let server = RecordingServer::gated();
    let mut h = Harness::new(server.clone(), true);
    let doc = h.editor("a.rs", SyncKind::Incremental, &SyncConfig::headless(), "");
    doc.sync.open_handshake().await.unwrap();
    assert!(eventually(|| server.pull_count() == 1).await);

    assert!(doc.insert(0, "x").await);
    assert!(eventually(|| server.pull_count() == 2).await);

    // The pull issued at version 1 answers after version 2 went out.
    server.release(1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(doc.sync.diagnostics().is_empty());
    assert!(h.drain_events().is_empty());

    server.release(1);
    assert!(eventually(|| doc.sync.has_errors()).await);
    assert_eq!(doc.sync.diagnostics()[0].message(), "pull 2");
    assert_eq!(
        h.drain_events(),
        [SyncEvent::DiagnosticsChanged {
            uri: uri("a.rs"),
            last_displayed: None
        }]
    );
}

#[tokio::test]
async fn close_discards_in_flight_response() {
    let server = RecordingServer::gated();
    let h = Harness::new(server.clone(), true);
    let doc = h.editor("a.rs", SyncKind::Full, &SyncConfig::headless(), "");
    doc.sync.open_handshake().await.unwrap();
    assert!(eventually(|| server.pull_count() == 1).await);

    assert!(doc.sync.close().await);
    server.release(1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.registry.diagnostics(&uri("a.rs")).is_empty());
}

#[tokio::test]
async fn null_and_malformed_responses_are_dropped() {
    let server = RecordingServer::new();
    server.script(serde_json::Value::Null);
    server.script(json!({ "kind": "bogus" }));
    let h = Harness::new(server.clone(), true);
    let doc = h.editor("a.rs", SyncKind::Full, &SyncConfig::headless(), "");
    doc.sync.open_handshake().await.unwrap();
    assert!(eventually(|| server.pull_count() == 1).await);

    assert!(doc.insert(0, "x").await);
    assert!(eventually(|| server.pull_count() == 2).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(doc.sync.diagnostics().is_empty());

    // The scripted answers are used up; the next pull gets a real report.
    doc.sync
        .refresh_pull_diagnostics(RefreshOrigin::WorkspaceRefresh);
    assert!(eventually(|| doc.sync.has_errors()).await);
}

#[cfg(not(windows))]
#[tokio::test]
async fn related_documents_update_their_own_files() {
    use lockstep_lsp::WorkspaceResolver;
    use std::path::Path;
    use std::sync::Arc;

    let server = RecordingServer::new();
    server.script(json!({
        "kind": "full",
        "items": [],
        "relatedDocuments": {
            "file:///w/b.rs": error_report("borrowed value does not live long enough"),
            "file:///w/c.rs": { "kind": "unchanged", "resultId": "7" },
            "file:///elsewhere/d.rs": error_report("outside the workspace")
        }
    }));
    let h = Harness::new(server.clone(), true)
        .with_resolver(Arc::new(WorkspaceResolver::new(Path::new("/w"))));
    let doc = h.editor("a.rs", SyncKind::Full, &SyncConfig::headless(), "");
    doc.sync.open_handshake().await.unwrap();

    let registry = h.registry.clone();
    assert!(eventually(|| registry.has_errors(&uri("b.rs"))).await);

    // b.rs has no synchronizer of its own.
    assert_eq!(
        registry.diagnostics(&uri("b.rs"))[0].message(),
        "borrowed value does not live long enough"
    );
    assert!(registry.diagnostics(&uri("c.rs")).is_empty());
    assert!(doc.sync.diagnostics().is_empty());

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.files().len(), 1);
    assert_eq!(snapshot.files()[0].0, uri("b.rs"));
}

#[tokio::test]
async fn late_capability_registration_pulls_open_document() {
    let h = Harness::new(RecordingServer::new(), false);
    let doc = h.editor("a.rs", SyncKind::Full, &quiet_config(), "");
    doc.sync.open_handshake().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.server.pull_count(), 0);

    h.features.set_supported(true);
    doc.sync
        .refresh_pull_diagnostics(RefreshOrigin::CapabilityRegistered);
    assert!(eventually(|| doc.sync.has_errors()).await);
    assert_eq!(h.server.pull_count(), 1);
}
