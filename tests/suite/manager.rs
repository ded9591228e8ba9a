//! A per-server document manager driven from a TOML configuration.

use std::sync::Arc;

use lockstep_lsp::{
    AnyUri, DID_CHANGE, DID_CLOSE, DID_OPEN, DID_SAVE, DiagnosticFeature, DocumentManager,
    EditEvent, LockstepConfig, RefreshOrigin, SavePolicy, SyncEvent, SyncKind, SyncPolicy,
};
use serde_json::{Value, json};

use crate::common::{RecordingServer, TestSession, eventually, init_tracing, uri};

const CONFIG: &str = r#"
[sync]
headless = true

[servers.rust]
language_id = "rust"
file_extensions = ["rs"]

[servers.web]
language_id = "javascript"
file_extensions = ["js", "ts"]
languages = { ts = "typescript" }
"#;

fn initialize_result() -> Value {
    json!({
        "textDocumentSync": {
            "openClose": true,
            "change": 2,
            "save": { "includeText": true }
        },
        "diagnosticProvider": {
            "identifier": "rustc",
            "interFileDependencies": true,
            "workspaceDiagnostics": false
        }
    })
}

fn rust_manager(server: &Arc<RecordingServer>) -> DocumentManager {
    init_tracing();
    let config = LockstepConfig::from_toml_str(CONFIG).unwrap();
    let (name, definition) = config.server_for(&uri("main.rs")).unwrap();
    let capabilities = initialize_result();
    DocumentManager::new(
        name,
        definition.clone(),
        config.sync().clone(),
        Arc::new(TestSession::new(server.clone())),
        Arc::new(DiagnosticFeature::from_server_capabilities(&capabilities)),
        Arc::new(AnyUri),
    )
    .with_policy(SyncPolicy::from_server_capabilities(&capabilities))
}

#[tokio::test]
async fn capabilities_shape_the_policy() {
    let server = RecordingServer::new();
    let manager = rust_manager(&server);
    assert_eq!(manager.name(), "rust");
    assert_eq!(
        manager.policy(),
        SyncPolicy::new(SyncKind::Incremental, true, SavePolicy::NotifyWithText)
    );
}

#[tokio::test]
async fn documents_share_one_server() {
    let server = RecordingServer::new();
    let mut manager = rust_manager(&server);

    let main = uri("main.rs");
    let lib = uri("lib.rs");
    manager
        .open(main.clone(), Arc::new(|| "fn main() {}".to_string()), None)
        .await
        .unwrap();
    manager
        .open(lib.clone(), Arc::new(|| String::new()), None)
        .await
        .unwrap();
    assert!(eventually(|| server.pull_count() == 2).await);
    assert!(
        server
            .pulls()
            .iter()
            .all(|pull| pull["identifier"] == "rustc")
    );

    let doc = manager.document(&main).unwrap();
    let pre = "fn main() {}";
    let post = "fn main() { }";
    assert!(doc.on_edit(pre, EditEvent::insert(11, " "), post).await);
    assert!(doc.save().await);
    assert!(eventually(|| server.pull_count() == 3).await);

    let opens = server.sent(DID_OPEN);
    assert_eq!(opens.len(), 2);
    assert!(opens.iter().all(|o| o["textDocument"]["languageId"] == "rust"));
    assert_eq!(server.sent(DID_CHANGE).len(), 1);
    assert_eq!(server.sent(DID_SAVE)[0]["text"], "fn main() {}");

    manager.refresh_pull_diagnostics(RefreshOrigin::WorkspaceRefresh);
    assert!(eventually(|| server.pull_count() == 5).await);

    manager.shutdown().await;
    assert_eq!(server.sent(DID_CLOSE).len(), 2);
    assert!(!manager.is_open(&main));
}

#[tokio::test]
async fn events_track_pulled_diagnostics() {
    let server = RecordingServer::new();
    let mut manager = rust_manager(&server);
    let main = uri("main.rs");
    manager
        .open(main.clone(), Arc::new(String::new), None)
        .await
        .unwrap();

    assert!(eventually(|| manager.snapshot().error_count() == 1).await);
    let events = manager.poll_events(16);
    assert_eq!(
        events,
        [SyncEvent::DiagnosticsChanged {
            uri: main.clone(),
            last_displayed: None
        }]
    );
    assert_eq!(manager.errors_for_files(&[main.clone()]).len(), 1);
    assert_eq!(manager.snapshot().status_string(), "E:1 W:0");

    let shown = manager.mark_displayed(&main);
    assert!(!manager.must_refresh(&main, Some(shown)));

    let _ = manager.close(&main).await;
    assert_eq!(
        manager.poll_events(16),
        [SyncEvent::DiagnosticsCleared { uri: main }]
    );
    assert!(manager.snapshot().is_empty());
}
