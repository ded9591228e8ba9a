//! Per-server document manager.
//!
//! Owns the synchronizer of every document opened on one server, the shared
//! diagnostics registry, and the event channel the host drains.

use std::collections::HashMap;
use std::sync::Arc;

use lockstep_types::Diagnostic;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::capabilities::{ClientFeatures, SyncPolicy};
use crate::config::{ServerDefinition, SyncConfig};
use crate::diagnostics::{DiagnosticsRegistry, Stamp};
use crate::outbox::Delivery;
use crate::protocol::{LspDiagnostic, PUBLISH_IDENTIFIER, PublishDiagnosticsParams};
use crate::resolver::FileResolver;
use crate::session::{ServerSession, TextSource};
use crate::synchronizer::{Collaborators, DocumentInfo, DocumentSynchronizer, OpenHandshake};
use crate::types::{DiagnosticsSnapshot, RefreshOrigin, SyncEvent};

pub struct DocumentManager {
    name: String,
    definition: ServerDefinition,
    policy: SyncPolicy,
    config: SyncConfig,
    collaborators: Collaborators,
    documents: HashMap<Url, DocumentSynchronizer>,
    event_rx: mpsc::Receiver<SyncEvent>,
}

impl DocumentManager {
    /// Create a manager for one server with the default sync policy.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        definition: ServerDefinition,
        config: SyncConfig,
        session: Arc<dyn ServerSession>,
        features: Arc<dyn ClientFeatures>,
        resolver: Arc<dyn FileResolver>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity());
        let diagnostics = Arc::new(DiagnosticsRegistry::new(event_tx));
        Self {
            name: name.into(),
            definition,
            policy: SyncPolicy::default(),
            config,
            collaborators: Collaborators::new(session, features, resolver, diagnostics),
            documents: HashMap::new(),
            event_rx,
        }
    }

    /// Sync policy for documents opened from now on, usually read from the
    /// server's `initialize` result.
    #[must_use]
    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Start synchronizing `uri` and return its open handshake.
    ///
    /// Opening an already open document returns the existing handshake.
    pub fn open(
        &mut self,
        uri: Url,
        text: Arc<dyn TextSource>,
        language_id: Option<&str>,
    ) -> OpenHandshake {
        if let Some(document) = self.documents.get(&uri) {
            return document.open_handshake();
        }

        let language_id = language_id
            .unwrap_or_else(|| self.definition.language_id_for(&uri))
            .to_string();
        tracing::debug!(
            server = %self.name,
            uri = %uri,
            language_id = %language_id,
            sync = self.policy.kind().label(),
            "Opening document"
        );
        let document = DocumentSynchronizer::new(
            DocumentInfo {
                uri: uri.clone(),
                language_id,
                initial_text: None,
                text,
            },
            self.policy,
            &self.config,
            self.collaborators.clone(),
        );
        let handshake = document.open_handshake();
        self.documents.insert(uri, document);
        handshake
    }

    #[must_use]
    pub fn document(&self, uri: &Url) -> Option<&DocumentSynchronizer> {
        self.documents.get(uri)
    }

    #[must_use]
    pub fn is_open(&self, uri: &Url) -> bool {
        self.documents.contains_key(uri)
    }

    /// Close and forget `uri`. Closing an unknown document is a no-op.
    pub fn close(&mut self, uri: &Url) -> Delivery {
        match self.documents.remove(uri) {
            Some(document) => document.close(),
            None => Delivery::skipped(),
        }
    }

    /// Forward a refresh to every open document.
    pub fn refresh_pull_diagnostics(&self, origin: RefreshOrigin) {
        for document in self.documents.values() {
            document.refresh_pull_diagnostics(origin);
        }
    }

    /// Store diagnostics for any file, open or not.
    pub fn update_diagnostics(&self, uri: &Url, identifier: &str, items: Vec<Diagnostic>) -> bool {
        self.collaborators
            .diagnostics
            .update(uri, identifier, items)
    }

    /// Apply a `textDocument/publishDiagnostics` notification.
    ///
    /// Malformed params are logged and ignored. A versioned notification for an
    /// open document is dropped when the version is not the current one.
    pub fn apply_published_diagnostics(&self, params: Value) {
        let params: PublishDiagnosticsParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                tracing::debug!(server = %self.name, error = %e, "Failed to parse publishDiagnostics");
                return;
            }
        };
        let Some(uri) = self.collaborators.resolver.resolve(&params.uri) else {
            return;
        };
        if let (Some(version), Some(document)) = (params.version, self.documents.get(&uri)) {
            let current = document.version();
            if version != current.value() {
                tracing::debug!(uri = %uri, version, %current, "Dropping stale published diagnostics");
                return;
            }
        }
        let items = params
            .diagnostics
            .iter()
            .map(LspDiagnostic::to_diagnostic)
            .collect();
        self.update_diagnostics(&uri, PUBLISH_IDENTIFIER, items);
    }

    /// Drain pending events, up to `budget`. Never blocks.
    pub fn poll_events(&mut self, budget: usize) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while events.len() < budget {
            match self.event_rx.try_recv() {
                Ok(event) => events.push(event),
                Err(mpsc::error::TryRecvError::Empty | mpsc::error::TryRecvError::Disconnected) => {
                    break;
                }
            }
        }
        events
    }

    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        self.collaborators.diagnostics.snapshot()
    }

    /// Get only errors for specific files (for agent feedback).
    #[must_use]
    pub fn errors_for_files(&self, uris: &[Url]) -> Vec<(Url, Vec<Diagnostic>)> {
        self.collaborators.diagnostics.errors_for_files(uris)
    }

    pub fn mark_displayed(&self, uri: &Url) -> Stamp {
        self.collaborators.diagnostics.mark_displayed(uri)
    }

    #[must_use]
    pub fn must_refresh(&self, uri: &Url, snapshot: Option<Stamp>) -> bool {
        self.collaborators.diagnostics.must_refresh(uri, snapshot)
    }

    /// Close every document and wait for the notifications to be written.
    pub async fn shutdown(&mut self) {
        let documents = std::mem::take(&mut self.documents);
        tracing::info!(server = %self.name, count = documents.len(), "Closing documents");
        let deliveries: Vec<Delivery> = documents.into_values().map(|d| d.close()).collect();
        for delivery in deliveries {
            delivery.await;
        }
    }
}
