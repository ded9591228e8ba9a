//! Pull diagnostics (`textDocument/diagnostic`) for one document.
//!
//! After a `didOpen`/`didChange` reaches the server a pull is scheduled on a
//! single-slot debounce timer; rescheduling aborts the previous timer. A pull
//! that already went out is never aborted. Its response is checked against
//! the document's current version when it arrives.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lockstep_types::{PullVersion, Version};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::protocol::{self, DEFAULT_PULL_IDENTIFIER, DOCUMENT_DIAGNOSTIC, PullReport};
use crate::session::ServerHandle;
use crate::synchronizer::{Lifecycle, OpenHandshake, SyncInner};
use crate::types::RefreshOrigin;

/// Which notification a pull follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PullTrigger {
    Open,
    Change,
}

#[derive(Default)]
pub(crate) struct PullState {
    /// Pending debounce timer, if any.
    debounce: Mutex<Option<JoinHandle<()>>>,
    /// Set by the open path when pull diagnostics were unsupported at the time.
    not_pulled_on_open: AtomicBool,
}

impl PullState {
    fn reschedule(&self, timer: JoinHandle<()>) {
        if let Some(previous) = self.debounce.lock().replace(timer) {
            previous.abort();
        }
    }

    /// Abort the pending timer. In-flight requests are unaffected.
    pub fn cancel(&self) {
        if let Some(timer) = self.debounce.lock().take() {
            timer.abort();
        }
    }
}

enum Readiness {
    Ready(ServerHandle),
    Pending(OpenHandshake),
}

impl SyncInner {
    /// Called by the writer once a `didOpen`/`didChange` at `version` was sent.
    pub(crate) fn after_send(
        self: &Arc<Self>,
        trigger: PullTrigger,
        version: Version,
        server: &ServerHandle,
    ) {
        let supported = self.collab.features.pull_diagnostics_supported(&self.uri);
        if trigger == PullTrigger::Open {
            self.pull.not_pulled_on_open.store(!supported, Ordering::Release);
        }
        if !supported || self.is_closed() {
            return;
        }

        if self.headless {
            self.pull_now(PullVersion::Exact(version), Arc::clone(server));
            return;
        }

        let doc = Arc::clone(self);
        let server = Arc::clone(server);
        let delay = self.pull_debounce;
        let timer = self.collab.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            doc.pull_now(PullVersion::Exact(version), server);
        });
        self.pull.reschedule(timer);
        tracing::trace!(uri = %self.uri, %version, "Pull diagnostics scheduled");
    }

    pub(crate) fn refresh(self: &Arc<Self>, origin: RefreshOrigin) {
        let version = match origin {
            RefreshOrigin::CapabilityRegistered => {
                if !self.pull.not_pulled_on_open.load(Ordering::Acquire) {
                    tracing::trace!(uri = %self.uri, "Diagnostics already pulled on open");
                    return;
                }
                PullVersion::Exact(self.state.lock().clock.current())
            }
            RefreshOrigin::WorkspaceRefresh => PullVersion::Any,
        };
        if !self.collab.features.pull_diagnostics_supported(&self.uri) {
            return;
        }
        self.pull_when_open(version);
    }

    /// Pull now if the server is ready, else as soon as the open handshake resolves.
    fn pull_when_open(self: &Arc<Self>, version: PullVersion) {
        let readiness = match &self.state.lock().lifecycle {
            Lifecycle::Opened { server, .. } => Readiness::Ready(Arc::clone(server)),
            Lifecycle::Opening(handshake) => Readiness::Pending(handshake.clone()),
            Lifecycle::Unopened | Lifecycle::Closed => return,
        };
        match readiness {
            Readiness::Ready(server) => self.pull_now(version, server),
            Readiness::Pending(handshake) => {
                let doc = Arc::clone(self);
                self.collab.runtime.spawn(async move {
                    if let Ok(server) = handshake.await {
                        doc.pull_now(version, server);
                    }
                });
            }
        }
    }

    /// Dispatch the request if `version` is still current. The request runs in its own task.
    fn pull_now(self: &Arc<Self>, version: PullVersion, server: ServerHandle) {
        {
            let state = self.state.lock();
            if matches!(state.lifecycle, Lifecycle::Closed) {
                return;
            }
            let current = state.clock.current();
            if !version.accepts(current) {
                tracing::debug!(uri = %self.uri, issued = %version, %current, "Pull superseded by a newer edit");
                return;
            }
        }

        let doc = Arc::clone(self);
        self.collab.runtime.spawn(async move {
            let identifier = doc.collab.features.diagnostic_identifier();
            let params = protocol::document_diagnostic_params(&doc.uri, identifier.as_deref());
            tracing::debug!(uri = %doc.uri, %version, "Pulling diagnostics");
            match server.request(DOCUMENT_DIAGNOSTIC, params).await {
                Ok(result) => doc.accept_report(version, identifier.as_deref(), result),
                Err(e) => {
                    tracing::warn!(uri = %doc.uri, error = %e, "Diagnostic pull failed");
                }
            }
        });
    }

    fn accept_report(&self, version: PullVersion, identifier: Option<&str>, result: Value) {
        let report = match protocol::parse_diagnostic_report(result) {
            Ok(Some(report)) => report,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(uri = %self.uri, error = %e, "Ignoring diagnostic report");
                return;
            }
        };

        // Held while the cache is updated so the version cannot move underneath.
        let state = self.state.lock();
        if matches!(state.lifecycle, Lifecycle::Closed) {
            return;
        }
        let current = state.clock.current();
        if !version.accepts(current) {
            tracing::debug!(uri = %self.uri, issued = %version, %current, "Dropping stale diagnostic report");
            return;
        }

        let registry = &self.collab.diagnostics;
        let identifier = identifier.unwrap_or(DEFAULT_PULL_IDENTIFIER);
        match report {
            PullReport::Direct(items) => {
                registry.update(&self.uri, identifier, items);
            }
            PullReport::Related { own, documents } => {
                if let Some(items) = own {
                    registry.update(&self.uri, identifier, items);
                }
                for (uri, items) in documents {
                    // Unchanged reports leave the cache as it is.
                    let Some(items) = items else { continue };
                    match self.collab.resolver.resolve(&uri) {
                        Some(target) => {
                            registry.update(&target, identifier, items);
                        }
                        None => {
                            tracing::debug!(uri = %uri, "Skipping related document that cannot be resolved");
                        }
                    }
                }
            }
        }
    }
}
