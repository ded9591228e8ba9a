//! Per-document synchronizer: keeps one editor buffer and one server's view
//! of it in step.
//!
//! Every notification for a document goes through a single writer task that
//! first awaits the open handshake, so the wire order is always
//! `didOpen → didChange* → didSave/didClose`. Version stamping and enqueueing
//! happen under the document's state lock; nothing holds that lock across an
//! `.await`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture, Shared};
use lockstep_types::{Diagnostic, Version};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use url::Url;

use crate::capabilities::{ClientFeatures, SavePolicy, SyncPolicy};
use crate::changes::{ChangeAccumulator, EditEvent};
use crate::clock::VersionClock;
use crate::config::SyncConfig;
use crate::diagnostics::DiagnosticsRegistry;
use crate::error::{SessionError, SyncError};
use crate::outbox::{Delivery, Outbox, Outgoing, OutgoingKind};
use crate::protocol::{self, DID_OPEN};
use crate::pull::{PullState, PullTrigger};
use crate::resolver::FileResolver;
use crate::session::{ServerHandle, ServerSession, TextSource};
use crate::types::{DocumentPhase, RefreshOrigin};

/// Resolves with the live server once the document is open on it.
///
/// Cloning is cheap; every clone observes the same outcome.
pub type OpenHandshake = Shared<BoxFuture<'static, Result<ServerHandle, SyncError>>>;

/// Everything a synchronizer borrows from the rest of the client.
#[derive(Clone)]
pub struct Collaborators {
    pub session: Arc<dyn ServerSession>,
    pub features: Arc<dyn ClientFeatures>,
    pub resolver: Arc<dyn FileResolver>,
    pub diagnostics: Arc<DiagnosticsRegistry>,
    pub runtime: Handle,
}

impl Collaborators {
    /// Bundle collaborators, spawning background work on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn new(
        session: Arc<dyn ServerSession>,
        features: Arc<dyn ClientFeatures>,
        resolver: Arc<dyn FileResolver>,
        diagnostics: Arc<DiagnosticsRegistry>,
    ) -> Self {
        Self {
            session,
            features,
            resolver,
            diagnostics,
            runtime: Handle::current(),
        }
    }
}

/// The document being synchronized.
pub struct DocumentInfo {
    pub uri: Url,
    pub language_id: String,
    /// Text to send with `didOpen`; when absent the text source is read at open time.
    pub initial_text: Option<String>,
    pub text: Arc<dyn TextSource>,
}

pub(crate) enum Lifecycle {
    Unopened,
    Opening(OpenHandshake),
    Opened {
        server: ServerHandle,
        handshake: OpenHandshake,
    },
    Closed,
}

impl Lifecycle {
    fn phase(&self) -> DocumentPhase {
        match self {
            Self::Unopened => DocumentPhase::Unopened,
            Self::Opening(_) => DocumentPhase::Opening,
            Self::Opened { .. } => DocumentPhase::Opened,
            Self::Closed => DocumentPhase::Closed,
        }
    }

    fn accepts_edits(&self) -> bool {
        matches!(self, Self::Opening(_) | Self::Opened { .. })
    }

    /// The handshake has resolved with an error. The writer may not have seen it yet.
    fn open_failed(&self) -> bool {
        match self {
            Self::Opening(handshake) | Self::Opened { handshake, .. } => {
                matches!(handshake.peek(), Some(Err(_)))
            }
            Self::Unopened | Self::Closed => false,
        }
    }
}

pub(crate) struct DocumentState {
    pub lifecycle: Lifecycle,
    pub changes: ChangeAccumulator,
    pub clock: VersionClock,
    outbox: Option<Outbox>,
    initial_text: Option<String>,
}

pub(crate) struct SyncInner {
    pub uri: Url,
    language_id: String,
    policy: SyncPolicy,
    settle_delay: Duration,
    pub pull_debounce: Duration,
    pub headless: bool,
    pub collab: Collaborators,
    text: Arc<dyn TextSource>,
    pub state: Mutex<DocumentState>,
    pub pull: PullState,
}

/// Synchronizes one document with one server.
///
/// Dropping the synchronizer closes the document.
pub struct DocumentSynchronizer {
    inner: Arc<SyncInner>,
}

impl DocumentSynchronizer {
    #[must_use]
    pub fn new(
        info: DocumentInfo,
        policy: SyncPolicy,
        config: &SyncConfig,
        collab: Collaborators,
    ) -> Self {
        let state = DocumentState {
            lifecycle: Lifecycle::Unopened,
            changes: ChangeAccumulator::new(policy.kind()),
            clock: VersionClock::default(),
            outbox: None,
            initial_text: info.initial_text,
        };
        Self {
            inner: Arc::new(SyncInner {
                uri: info.uri,
                language_id: info.language_id,
                policy,
                settle_delay: config.settle_delay(),
                pull_debounce: config.pull_debounce(),
                headless: config.is_headless(),
                collab,
                text: info.text,
                state: Mutex::new(state),
                pull: PullState::default(),
            }),
        }
    }

    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.inner.uri
    }

    #[must_use]
    pub fn policy(&self) -> SyncPolicy {
        self.inner.policy
    }

    /// The open handshake, started on first call and memoized afterwards.
    ///
    /// A failed handshake stays failed; the document must be reopened through
    /// a new synchronizer.
    pub fn open_handshake(&self) -> OpenHandshake {
        SyncInner::open_handshake(&self.inner)
    }

    /// Record an edit against the buffer it is about to change.
    pub fn before_edit(&self, pre_edit: &str, edit: EditEvent<'_>) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        match state.lifecycle {
            // The open may start before the matching `after_edit`.
            Lifecycle::Unopened => state.changes.record_unseen_before(),
            Lifecycle::Opening(_) | Lifecycle::Opened { .. } => {
                state.changes.record_before(pre_edit, edit);
            }
            Lifecycle::Closed => {}
        }
    }

    /// Record the buffer after an edit. The change stays buffered until [`flush`](Self::flush).
    pub fn after_edit(&self, post_edit: &str) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        match state.lifecycle {
            Lifecycle::Unopened => {
                // didOpen will carry the edited text.
                state.initial_text = None;
                state.changes.clear();
            }
            Lifecycle::Opening(_) | Lifecycle::Opened { .. } => {
                state.changes.record_after(post_edit);
            }
            Lifecycle::Closed => {}
        }
    }

    /// Send everything buffered as one `didChange`.
    pub fn flush(&self) -> Delivery {
        let mut state = self.inner.state.lock();
        self.inner.flush_locked(&mut state)
    }

    /// `before_edit`, `after_edit` and `flush` in one call.
    pub fn on_edit(&self, pre_edit: &str, edit: EditEvent<'_>, post_edit: &str) -> Delivery {
        self.before_edit(pre_edit, edit);
        self.after_edit(post_edit);
        self.flush()
    }

    /// Send `didSave` if the server observes saves.
    pub fn save(&self) -> Delivery {
        let save = self.inner.policy.save();
        if save == SavePolicy::Disabled || !self.inner.collab.session.is_active() {
            return Delivery::skipped();
        }

        let mut state = self.inner.state.lock();
        if !state.lifecycle.accepts_edits() {
            return Delivery::skipped();
        }
        let _ = self.inner.flush_locked(&mut state);
        let text = save.includes_text().then(|| self.inner.text.text());
        let params = protocol::did_save_params(&self.inner.uri, text.as_deref());
        match &state.outbox {
            Some(outbox) => outbox.push(OutgoingKind::Save, params),
            None => Delivery::skipped(),
        }
    }

    /// Close the document. Buffered changes are sent before `didClose`.
    ///
    /// Idempotent; every call after the first returns a skipped delivery.
    pub fn close(&self) -> Delivery {
        self.inner.close()
    }

    /// Pull diagnostics outside the edit path.
    pub fn refresh_pull_diagnostics(&self, origin: RefreshOrigin) {
        self.inner.refresh(origin);
    }

    /// Last version sent (or about to be sent) to the server.
    #[must_use]
    pub fn version(&self) -> Version {
        self.inner.state.lock().clock.current()
    }

    #[must_use]
    pub fn phase(&self) -> DocumentPhase {
        self.inner.state.lock().lifecycle.phase()
    }

    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.collab.diagnostics.diagnostics(&self.inner.uri)
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.inner.collab.diagnostics.has_errors(&self.inner.uri)
    }
}

impl Drop for DocumentSynchronizer {
    fn drop(&mut self) {
        let _ = self.inner.close();
    }
}

impl SyncInner {
    fn open_handshake(this: &Arc<Self>) -> OpenHandshake {
        let mut state = this.state.lock();
        match &state.lifecycle {
            Lifecycle::Opening(handshake) | Lifecycle::Opened { handshake, .. } => {
                return handshake.clone();
            }
            Lifecycle::Closed => {
                let closed: BoxFuture<'static, _> =
                    future::ready(Err(SyncError::Closed(this.uri.clone()))).boxed();
                return closed.shared();
            }
            Lifecycle::Unopened => {}
        }

        let did_open = if this.policy.open_close() {
            let version = state.clock.next();
            let text = state
                .initial_text
                .take()
                .unwrap_or_else(|| this.text.text());
            Some((
                version,
                protocol::did_open_params(&this.uri, &this.language_id, version, &text),
            ))
        } else {
            None
        };
        let open_version = did_open.as_ref().map(|(version, _)| *version);

        let session = Arc::clone(&this.collab.session);
        let settle_delay = this.settle_delay;
        let uri = this.uri.clone();
        let handshake: OpenHandshake = async move {
            let server = session.initialized_server().await?;
            if let Some((version, params)) = did_open {
                server.notify(DID_OPEN, params).await?;
                tracing::debug!(uri = %uri, %version, "Document opened");
                if !settle_delay.is_zero() {
                    tokio::time::sleep(settle_delay).await;
                }
            }
            Ok::<_, SyncError>(server)
        }
        .boxed()
        .shared();

        let (outbox, inbox) = Outbox::channel();
        state.outbox = Some(outbox);
        state.lifecycle = Lifecycle::Opening(handshake.clone());
        drop(state);

        this.collab.runtime.spawn(Self::run_writer(
            Arc::clone(this),
            handshake.clone(),
            inbox,
            open_version,
        ));
        handshake
    }

    /// Drain the document's outbox in order once the handshake resolves.
    async fn run_writer(
        self: Arc<Self>,
        handshake: OpenHandshake,
        mut inbox: mpsc::UnboundedReceiver<Outgoing>,
        open_version: Option<Version>,
    ) {
        let server = match handshake.await {
            Ok(server) => server,
            Err(e) => {
                tracing::warn!(uri = %self.uri, error = %e, "Failed to open document");
                inbox.close();
                while let Some(outgoing) = inbox.recv().await {
                    outgoing.acknowledge(false);
                }
                return;
            }
        };

        self.mark_opened(&server);
        if let Some(version) = open_version {
            self.after_send(PullTrigger::Open, version, &server);
        }

        while let Some(outgoing) = inbox.recv().await {
            let (kind, params, ack) = outgoing.into_parts();
            let sent = match server.notify(kind.method(), params).await {
                Ok(()) => true,
                Err(SessionError::NotRunning) => {
                    tracing::debug!(uri = %self.uri, method = kind.method(), "Server not running, notification dropped");
                    false
                }
                Err(e) => {
                    tracing::warn!(uri = %self.uri, method = kind.method(), error = %e, "Failed to send notification");
                    false
                }
            };
            if sent && let OutgoingKind::Change(version) = kind {
                self.after_send(PullTrigger::Change, version, &server);
            }
            ack.send(sent);
        }
        tracing::trace!(uri = %self.uri, "Writer finished");
    }

    fn mark_opened(&self, server: &ServerHandle) {
        let mut state = self.state.lock();
        if let Lifecycle::Opening(handshake) = &state.lifecycle {
            state.lifecycle = Lifecycle::Opened {
                server: Arc::clone(server),
                handshake: handshake.clone(),
            };
        }
    }

    /// Drain buffered changes into one `didChange` stamped with the next version.
    fn flush_locked(&self, state: &mut DocumentState) -> Delivery {
        if state.changes.is_empty() {
            return Delivery::skipped();
        }
        let open_failed = state.lifecycle.open_failed();
        let Some(outbox) = state
            .outbox
            .as_ref()
            .filter(|outbox| outbox.is_open() && !open_failed)
        else {
            let dropped = state.changes.drain().len();
            tracing::debug!(uri = %self.uri, dropped, "No writer for document, changes discarded");
            return Delivery::skipped();
        };

        let changes = state.changes.drain();
        let version = state.clock.next();
        tracing::trace!(
            uri = %self.uri,
            %version,
            count = changes.len(),
            kind = state.changes.kind().label(),
            "Queueing didChange"
        );
        let params = protocol::did_change_params(&self.uri, version, &changes);
        outbox.push(OutgoingKind::Change(version), params)
    }

    fn close(&self) -> Delivery {
        let delivery = {
            let mut state = self.state.lock();
            let open_failed = state.lifecycle.open_failed();
            let previous = std::mem::replace(&mut state.lifecycle, Lifecycle::Closed);
            let delivery = match previous {
                Lifecycle::Closed => return Delivery::skipped(),
                Lifecycle::Unopened => Delivery::skipped(),
                Lifecycle::Opening(_) | Lifecycle::Opened { .. } => {
                    if !open_failed
                        && self.policy.open_close()
                        && self.collab.session.is_active()
                    {
                        let _ = self.flush_locked(&mut state);
                        match &state.outbox {
                            Some(outbox) => outbox.push(
                                OutgoingKind::Close,
                                protocol::did_close_params(&self.uri),
                            ),
                            None => Delivery::skipped(),
                        }
                    } else {
                        Delivery::skipped()
                    }
                }
            };
            state.outbox = None;
            state.changes.clear();
            delivery
        };

        self.pull.cancel();
        self.collab.diagnostics.clear(&self.uri);
        tracing::debug!(uri = %self.uri, "Document closed");
        delivery
    }

    pub(crate) fn is_closed(&self) -> bool {
        matches!(self.state.lock().lifecycle, Lifecycle::Closed)
    }
}
