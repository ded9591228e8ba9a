//! Diagnostics cache: per-document, per-identifier diagnostics plus the
//! bookkeeping that tells a consumer when a re-render is due.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use lockstep_types::Diagnostic;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use crate::types::{DiagnosticsSnapshot, SyncEvent};

/// A point on the registry's logical clock.
///
/// Stamps only compare against stamps from the same registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp(u64);

/// Cached diagnostics of one document.
#[derive(Debug, Default)]
pub(crate) struct DocumentDiagnostics {
    by_identifier: BTreeMap<String, Vec<Diagnostic>>,
    updated_at: Option<Stamp>,
    displayed_at: Option<Stamp>,
}

impl DocumentDiagnostics {
    /// Replace the diagnostics stored under `identifier`. Returns whether anything changed.
    pub fn update(&mut self, identifier: &str, items: Vec<Diagnostic>, now: Stamp) -> bool {
        let previous = self.by_identifier.get(identifier).map_or(&[][..], Vec::as_slice);
        if previous == items.as_slice() {
            return false;
        }
        if items.is_empty() {
            self.by_identifier.remove(identifier);
        } else {
            self.by_identifier.insert(identifier.to_string(), items);
        }
        self.updated_at = Some(now);
        true
    }

    /// All diagnostics, grouped by identifier in identifier order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.by_identifier.values().flatten().cloned().collect()
    }

    pub fn has_errors(&self) -> bool {
        self.by_identifier
            .values()
            .flatten()
            .any(|d| d.severity().is_error())
    }

    pub fn is_empty(&self) -> bool {
        self.by_identifier.is_empty()
    }

    pub fn mark_displayed(&mut self, now: Stamp) {
        self.displayed_at = Some(now);
    }

    pub fn last_displayed(&self) -> Option<Stamp> {
        self.displayed_at
    }

    /// Whether a consumer holding `snapshot` must re-render.
    pub fn must_refresh(&self, snapshot: Option<Stamp>) -> bool {
        let Some(displayed_at) = self.displayed_at else {
            return true;
        };
        if snapshot != Some(displayed_at) {
            return true;
        }
        self.updated_at.is_some_and(|updated| updated > displayed_at)
    }
}

/// Diagnostics of every file a server reported on, open or not.
pub struct DiagnosticsRegistry {
    documents: Mutex<HashMap<Url, DocumentDiagnostics>>,
    ticks: AtomicU64,
    events: mpsc::Sender<SyncEvent>,
}

impl DiagnosticsRegistry {
    #[must_use]
    pub fn new(events: mpsc::Sender<SyncEvent>) -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            ticks: AtomicU64::new(0),
            events,
        }
    }

    fn tick(&self) -> Stamp {
        Stamp(self.ticks.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Replace `uri`'s diagnostics under `identifier`.
    ///
    /// Emits [`SyncEvent::DiagnosticsChanged`] and returns `true` when the
    /// stored sequence differs from the previous one.
    pub fn update(&self, uri: &Url, identifier: &str, items: Vec<Diagnostic>) -> bool {
        let count = items.len();
        let last_displayed = {
            // Stamps are taken under the lock so they follow the order of writes.
            let mut documents = self.documents.lock();
            let now = self.tick();
            let entry = documents.entry(uri.clone()).or_default();
            if !entry.update(identifier, items, now) {
                return false;
            }
            entry.last_displayed()
        };

        tracing::debug!(uri = %uri, identifier, count, "Diagnostics updated");
        self.emit(SyncEvent::DiagnosticsChanged {
            uri: uri.clone(),
            last_displayed,
        });
        true
    }

    #[must_use]
    pub fn diagnostics(&self, uri: &Url) -> Vec<Diagnostic> {
        self.documents
            .lock()
            .get(uri)
            .map(DocumentDiagnostics::diagnostics)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn has_errors(&self, uri: &Url) -> bool {
        self.documents
            .lock()
            .get(uri)
            .is_some_and(DocumentDiagnostics::has_errors)
    }

    /// Record that `uri` was rendered now; returns the display stamp.
    pub fn mark_displayed(&self, uri: &Url) -> Stamp {
        let mut documents = self.documents.lock();
        let now = self.tick();
        documents.entry(uri.clone()).or_default().mark_displayed(now);
        now
    }

    #[must_use]
    pub fn must_refresh(&self, uri: &Url, snapshot: Option<Stamp>) -> bool {
        self.documents
            .lock()
            .get(uri)
            .is_none_or(|document| document.must_refresh(snapshot))
    }

    /// Drop everything cached for `uri`.
    pub fn clear(&self, uri: &Url) {
        let removed = self.documents.lock().remove(uri);
        if removed.is_some_and(|document| !document.is_empty()) {
            tracing::debug!(uri = %uri, "Diagnostics cleared");
            self.emit(SyncEvent::DiagnosticsCleared { uri: uri.clone() });
        }
    }

    /// Snapshot of every file with diagnostics, error-containing files first.
    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let mut files: Vec<(Url, Vec<Diagnostic>)> = self
            .documents
            .lock()
            .iter()
            .filter(|(_, document)| !document.is_empty())
            .map(|(uri, document)| (uri.clone(), document.diagnostics()))
            .collect();

        // Sort: files with errors first, then by URI
        files.sort_by(|a, b| {
            let a_has_errors = a.1.iter().any(|d| d.severity().is_error());
            let b_has_errors = b.1.iter().any(|d| d.severity().is_error());
            b_has_errors
                .cmp(&a_has_errors)
                .then_with(|| a.0.as_str().cmp(b.0.as_str()))
        });

        DiagnosticsSnapshot::new(files)
    }

    /// Only the errors of the given files, skipping files without any.
    #[must_use]
    pub fn errors_for_files(&self, uris: &[Url]) -> Vec<(Url, Vec<Diagnostic>)> {
        let documents = self.documents.lock();
        let mut result = Vec::new();
        for uri in uris {
            if let Some(document) = documents.get(uri) {
                let errors: Vec<Diagnostic> = document
                    .diagnostics()
                    .into_iter()
                    .filter(|d| d.severity().is_error())
                    .collect();
                if !errors.is_empty() {
                    result.push((uri.clone(), errors));
                }
            }
        }
        result
    }

    fn emit(&self, event: SyncEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(uri = %event.uri(), "Sync event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
