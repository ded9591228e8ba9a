//! Public types consumed by the host.
//!
//! The host drains [`SyncEvent`]s to learn when a file needs re-rendering and
//! reads [`DiagnosticsSnapshot`]s for display.

use lockstep_types::{Diagnostic, DiagnosticSeverity};
use url::Url;

use crate::diagnostics::Stamp;

/// An event emitted by the synchronization engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Cached diagnostics of a file changed.
    ///
    /// `last_displayed` is the display stamp recorded when the update landed;
    /// pass it back to `must_refresh` to debounce re-renders.
    DiagnosticsChanged {
        uri: Url,
        last_displayed: Option<Stamp>,
    },
    /// A document closed and its diagnostics were dropped.
    DiagnosticsCleared { uri: Url },
}

impl SyncEvent {
    #[must_use]
    pub fn uri(&self) -> &Url {
        match self {
            Self::DiagnosticsChanged { uri, .. } | Self::DiagnosticsCleared { uri } => uri,
        }
    }
}

/// Where a document is in its open/change/close lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentPhase {
    Unopened,
    Opening,
    Opened,
    Closed,
}

/// Why a diagnostic pull was requested outside the edit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOrigin {
    /// The server registered pull diagnostics after the document was opened.
    CapabilityRegistered,
    /// The server asked for every document to be re-pulled
    /// (`workspace/diagnostic/refresh`).
    WorkspaceRefresh,
}

/// Immutable snapshot of all cached diagnostics, suitable for UI rendering.
///
/// Counts are computed from `files`, never cached alongside it.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsSnapshot {
    /// Per-file diagnostics, sorted with error-containing files first.
    files: Vec<(Url, Vec<Diagnostic>)>,
}

impl DiagnosticsSnapshot {
    pub(crate) fn new(files: Vec<(Url, Vec<Diagnostic>)>) -> Self {
        Self { files }
    }

    #[must_use]
    pub fn files(&self) -> &[(Url, Vec<Diagnostic>)] {
        &self.files
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn count_by_severity(&self, severity: DiagnosticSeverity) -> usize {
        self.files
            .iter()
            .flat_map(|(_, items)| items)
            .filter(|d| d.severity() == severity)
            .count()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Error)
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Warning)
    }

    #[must_use]
    pub fn info_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Information)
    }

    #[must_use]
    pub fn hint_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Hint)
    }

    /// Total diagnostic count across all files.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.files.iter().map(|(_, items)| items.len()).sum()
    }

    /// Format a compact status string like "E:3 W:5".
    #[must_use]
    pub fn status_string(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!("E:{} W:{}", self.error_count(), self.warning_count())
    }
}
