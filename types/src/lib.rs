//! Core domain types for lockstep.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the synchronization engine.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod change;
mod diagnostic;
mod text;

pub use change::{ChangeEvent, apply_change, apply_changes};
pub use diagnostic::{Diagnostic, DiagnosticSeverity};
pub use text::{Position, PositionError, Range, offset_at, position_at, utf16_len};

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Document versions
// ============================================================================

/// Version number of a document as seen by a language server.
///
/// Version 0 means "never sent"; the first `didOpen` carries version 1.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i32);

impl Version {
    pub const INITIAL: Self = Self(0);

    #[must_use]
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn value(self) -> i32 {
        self.0
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The version a diagnostic pull was issued against.
///
/// `Any` is the version-independent sentinel used by workspace-wide refreshes:
/// its responses are accepted whatever the document's current version is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PullVersion {
    Exact(Version),
    Any,
}

impl PullVersion {
    /// Whether a response issued at `self` is still fresh for a document at `current`.
    #[must_use]
    pub fn accepts(self, current: Version) -> bool {
        match self {
            Self::Exact(version) => version == current,
            Self::Any => true,
        }
    }
}

impl fmt::Display for PullVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(version) => write!(f, "{version}"),
            Self::Any => f.write_str("any"),
        }
    }
}

// ============================================================================
// Text document sync kind
// ============================================================================

/// Granularity of content change reporting negotiated with a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    /// Content changes are never reported.
    None,
    /// Every change carries the whole document text.
    #[default]
    Full,
    /// Changes carry a range and its replacement text.
    Incremental,
}

impl SyncKind {
    /// Convert from the LSP numeric kind (0=None, 1=Full, 2=Incremental).
    ///
    /// Returns `None` for values outside the LSP-defined range.
    #[must_use]
    pub fn from_lsp(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Full),
            2 => Some(Self::Incremental),
            _ => None,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}
