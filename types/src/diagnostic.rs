//! Diagnostics as cached and rendered by the client.

use crate::text::Range;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Convert from LSP numeric severity (1=Error, 2=Warning, 3=Info, 4=Hint).
    ///
    /// Returns `None` for values outside the LSP-defined range.
    /// Callers (boundary code) decide the fallback policy.
    #[must_use]
    pub fn from_lsp(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }
}

/// A single diagnostic reported by a language server.
///
/// Fields are private and set once at construction; equality is structural so
/// a cache can tell whether a new report actually changed anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    range: Range,
    severity: DiagnosticSeverity,
    message: String,
    /// Resolved to a concrete string at the wire boundary ("unknown" if absent).
    source: String,
    code: Option<String>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        range: Range,
        severity: DiagnosticSeverity,
        message: String,
        source: String,
        code: Option<String>,
    ) -> Self {
        Self {
            range,
            severity,
            message,
            source,
            code,
        }
    }

    #[must_use]
    pub fn range(&self) -> Range {
        self.range
    }

    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Source of the diagnostic (e.g. "rustc", "clippy").
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// 0-indexed start line.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.range.start.line
    }

    /// 0-indexed start column.
    #[must_use]
    pub fn col(&self) -> u32 {
        self.range.start.character
    }
}
