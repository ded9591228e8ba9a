//! LSP client document synchronization and pull diagnostics.
//!
//! Keeps an editor buffer and a language server's view of it in lockstep:
//! edits are turned into ordered, strictly versioned `didChange`
//! notifications, and diagnostics pulled after each change are cached only
//! while they still describe the current version.

pub mod capabilities;
pub mod config;
pub mod error;
pub mod resolver;
pub mod session;
pub mod types;

pub(crate) mod changes;
pub(crate) mod clock;
pub(crate) mod diagnostics;
pub(crate) mod outbox;
pub(crate) mod protocol;
pub(crate) mod pull;

mod manager;
mod synchronizer;

pub use capabilities::{
    ClientFeatures, DiagnosticFeature, SaveCapability, SavePolicy, SyncPolicy,
    TextDocumentSyncCapability, TextDocumentSyncOptions, sync_kind,
};
pub use changes::EditEvent;
pub use config::{LockstepConfig, ServerDefinition, SyncConfig};
pub use diagnostics::{DiagnosticsRegistry, Stamp};
pub use error::{SessionError, SyncError};
pub use manager::DocumentManager;
pub use outbox::Delivery;
pub use protocol::{
    DEFAULT_PULL_IDENTIFIER, DID_CHANGE, DID_CLOSE, DID_OPEN, DID_SAVE, DOCUMENT_DIAGNOSTIC,
    PUBLISH_DIAGNOSTICS, PUBLISH_IDENTIFIER, PullReport, parse_diagnostic_report,
};
pub use resolver::{AnyUri, FileResolver, WorkspaceResolver};
pub use session::{LanguageServer, ServerHandle, ServerSession, SessionFut, TextSource};
pub use synchronizer::{Collaborators, DocumentInfo, DocumentSynchronizer, OpenHandshake};
pub use types::{DiagnosticsSnapshot, DocumentPhase, RefreshOrigin, SyncEvent};

pub use lockstep_types::{
    ChangeEvent, Diagnostic, DiagnosticSeverity, Position, PositionError, PullVersion, Range,
    SyncKind, Version,
};
