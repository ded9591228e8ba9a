//! Server capability inputs: how a document is synchronized, and which
//! client features (pull diagnostics) apply to it.

use std::sync::atomic::{AtomicBool, Ordering};

use lockstep_types::SyncKind;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

/// The `textDocumentSync` entry of a server's `ServerCapabilities`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TextDocumentSyncCapability {
    /// Bare `TextDocumentSyncKind` number.
    Kind(u64),
    Options(TextDocumentSyncOptions),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentSyncOptions {
    #[serde(default)]
    pub open_close: Option<bool>,
    #[serde(default)]
    pub change: Option<u64>,
    #[serde(default)]
    pub save: Option<SaveCapability>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SaveCapability {
    Flag(bool),
    Options {
        #[serde(rename = "includeText", default)]
        include_text: Option<bool>,
    },
}

/// Whether and how `didSave` is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SavePolicy {
    #[default]
    Disabled,
    Notify,
    NotifyWithText,
}

impl SavePolicy {
    fn from_capability(save: Option<SaveCapability>) -> Self {
        match save {
            None | Some(SaveCapability::Flag(false)) => Self::Disabled,
            Some(SaveCapability::Flag(true)) => Self::Notify,
            Some(SaveCapability::Options { include_text }) => {
                if include_text.unwrap_or(false) {
                    Self::NotifyWithText
                } else {
                    Self::Notify
                }
            }
        }
    }

    #[must_use]
    pub fn includes_text(self) -> bool {
        self == Self::NotifyWithText
    }
}

/// Synchronization rules for one document↔server pairing, fixed at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    kind: SyncKind,
    open_close: bool,
    save: SavePolicy,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self::from_capability(None)
    }
}

impl SyncPolicy {
    #[must_use]
    pub fn new(kind: SyncKind, open_close: bool, save: SavePolicy) -> Self {
        Self {
            kind,
            open_close,
            save,
        }
    }

    /// Map a `textDocumentSync` capability onto a policy.
    ///
    /// An absent capability keeps the conservative default of full sync with
    /// open/close notifications.
    #[must_use]
    pub fn from_capability(capability: Option<&TextDocumentSyncCapability>) -> Self {
        match capability {
            None => Self::new(SyncKind::Full, true, SavePolicy::Disabled),
            Some(TextDocumentSyncCapability::Kind(kind)) => {
                Self::new(kind_or_full(Some(*kind)), true, SavePolicy::Disabled)
            }
            Some(TextDocumentSyncCapability::Options(options)) => Self::new(
                kind_or_full(options.change),
                options.open_close.unwrap_or(false),
                SavePolicy::from_capability(options.save),
            ),
        }
    }

    /// Read `textDocumentSync` out of a raw `ServerCapabilities` object.
    ///
    /// A malformed entry is logged and treated as absent.
    #[must_use]
    pub fn from_server_capabilities(capabilities: &Value) -> Self {
        let capability = match capabilities.get("textDocumentSync") {
            None | Some(Value::Null) => None,
            Some(raw) => match serde_json::from_value::<TextDocumentSyncCapability>(raw.clone()) {
                Ok(capability) => Some(capability),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring malformed textDocumentSync capability");
                    None
                }
            },
        };
        Self::from_capability(capability.as_ref())
    }

    #[must_use]
    pub fn kind(&self) -> SyncKind {
        self.kind
    }

    #[must_use]
    pub fn open_close(&self) -> bool {
        self.open_close
    }

    #[must_use]
    pub fn save(&self) -> SavePolicy {
        self.save
    }
}

fn kind_or_full(kind: Option<u64>) -> SyncKind {
    kind.and_then(SyncKind::from_lsp).unwrap_or(SyncKind::Full)
}

/// Sync kind negotiated by a `textDocumentSync` capability.
#[must_use]
pub fn sync_kind(capability: Option<&TextDocumentSyncCapability>) -> SyncKind {
    SyncPolicy::from_capability(capability).kind()
}

/// Client-side features that can change while a document is open.
pub trait ClientFeatures: Send + Sync {
    fn pull_diagnostics_supported(&self, uri: &Url) -> bool;

    /// Identifier sent with `textDocument/diagnostic`; also the cache key for
    /// pulled diagnostics.
    fn diagnostic_identifier(&self) -> Option<String> {
        None
    }
}

/// Pull-diagnostics support as registered by a server, statically or via
/// `client/registerCapability`.
#[derive(Debug, Default)]
pub struct DiagnosticFeature {
    supported: AtomicBool,
    identifier: Option<String>,
}

impl DiagnosticFeature {
    #[must_use]
    pub fn new(supported: bool, identifier: Option<String>) -> Self {
        Self {
            supported: AtomicBool::new(supported),
            identifier,
        }
    }

    /// Read `diagnosticProvider` out of a raw `ServerCapabilities` object.
    #[must_use]
    pub fn from_server_capabilities(capabilities: &Value) -> Self {
        match capabilities.get("diagnosticProvider") {
            None | Some(Value::Null | Value::Bool(false)) => Self::new(false, None),
            Some(provider) => {
                let identifier = provider
                    .get("identifier")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Self::new(true, identifier)
            }
        }
    }

    /// Late registration flips support on for every document of the server.
    pub fn set_supported(&self, supported: bool) {
        self.supported.store(supported, Ordering::Release);
    }
}

impl ClientFeatures for DiagnosticFeature {
    fn pull_diagnostics_supported(&self, _uri: &Url) -> bool {
        self.supported.load(Ordering::Acquire)
    }

    fn diagnostic_identifier(&self) -> Option<String> {
        self.identifier.clone()
    }
}
