//! LSP wire shapes for document synchronization and pull diagnostics.

use std::collections::HashMap;

use lockstep_types::{ChangeEvent, Diagnostic, DiagnosticSeverity, Range, Version};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use crate::error::SyncError;

pub const DID_OPEN: &str = "textDocument/didOpen";
pub const DID_CHANGE: &str = "textDocument/didChange";
pub const DID_SAVE: &str = "textDocument/didSave";
pub const DID_CLOSE: &str = "textDocument/didClose";
pub const DOCUMENT_DIAGNOSTIC: &str = "textDocument/diagnostic";
pub const PUBLISH_DIAGNOSTICS: &str = "textDocument/publishDiagnostics";

/// Cache key for pulled diagnostics when the server registers no identifier.
pub const DEFAULT_PULL_IDENTIFIER: &str = "pull";

/// Cache key for pushed (`publishDiagnostics`) diagnostics.
pub const PUBLISH_IDENTIFIER: &str = "publish";

pub(crate) fn did_open_params(uri: &Url, language_id: &str, version: Version, text: &str) -> Value {
    json!({
        "textDocument": {
            "uri": uri.as_str(),
            "languageId": language_id,
            "version": version,
            "text": text
        }
    })
}

pub(crate) fn did_change_params(uri: &Url, version: Version, changes: &[ChangeEvent]) -> Value {
    json!({
        "textDocument": {
            "uri": uri.as_str(),
            "version": version
        },
        "contentChanges": changes
    })
}

pub(crate) fn did_save_params(uri: &Url, text: Option<&str>) -> Value {
    match text {
        Some(text) => json!({ "textDocument": { "uri": uri.as_str() }, "text": text }),
        None => json!({ "textDocument": { "uri": uri.as_str() } }),
    }
}

pub(crate) fn did_close_params(uri: &Url) -> Value {
    json!({ "textDocument": { "uri": uri.as_str() } })
}

pub(crate) fn document_diagnostic_params(uri: &Url, identifier: Option<&str>) -> Value {
    match identifier {
        Some(identifier) => json!({ "textDocument": { "uri": uri.as_str() }, "identifier": identifier }),
        None => json!({ "textDocument": { "uri": uri.as_str() } }),
    }
}

/// `DocumentDiagnosticReport` as returned by `textDocument/diagnostic`.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum DocumentDiagnosticReport {
    Full {
        #[serde(default)]
        items: Vec<LspDiagnostic>,
        #[serde(rename = "relatedDocuments", default)]
        related_documents: Option<HashMap<String, RelatedDocumentReport>>,
    },
    Unchanged {
        #[serde(rename = "relatedDocuments", default)]
        related_documents: Option<HashMap<String, RelatedDocumentReport>>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum RelatedDocumentReport {
    Full {
        #[serde(default)]
        items: Vec<LspDiagnostic>,
    },
    Unchanged {},
}

impl RelatedDocumentReport {
    fn into_items(self) -> Option<Vec<Diagnostic>> {
        match self {
            Self::Full { items } => Some(items.iter().map(LspDiagnostic::to_diagnostic).collect()),
            Self::Unchanged {} => None,
        }
    }
}

/// A decoded pull response.
#[derive(Debug, Clone, PartialEq)]
pub enum PullReport {
    /// Diagnostics for the requested document only.
    Direct(Vec<Diagnostic>),
    /// A bundle that also names other documents.
    ///
    /// `None` means "unchanged since the previous report" and leaves the cache alone.
    Related {
        own: Option<Vec<Diagnostic>>,
        documents: Vec<(String, Option<Vec<Diagnostic>>)>,
    },
}

/// Decode a `textDocument/diagnostic` result. `null` decodes to `None`.
pub fn parse_diagnostic_report(result: Value) -> Result<Option<PullReport>, SyncError> {
    if result.is_null() {
        return Ok(None);
    }
    let report: DocumentDiagnosticReport =
        serde_json::from_value(result).map_err(|e| SyncError::MalformedReport(e.to_string()))?;

    let (own, related) = match report {
        DocumentDiagnosticReport::Full {
            items,
            related_documents,
        } => (
            Some(items.iter().map(LspDiagnostic::to_diagnostic).collect()),
            related_documents,
        ),
        DocumentDiagnosticReport::Unchanged { related_documents } => (None, related_documents),
    };

    let report = match (own, related) {
        (Some(items), None) => PullReport::Direct(items),
        (own, related) => {
            let mut documents: Vec<(String, Option<Vec<Diagnostic>>)> = related
                .unwrap_or_default()
                .into_iter()
                .map(|(uri, report)| (uri, report.into_items()))
                .collect();
            documents.sort_by(|a, b| a.0.cmp(&b.0));
            PullReport::Related { own, documents }
        }
    };
    Ok(Some(report))
}

#[derive(Debug, Deserialize)]
pub(crate) struct PublishDiagnosticsParams {
    pub uri: String,
    #[serde(default)]
    pub version: Option<i32>,
    pub diagnostics: Vec<LspDiagnostic>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LspDiagnostic {
    pub range: Range,
    pub severity: Option<u64>,
    pub source: Option<String>,
    pub message: String,
    #[serde(default)]
    pub code: Option<Value>,
}

impl LspDiagnostic {
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match &self.code {
            Some(Value::String(code)) => Some(code.clone()),
            Some(Value::Number(code)) => Some(code.to_string()),
            _ => None,
        };
        Diagnostic::new(
            self.range,
            self.severity
                .and_then(DiagnosticSeverity::from_lsp)
                .unwrap_or(DiagnosticSeverity::Warning),
            self.message.clone(),
            self.source
                .clone()
                .unwrap_or_else(|| String::from("unknown")),
            code,
        )
    }
}
