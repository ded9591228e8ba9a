//! Content change events, shaped like LSP `TextDocumentContentChangeEvent`.

use serde::{Deserialize, Serialize};

use crate::text::{PositionError, Range, offset_at};

/// One content change sent in a `textDocument/didChange` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeEvent {
    /// Replace `range` (measured against the text before this change) with `text`.
    Incremental {
        range: Range,
        /// Length of the replaced region in UTF-16 code units.
        #[serde(rename = "rangeLength", default)]
        range_length: u32,
        text: String,
    },
    /// Replace the whole document with `text`.
    Full { text: String },
}

impl ChangeEvent {
    #[must_use]
    pub fn full(text: impl Into<String>) -> Self {
        Self::Full { text: text.into() }
    }

    #[must_use]
    pub fn incremental(range: Range, range_length: u32, text: impl Into<String>) -> Self {
        Self::Incremental {
            range,
            range_length,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full { .. })
    }

    /// Inserted text (incremental) or the whole new document (full).
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Incremental { text, .. } | Self::Full { text } => text,
        }
    }
}

/// Apply a single change event to `text`, returning the new document text.
pub fn apply_change(text: &str, change: &ChangeEvent) -> Result<String, PositionError> {
    match change {
        ChangeEvent::Full { text: replacement } => Ok(replacement.clone()),
        ChangeEvent::Incremental {
            range,
            text: replacement,
            ..
        } => {
            let start = offset_at(text, range.start)?;
            let end = offset_at(text, range.end)?;
            if end < start {
                return Err(PositionError::CharacterOutOfRange {
                    line: range.end.line,
                    character: range.end.character,
                });
            }
            let mut out = String::with_capacity(text.len() - (end - start) + replacement.len());
            out.push_str(&text[..start]);
            out.push_str(replacement);
            out.push_str(&text[end..]);
            Ok(out)
        }
    }
}

/// Apply change events in order, the way a server replays one `didChange`.
pub fn apply_changes<'a>(
    text: &str,
    changes: impl IntoIterator<Item = &'a ChangeEvent>,
) -> Result<String, PositionError> {
    let mut current = text.to_string();
    for change in changes {
        current = apply_change(&current, change)?;
    }
    Ok(current)
}
