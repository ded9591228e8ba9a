//! Text geometry: byte offsets vs. LSP line/character positions.
//!
//! Offsets are byte offsets into a UTF-8 `str`. Positions follow the LSP
//! default encoding: `character` counts UTF-16 code units. `\n`, `\r\n` and a
//! lone `\r` all terminate a line.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A zero-based line/character position in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    /// UTF-16 code units from the start of the line.
    pub character: u32,
}

impl Position {
    #[must_use]
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open `[start, end)` range between two positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A zero-width range at `position`.
    #[must_use]
    pub fn empty(position: Position) -> Self {
        Self::new(position, position)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("offset {offset} is past the end of the text ({len} bytes)")]
    OffsetOutOfBounds { offset: usize, len: usize },
    #[error("offset {offset} is not on a UTF-8 character boundary")]
    NotCharBoundary { offset: usize },
    #[error("line {line} does not exist")]
    LineOutOfRange { line: u32 },
    #[error("character {character} is past the end of line {line}")]
    CharacterOutOfRange { line: u32, character: u32 },
    #[error("character {character} on line {line} splits a surrogate pair")]
    SplitsSurrogatePair { line: u32, character: u32 },
}

/// Number of UTF-16 code units needed to encode `s`.
#[must_use]
pub fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

fn is_line_break(bytes: &[u8], index: usize) -> bool {
    match bytes.get(index) {
        Some(b'\n') => true,
        Some(b'\r') => bytes.get(index + 1) != Some(&b'\n'),
        _ => false,
    }
}

/// Convert a byte offset into an LSP position.
pub fn position_at(text: &str, offset: usize) -> Result<Position, PositionError> {
    if offset > text.len() {
        return Err(PositionError::OffsetOutOfBounds {
            offset,
            len: text.len(),
        });
    }
    if !text.is_char_boundary(offset) {
        return Err(PositionError::NotCharBoundary { offset });
    }

    let bytes = text.as_bytes();
    let mut line = 0u32;
    let mut line_start = 0usize;
    for index in 0..offset {
        if is_line_break(bytes, index) {
            line += 1;
            line_start = index + 1;
        }
    }

    Ok(Position::new(
        line,
        utf16_len(&text[line_start..offset]) as u32,
    ))
}

/// Convert an LSP position back into a byte offset.
///
/// Positions past the end of a line are rejected rather than clamped, so a
/// replayed change either lands exactly or fails loudly.
pub fn offset_at(text: &str, position: Position) -> Result<usize, PositionError> {
    let bytes = text.as_bytes();

    let mut line_start = 0usize;
    let mut line = 0u32;
    while line < position.line {
        let next = (line_start..bytes.len())
            .find(|&index| is_line_break(bytes, index))
            .map(|index| index + 1);
        match next {
            Some(start) => {
                line_start = start;
                line += 1;
            }
            None => {
                return Err(PositionError::LineOutOfRange {
                    line: position.line,
                });
            }
        }
    }

    let mut units = 0u32;
    for (index, ch) in text[line_start..].char_indices() {
        if units == position.character {
            return Ok(line_start + index);
        }
        if is_line_break(bytes, line_start + index) {
            break;
        }
        units += ch.len_utf16() as u32;
        if units > position.character {
            return Err(PositionError::SplitsSurrogatePair {
                line: position.line,
                character: position.character,
            });
        }
    }

    // Only reachable with matching units when the last line has no terminator.
    if units == position.character {
        return Ok(text.len());
    }
    Err(PositionError::CharacterOutOfRange {
        line: position.line,
        character: position.character,
    })
}
