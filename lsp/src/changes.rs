//! Buffers editor edits between flushes, shaped by the negotiated sync kind.

use lockstep_types::{ChangeEvent, PositionError, Range, SyncKind, position_at, utf16_len};

/// One edit as reported by the editor before it is applied.
///
/// `offset` and `old_length` are byte offsets into the pre-edit text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditEvent<'a> {
    pub offset: usize,
    pub old_length: usize,
    pub new_text: &'a str,
}

impl<'a> EditEvent<'a> {
    #[must_use]
    pub fn new(offset: usize, old_length: usize, new_text: &'a str) -> Self {
        Self {
            offset,
            old_length,
            new_text,
        }
    }

    #[must_use]
    pub fn insert(offset: usize, new_text: &'a str) -> Self {
        Self::new(offset, 0, new_text)
    }

    /// Apply this edit to `text`, the way the editor does after `before_edit`.
    pub fn apply(&self, text: &str) -> Result<String, PositionError> {
        let end = self.end_offset(text)?;
        let mut out = String::with_capacity(text.len() - self.old_length + self.new_text.len());
        out.push_str(&text[..self.offset]);
        out.push_str(self.new_text);
        out.push_str(&text[end..]);
        Ok(out)
    }

    fn end_offset(&self, text: &str) -> Result<usize, PositionError> {
        let end = self.offset.saturating_add(self.old_length);
        if end > text.len() {
            return Err(PositionError::OffsetOutOfBounds {
                offset: end,
                len: text.len(),
            });
        }
        for offset in [self.offset, end] {
            if !text.is_char_boundary(offset) {
                return Err(PositionError::NotCharBoundary { offset });
            }
        }
        Ok(end)
    }

    /// Convert against the pre-edit text into an incremental change event.
    fn to_change(self, pre_edit: &str) -> Result<ChangeEvent, PositionError> {
        let end = self.end_offset(pre_edit)?;
        let start = position_at(pre_edit, self.offset)?;
        let end_position = position_at(pre_edit, end)?;
        let range_length = utf16_len(&pre_edit[self.offset..end]) as u32;
        Ok(ChangeEvent::incremental(
            Range::new(start, end_position),
            range_length,
            self.new_text,
        ))
    }
}

/// Pending change events for one document.
///
/// Every event in the buffer matches the accumulator's sync kind, except that
/// an incremental conversion failure is recorded as a full-text event.
#[derive(Debug)]
pub(crate) struct ChangeAccumulator {
    kind: SyncKind,
    pending: Vec<ChangeEvent>,
    /// Set when the last `record_before` could not be converted.
    resync_after_edit: bool,
}

impl ChangeAccumulator {
    pub fn new(kind: SyncKind) -> Self {
        Self {
            kind,
            pending: Vec::new(),
            resync_after_edit: false,
        }
    }

    pub fn kind(&self) -> SyncKind {
        self.kind
    }

    /// Record an edit against the text it is about to modify.
    pub fn record_before(&mut self, pre_edit: &str, edit: EditEvent<'_>) {
        if self.kind != SyncKind::Incremental {
            return;
        }
        match edit.to_change(pre_edit) {
            Ok(change) => self.pending.push(change),
            Err(e) => {
                tracing::debug!(
                    offset = edit.offset,
                    old_length = edit.old_length,
                    error = %e,
                    "Cannot convert edit to a range, sending full text instead"
                );
                self.resync_after_edit = true;
            }
        }
    }

    /// Record the text after an edit has been applied.
    pub fn record_after(&mut self, post_edit: &str) {
        match self.kind {
            SyncKind::None => {}
            SyncKind::Full => {
                self.pending.clear();
                self.pending.push(ChangeEvent::full(post_edit));
            }
            SyncKind::Incremental => {
                if std::mem::take(&mut self.resync_after_edit) {
                    self.pending.push(ChangeEvent::full(post_edit));
                }
            }
        }
    }

    /// Note an edit whose pre-edit text was never recorded. Its `record_after`
    /// sends the full text.
    pub fn record_unseen_before(&mut self) {
        self.resync_after_edit = self.kind == SyncKind::Incremental;
    }

    /// Drop everything buffered, including a pending resync.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.resync_after_edit = false;
    }

    /// Take every buffered event, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
