use lockstep_types::Version;

/// Per-document version counter.
///
/// Lives inside the document's state mutex so stamping a version and
/// enqueueing the notification that carries it happen together.
#[derive(Debug, Default)]
pub(crate) struct VersionClock {
    current: Version,
}

impl VersionClock {
    /// Issue the next version. The first call returns 1.
    pub fn next(&mut self) -> Version {
        self.current = self.current.next();
        self.current
    }

    /// Last issued version, or 0 if nothing was sent yet.
    pub fn current(&self) -> Version {
        self.current
    }
}
