//! URI ↔ file identity for diagnostics that name documents other than the
//! one being synchronized.

use std::path::{Component, Path, PathBuf};

use url::Url;

/// Maps a URI reported by a server to a document the editor knows about.
pub trait FileResolver: Send + Sync {
    /// `None` when the URI does not name a file the editor can show.
    fn resolve(&self, uri: &str) -> Option<Url>;
}

/// Accepts `file:` URIs that fall inside a workspace root.
#[derive(Debug, Clone)]
pub struct WorkspaceResolver {
    root: PathBuf,
}

impl WorkspaceResolver {
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: normalize_path(root),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileResolver for WorkspaceResolver {
    fn resolve(&self, uri: &str) -> Option<Url> {
        let path = file_uri_to_path(uri)?;
        let normalized = normalize_path(&path);
        if !normalized.starts_with(&self.root) {
            tracing::warn!(
                uri,
                root = %self.root.display(),
                "Ignoring diagnostics for path outside workspace"
            );
            return None;
        }
        Url::from_file_path(&normalized).ok()
    }
}

/// Resolves every absolute URI as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyUri;

impl FileResolver for AnyUri {
    fn resolve(&self, uri: &str) -> Option<Url> {
        Url::parse(uri).ok()
    }
}

fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    Url::parse(uri).ok().and_then(|u| u.to_file_path().ok())
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out = Vec::new();
    for c in path.components() {
        match c {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out.iter().collect()
}
