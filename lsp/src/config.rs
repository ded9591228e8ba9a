//! Configuration for the synchronization engine.
//!
//! ```toml
//! [sync]
//! settle_delay_ms = 500
//! pull_debounce_ms = 500
//! headless = false
//!
//! [servers.rust]
//! language_id = "rust"
//! file_extensions = ["rs"]
//!
//! [servers.web]
//! language_id = "javascript"
//! file_extensions = ["js", "ts", "tsx"]
//! languages = { ts = "typescript", tsx = "typescriptreact" }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

/// Pause after `didOpen` before anything else is sent to the server.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

/// Quiet period before a diagnostic pull is dispatched after an edit.
pub const DEFAULT_PULL_DEBOUNCE_MS: u64 = 500;

/// Capacity of the channel carrying [`crate::SyncEvent`]s to the consumer.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Timing knobs for document synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    settle_delay_ms: u64,
    pull_debounce_ms: u64,
    /// Headless runs (tests, batch tools) skip the settle delay and pull immediately.
    headless: bool,
    event_channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            pull_debounce_ms: DEFAULT_PULL_DEBOUNCE_MS,
            headless: false,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Default timings with headless execution enabled.
    #[must_use]
    pub fn headless() -> Self {
        Self {
            headless: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = delay.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_pull_debounce(mut self, delay: Duration) -> Self {
        self.pull_debounce_ms = delay.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn is_headless(&self) -> bool {
        self.headless
    }

    /// Zero when headless.
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        if self.headless {
            Duration::ZERO
        } else {
            Duration::from_millis(self.settle_delay_ms)
        }
    }

    #[must_use]
    pub fn pull_debounce(&self) -> Duration {
        Duration::from_millis(self.pull_debounce_ms)
    }

    #[must_use]
    pub fn event_channel_capacity(&self) -> usize {
        self.event_channel_capacity.max(1)
    }
}

/// What the client knows about one language server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerDefinition {
    /// Language identifier sent in `didOpen` when no extension mapping applies.
    language_id: String,
    /// File extensions routed to this server (e.g. `["rs"]`).
    #[serde(default)]
    file_extensions: Vec<String>,
    /// Per-extension language identifiers, e.g. `ts = "typescript"`.
    #[serde(default)]
    languages: HashMap<String, String>,
}

impl ServerDefinition {
    #[must_use]
    pub fn new(language_id: impl Into<String>) -> Self {
        Self {
            language_id: language_id.into(),
            file_extensions: Vec::new(),
            languages: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extensions.push(extension.into());
        self
    }

    #[must_use]
    pub fn with_language(
        mut self,
        extension: impl Into<String>,
        language_id: impl Into<String>,
    ) -> Self {
        self.languages.insert(extension.into(), language_id.into());
        self
    }

    #[must_use]
    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    #[must_use]
    pub fn file_extensions(&self) -> &[String] {
        &self.file_extensions
    }

    /// Language identifier for `uri`: the extension mapping if one matches, else the default.
    #[must_use]
    pub fn language_id_for(&self, uri: &Url) -> &str {
        uri_extension(uri)
            .and_then(|ext| self.languages.get(ext))
            .map_or(self.language_id.as_str(), String::as_str)
    }
}

/// Extension of the last path segment of `uri`, without the dot.
pub(crate) fn uri_extension(uri: &Url) -> Option<&str> {
    let name = uri.path().rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    sync: SyncConfig,
    #[serde(default)]
    servers: HashMap<String, toml::Value>,
}

/// Top-level configuration: sync timings plus the known servers.
#[derive(Debug, Clone, Default)]
pub struct LockstepConfig {
    sync: SyncConfig,
    servers: HashMap<String, ServerDefinition>,
    /// Maps file extension (e.g. "rs") → server name (e.g. "rust").
    extension_map: HashMap<String, String>,
}

impl LockstepConfig {
    #[must_use]
    pub fn new(sync: SyncConfig, servers: HashMap<String, ServerDefinition>) -> Self {
        let extension_map = build_extension_map(&servers);
        Self {
            sync,
            servers,
            extension_map,
        }
    }

    /// Parse a TOML document.
    ///
    /// A malformed `[servers.*]` table is logged and skipped; the remaining
    /// servers still load.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(source).context("parsing lockstep config")?;

        let mut servers = HashMap::new();
        for (name, value) in raw.servers {
            match value.try_into::<ServerDefinition>() {
                Ok(definition) => {
                    servers.insert(name, definition);
                }
                Err(e) => {
                    tracing::warn!(server = %name, error = %e, "Ignoring malformed server definition");
                }
            }
        }

        Ok(Self::new(raw.sync, servers))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&source).with_context(|| format!("loading {}", path.display()))
    }

    #[must_use]
    pub fn sync(&self) -> &SyncConfig {
        &self.sync
    }

    #[must_use]
    pub fn servers(&self) -> &HashMap<String, ServerDefinition> {
        &self.servers
    }

    /// The server that handles `uri`, routed by file extension.
    #[must_use]
    pub fn server_for(&self, uri: &Url) -> Option<(&str, &ServerDefinition)> {
        let ext = uri_extension(uri)?;
        let name = self.extension_map.get(ext)?;
        let definition = self.servers.get(name)?;
        Some((name.as_str(), definition))
    }
}

/// Build extension → server name map. Overlaps resolve to the first name in sorted order.
fn build_extension_map(servers: &HashMap<String, ServerDefinition>) -> HashMap<String, String> {
    let mut extension_map: HashMap<String, String> = HashMap::new();
    let mut server_names: Vec<&String> = servers.keys().collect();
    server_names.sort();
    for name in server_names {
        for ext in servers[name].file_extensions() {
            if let Some(existing) = extension_map.get(ext) {
                tracing::warn!(
                    "Multiple servers configured for extension '{ext}': '{existing}' and '{name}'. Using '{existing}'."
                );
                continue;
            }
            extension_map.insert(ext.clone(), name.clone());
        }
    }
    extension_map
}
