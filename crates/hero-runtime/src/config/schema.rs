//! Configuration schema definitions.
//!
//! ```toml
//! [bot]
//! namespace = "hero"
//! prefixes = ["!", "hero "]
//! owner_ids = [1234]
//!
//! [extensions]
//! enabled = ["moderation", "music"]
//! disabled = "music;admin"
//!
//! [extensions.config.moderation]
//! log_channel = 42
//!
//! [commands]
//! grouping = "single"
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use hero_framework::{CoreConfig, GroupingMode};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::loader::Profile;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeroConfig {
    /// The profile the config was loaded under; set by the loader.
    #[serde(skip)]
    pub profile: Profile,

    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub extensions: ExtensionsConfig,

    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub tasks: TasksConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HeroConfig {
    /// Converts into the framework's immutable configuration.
    ///
    /// The bundled `essentials` extension is always placed first in the
    /// boot order; duplicate entries keep their first position.
    pub fn core_config(&self) -> CoreConfig {
        let mut enabled: Vec<String> = Vec::with_capacity(self.extensions.enabled.len() + 1);
        #[cfg(feature = "builtin-extensions")]
        enabled.push(hero_framework::builtin::essentials::NAME.to_string());
        for name in &self.extensions.enabled {
            if !enabled.contains(name) {
                enabled.push(name.clone());
            }
        }

        CoreConfig {
            namespace: self.bot.namespace.clone(),
            prefixes: self.bot.prefixes.clone(),
            description: self.bot.description.clone(),
            owner_ids: self.bot.owner_ids.iter().copied().collect(),
            test_mode: self.profile == Profile::Test,
            grouping: self.commands.grouping,
            task_cancel_grace: Duration::from_millis(self.tasks.cancel_grace_ms),
            enabled_extensions: enabled,
            disabled_extensions: self.extensions.disabled.iter().cloned().collect(),
            extension_configs: self.extensions.config.clone(),
            cache_ttl: self.cache.default_ttl_secs.map(Duration::from_secs),
        }
    }
}

// =============================================================================
// Bot
// =============================================================================

/// Identity of the bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Separates several bots sharing one store or cache.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Initial command prefixes. The `essentials` extension can change them
    /// at runtime.
    #[serde(default = "default_prefixes")]
    pub prefixes: Vec<String>,

    #[serde(default)]
    pub description: String,

    /// Users allowed to run owner-only commands.
    #[serde(default)]
    pub owner_ids: Vec<u64>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            prefixes: default_prefixes(),
            description: String::new(),
            owner_ids: Vec::new(),
        }
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_prefixes() -> Vec<String> {
    vec!["!".to_string()]
}

// =============================================================================
// Extensions
// =============================================================================

/// Which extensions are loaded at boot, and their config sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtensionsConfig {
    /// Boot order. Accepts a list or a `;`-separated string.
    #[serde(default, deserialize_with = "list_or_joined")]
    pub enabled: Vec<String>,

    /// Never loaded, even when requested. Accepts a list or a
    /// `;`-separated string (`HERO_EXTENSIONS__DISABLED="music;admin"`).
    #[serde(default, deserialize_with = "list_or_joined")]
    pub disabled: Vec<String>,

    /// Per-extension tables, read once when the extension loads.
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

fn list_or_joined<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::List(list) => list,
        Raw::Joined(joined) => split_joined(&joined),
    })
}

pub(crate) fn split_joined(joined: &str) -> Vec<String> {
    joined
        .split(';')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

// =============================================================================
// Commands and tasks
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// How flat command names are split into groups (`nested` or `single`).
    #[serde(default)]
    pub grouping: GroupingMode,

    /// Command lookup is always case sensitive; the key is reserved.
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            grouping: GroupingMode::default(),
            case_sensitive: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// How long a cancelled task may keep running before it is aborted.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            cancel_grace_ms: default_cancel_grace_ms(),
        }
    }
}

fn default_cancel_grace_ms() -> u64 {
    5000
}

// =============================================================================
// Backends
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// `memory` (alias `simple`) is the only backend shipped.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// TTL applied when a value is set without one.
    #[serde(default)]
    pub default_ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            default_ttl_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
        }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Needs the `json-log` feature; falls back to `full` without it.
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Rotation of file output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,
    Hourly,
    #[default]
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Target file for `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-target overrides, e.g. `hero_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}
