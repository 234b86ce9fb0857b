//! Immutable framework configuration.
//!
//! [`CoreConfig`] is built once at startup (normally by `hero-runtime` from
//! the figment-loaded file) and shared as `Arc<CoreConfig>` with the
//! registry, lifecycle manager and dispatcher. Nothing mutates it afterwards;
//! runtime-adjustable values such as prefixes live on [`Core`](crate::Core).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde_json::Value;

use crate::command::GroupingMode;

/// Default grace period granted to a cancelled task before it is aborted.
pub const DEFAULT_TASK_CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Framework-level configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Storage/cache namespace separating several bots sharing a backend.
    pub namespace: String,
    /// Initial command prefixes.
    pub prefixes: Vec<String>,
    /// Initial bot description.
    pub description: String,
    /// Users allowed past `owner_only` checks.
    pub owner_ids: HashSet<u64>,
    /// Enables `test_only` commands.
    pub test_mode: bool,
    /// How flat command names are split into groups.
    pub grouping: GroupingMode,
    /// How long a cancelled task may keep running before it is aborted.
    pub task_cancel_grace: Duration,
    /// Extensions loaded at boot, in declaration order.
    pub enabled_extensions: Vec<String>,
    /// Extensions that are skipped even when requested.
    pub disabled_extensions: HashSet<String>,
    /// Per-extension config sections, keyed by extension name.
    pub extension_configs: HashMap<String, Value>,
    /// Default TTL applied by extension cache handles.
    pub cache_ttl: Option<Duration>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            prefixes: vec!["!".to_string()],
            description: String::new(),
            owner_ids: HashSet::new(),
            test_mode: false,
            grouping: GroupingMode::default(),
            task_cancel_grace: DEFAULT_TASK_CANCEL_GRACE,
            enabled_extensions: Vec::new(),
            disabled_extensions: HashSet::new(),
            extension_configs: HashMap::new(),
            cache_ttl: None,
        }
    }
}

impl CoreConfig {
    /// Returns `true` when `extension` has been administratively disabled.
    pub fn is_disabled(&self, extension: &str) -> bool {
        self.disabled_extensions.contains(extension)
    }

    pub fn is_owner(&self, user_id: u64) -> bool {
        self.owner_ids.contains(&user_id)
    }

    /// The config section for `extension`, or an empty object.
    pub fn extension_config(&self, extension: &str) -> Value {
        self.extension_configs
            .get(extension)
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_extension_config_is_an_empty_object() {
        let config = CoreConfig::default();
        assert_eq!(config.extension_config("nope"), serde_json::json!({}));
    }

    #[test]
    fn disabled_lookup() {
        let config = CoreConfig {
            disabled_extensions: ["music".to_string()].into(),
            ..Default::default()
        };
        assert!(config.is_disabled("music"));
        assert!(!config.is_disabled("essentials"));
    }
}
