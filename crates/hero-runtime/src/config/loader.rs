//! Configuration loader using figment.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic overrides ([`ConfigLoader::merge`])
//! 3. Profile-specific file (`hero.{profile}.toml`)
//! 4. Main file (`hero.toml`)
//! 5. Environment variables (`HERO_*`)
//!
//! # File Lookup
//!
//! An explicit [`ConfigLoader::file`] wins, then the path in `HERO_CONFIG`.
//! Otherwise the current directory and `<user config dir>/hero` are searched
//! and the first directory holding a main file is used. The profile file is
//! always looked up next to the main file.
//!
//! # Environment Variable Mapping
//!
//! Nested keys are separated by `__`:
//!
//! - `HERO_BOT__PREFIXES=["?", "!"]` → `bot.prefixes`
//! - `HERO_EXTENSIONS__DISABLED="music;admin"` → `extensions.disabled`
//! - `HERO_LOGGING__LEVEL=debug` → `logging.level`
//!
//! `HERO_PROFILE` and `HERO_CONFIG` select the profile and file and are not
//! part of the config tree.
//!
//! # Example
//!
//! ```rust,ignore
//! use hero_runtime::config::{ConfigLoader, Profile};
//!
//! let config = ConfigLoader::new()
//!     .profile(Profile::Test)
//!     .file("./config/hero.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use figment::Figment;
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::HeroConfig;

/// Environment variable selecting the [`Profile`].
pub const PROFILE_ENV: &str = "HERO_PROFILE";
/// Environment variable pointing at a config file.
pub const CONFIG_ENV: &str = "HERO_CONFIG";

/// Base name of config files.
const FILE_STEM: &str = "hero";

// =============================================================================
// Profile
// =============================================================================

/// Deployment profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Enables test-only commands.
    Test,
    #[default]
    Prod,
}

impl Profile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Prod => "prod",
        }
    }

    /// Reads `HERO_PROFILE`, defaulting to [`Profile::Prod`].
    ///
    /// An unknown value is reported and ignored.
    pub fn from_env() -> Self {
        match std::env::var(PROFILE_ENV) {
            Ok(value) => value.parse().unwrap_or_else(|e: ConfigError| {
                warn!(error = %e, "Ignoring {PROFILE_ENV}");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "test" | "testing" => Ok(Self::Test),
            "prod" | "production" => Ok(Self::Prod),
            _ => Err(ConfigError::InvalidProfile(s.to_string())),
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    /// Programmatic overrides.
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Specific config file to load (overrides search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader using the profile from `HERO_PROFILE`.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    /// Adds a directory to search; replaces the default search paths.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration programmatically, below files and environment.
    pub fn merge(mut self, config: HeroConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> ConfigResult<HeroConfig> {
        let profile = self.profile;
        let figment = self.build_figment()?;

        let mut config: HeroConfig = figment.extract()?;
        config.profile = profile;

        debug!(
            profile = %profile,
            namespace = %config.bot.namespace,
            logging_level = %config.logging.level,
            "Configuration loaded"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(HeroConfig::default()));

        let overrides = std::mem::take(&mut self.figment);
        figment = figment.merge(overrides);

        let explicit = self
            .config_file
            .clone()
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            if let Some(profile_path) = self.profile_sibling(&path)
                && profile_path.exists()
            {
                debug!(path = %profile_path.display(), "Loading profile-specific config");
                figment = merge_config_file(figment, &profile_path)?;
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = merge_config_file(figment, &path)?;
        } else {
            figment = self.load_config_files(figment)?;
        }

        if self.load_env {
            trace!("Loading environment variables with HERO_ prefix");
            figment = figment.merge(
                Env::prefixed("HERO_")
                    .ignore(&["PROFILE", "CONFIG"])
                    .split("__"),
            );
        }

        Ok(figment)
    }

    /// `dir/hero.toml` → `dir/hero.<profile>.toml`.
    fn profile_sibling(&self, path: &Path) -> Option<PathBuf> {
        let stem = path.file_stem()?.to_str()?;
        let ext = path.extension()?.to_str()?;
        Some(path.with_file_name(format!("{stem}.{}.{ext}", self.profile)))
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(FILE_STEM));
        }
        paths
    }

    /// Merges the profile file and main file of the first search path that
    /// has a main file.
    fn load_config_files(&self, mut figment: Figment) -> ConfigResult<Figment> {
        for dir in self.resolve_search_paths() {
            for ext in file_formats() {
                let main = dir.join(format!("{FILE_STEM}.{ext}"));
                if !main.exists() {
                    continue;
                }
                let profile = dir.join(format!("{FILE_STEM}.{}.{ext}", self.profile));
                if profile.exists() {
                    debug!(path = %profile.display(), "Loading profile-specific config");
                    figment = merge_config_file(figment, &profile)?;
                }
                info!(path = %main.display(), "Loading configuration file");
                return merge_config_file(figment, &main);
            }
        }

        warn!("No configuration file found, using defaults");
        Ok(figment)
    }
}

/// File extensions accepted by this build.
fn file_formats() -> &'static [&'static str] {
    match (cfg!(feature = "toml-config"), cfg!(feature = "yaml-config")) {
        (true, true) => &["toml", "yaml", "yml"],
        (true, false) => &["toml"],
        (false, true) => &["yaml", "yml"],
        (false, false) => &[],
    }
}

/// Merges a single config file, dispatching on its extension.
fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::ParseError(format!(
            "unsupported or disabled configuration file format: .{ext}"
        ))),
    }
}

/// Loads the configuration from the default locations.
pub fn load_config() -> ConfigResult<HeroConfig> {
    ConfigLoader::new().load()
}

/// Loads the configuration from `path`, plus its profile sibling and the
/// environment.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<HeroConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn defaults_without_any_source() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.bot.prefixes, vec!["!"]);
            assert_eq!(config.bot.namespace, "default");
            assert_eq!(config.tasks.cancel_grace_ms, 5000);
            assert_eq!(config.profile, Profile::Prod);
            Ok(())
        });
    }

    #[test]
    fn profile_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env(PROFILE_ENV, "test");
            assert_eq!(Profile::from_env(), Profile::Test);
            jail.set_env(PROFILE_ENV, "staging");
            assert_eq!(Profile::from_env(), Profile::Prod);
            Ok(())
        });
    }

    #[test]
    fn unknown_profile_is_rejected_by_parse() {
        assert!(matches!(
            "staging".parse::<Profile>(),
            Err(ConfigError::InvalidProfile(_))
        ));
        assert_eq!("PRODUCTION".parse::<Profile>().unwrap(), Profile::Prod);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn layers_merge_in_priority_order() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "hero.test.toml",
                r#"
                [bot]
                namespace = "from-profile"
                description = "profile only"
                "#,
            )?;
            jail.create_file(
                "hero.toml",
                r#"
                [bot]
                namespace = "from-main"
                prefixes = ["?"]

                [extensions.config.music]
                volume = 3
                "#,
            )?;
            jail.set_env("HERO_BOT__NAMESPACE", "from-env");
            jail.set_env("HERO_EXTENSIONS__DISABLED", "music;admin");

            let config = ConfigLoader::new()
                .profile(Profile::Test)
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.profile, Profile::Test);
            assert_eq!(config.bot.namespace, "from-env");
            assert_eq!(config.bot.prefixes, vec!["?"]);
            assert_eq!(config.bot.description, "profile only");
            assert_eq!(config.extensions.disabled, vec!["music", "admin"]);
            assert_eq!(
                config.extensions.config["music"],
                serde_json::json!({ "volume": 3 })
            );
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn config_env_points_at_a_file() {
        Jail::expect_with(|jail| {
            jail.create_file("bot.toml", "[tasks]\ncancel_grace_ms = 100\n")?;
            jail.set_env(CONFIG_ENV, "bot.toml");

            let config = ConfigLoader::new().load().map_err(|e| e.to_string())?;
            assert_eq!(config.tasks.cancel_grace_ms, 100);
            Ok(())
        });
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        Jail::expect_with(|_| {
            let result = ConfigLoader::new().file("nope.toml").without_env().load();
            assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
            Ok(())
        });
    }

    #[test]
    fn programmatic_overrides_sit_below_the_environment() {
        Jail::expect_with(|jail| {
            let mut overrides = HeroConfig::default();
            overrides.bot.description = "merged".into();
            overrides.bot.namespace = "merged".into();
            jail.set_env("HERO_BOT__NAMESPACE", "env");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .merge(overrides)
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.bot.description, "merged");
            assert_eq!(config.bot.namespace, "env");
            Ok(())
        });
    }
}
