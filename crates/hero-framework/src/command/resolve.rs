//! Flat command name → command path.
//!
//! Extensions declare commands with flat, underscore-joined names; the
//! underscores mark group nesting. [`split_name`] turns such a name into the
//! path the command occupies in the [`CommandTree`](super::CommandTree):
//!
//! ```text
//! kick                       → [kick]
//! _eval                      → [_eval]           (boundary underscore)
//! settings_ping              → [settings, ping]
//! a_b_c         (nested)     → [a, b, c]
//! a_b_c         (single)     → [a, b_c]
//! a__b, __eval, ___, ""      → invalid
//! ```

use serde::{Deserialize, Serialize};

/// How many group levels a flat name produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupingMode {
    /// Every inner underscore opens another group level, so
    /// `settings_set_log_channel` is invoked as `settings set log channel`.
    /// Use [`Single`](Self::Single) to keep multi-word subcommands.
    #[default]
    Nested,
    /// Only the first inner underscore separates group and command; the rest
    /// of the name stays in the subcommand (`settings_set_log_channel` →
    /// `settings` › `set_log_channel`).
    Single,
}

/// Splits a flat command name into its path segments.
///
/// Returns the reason on rejection; the caller wraps it into
/// [`RegistryError::InvalidCommandName`](crate::RegistryError::InvalidCommandName).
pub fn split_name(name: &str, mode: GroupingMode) -> Result<Vec<String>, &'static str> {
    if name.is_empty() {
        return Err("name is empty");
    }
    if name.chars().any(char::is_whitespace) {
        return Err("name contains whitespace");
    }
    if name.chars().all(|c| c == '_') {
        return Err("name consists only of underscores");
    }
    if name.contains("__") {
        return Err("consecutive underscores leave an empty group name");
    }

    let leading = name.starts_with('_');
    let trailing = name.ends_with('_');
    let core = &name[usize::from(leading)..name.len() - usize::from(trailing)];

    if !core.contains('_') {
        return Ok(vec![name.to_string()]);
    }

    let mut segments: Vec<String> = match mode {
        GroupingMode::Nested => core.split('_').map(str::to_string).collect(),
        GroupingMode::Single => core.splitn(2, '_').map(str::to_string).collect(),
    };
    if leading && let Some(first) = segments.first_mut() {
        first.insert(0, '_');
    }
    if trailing && let Some(last) = segments.last_mut() {
        last.push('_');
    }
    Ok(segments)
}
