//! `hero extension <name>`: writes a new extension crate skeleton.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};

const CARGO_TOML: &str = r#"[package]
name = "__NAME__"
version = "0.1.0"
edition = "2024"

[dependencies]
hero = "__VERSION__"
serde = { version = "1", features = ["derive"] }
serde_json = "1"
"#;

const LIB_RS: &str = r#"//! The `__NAME__` extension.
//!
//! Register it on the runtime with
//! `HeroRuntime::builder(gateway).extension(__NAME__::DESCRIPTOR)` and add
//! `"__NAME__"` to `extensions.enabled` in `hero.toml`.

use hero::prelude::*;
use serde::Deserialize;
use serde_json::{Value, json};

pub const DESCRIPTOR: ExtensionDescriptor = ExtensionDescriptor::new("__NAME__")
    .description("The __NAME__ extension")
    .cogs(&[__NAME___cog])
    .settings(default_settings);

/// Read once per load from `[extensions.config.__NAME__]`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub greeting: Option<String>,
}

/// Stored per bot namespace on first load; survives restarts.
fn default_settings() -> Value {
    json!({ "uses": 0 })
}

struct __TYPE__;

fn __NAME___cog(_: &ExtensionSetup) -> CogBuilder {
    CogBuilder::of::<__TYPE__>()
        .command(CommandSpec::new("__NAME___hello", hello).help("Greets you."))
}

async fn hello(
    ExtensionConfig(config): ExtensionConfig<Config>,
    Settings(settings): Settings,
) -> Result<String, BoxError> {
    let uses = settings.value()["uses"].as_u64().unwrap_or(0) + 1;
    settings.set("uses", &uses).await?;

    let greeting = config.greeting.unwrap_or_else(|| "Hello!".to_string());
    Ok(format!("{greeting} (used {uses} times)"))
}
"#;

pub fn run(name: &str, dir: &Path) -> Result<ExitCode> {
    let root = scaffold(name, dir)?;
    println!("Created extension '{name}' in {}", root.display());
    println!("Next: add it to your bot with `.extension({name}::DESCRIPTOR)`");
    println!("      and list \"{name}\" under [extensions] enabled in hero.toml.");
    Ok(ExitCode::SUCCESS)
}

/// Writes `dir/<name>/{Cargo.toml, src/lib.rs}` and returns `dir/<name>`.
///
/// Refuses to touch an existing directory.
pub fn scaffold(name: &str, dir: &Path) -> Result<PathBuf> {
    validate_name(name)?;

    let root = dir.join(name);
    if root.exists() {
        bail!("{} already exists, refusing to overwrite it", root.display());
    }

    let src = root.join("src");
    fs::create_dir_all(&src)
        .with_context(|| format!("Failed to create {}", src.display()))?;

    let render = |template: &str| {
        template
            .replace("__NAME__", name)
            .replace("__TYPE__", &type_name(name))
            .replace("__VERSION__", env!("CARGO_PKG_VERSION"))
    };

    let cargo = root.join("Cargo.toml");
    fs::write(&cargo, render(CARGO_TOML))
        .with_context(|| format!("Failed to write {}", cargo.display()))?;

    let lib = src.join("lib.rs");
    fs::write(&lib, render(LIB_RS))
        .with_context(|| format!("Failed to write {}", lib.display()))?;

    Ok(root)
}

/// Extension names double as crate, config and settings keys.
fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        bail!("extension name cannot be empty");
    };
    if !first.is_ascii_lowercase() {
        bail!("extension name '{name}' must start with a lowercase letter");
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        bail!("extension name '{name}' may only contain a-z, 0-9 and '_'");
    }
    if name.contains("__") || name.ends_with('_') {
        bail!("extension name '{name}' cannot contain '__' or end with '_'");
    }
    Ok(())
}

/// `auto_mod` → `AutoMod`.
fn type_name(name: &str) -> String {
    name.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_a_crate_skeleton() {
        let tmp = tempfile::tempdir().unwrap();
        let root = scaffold("auto_mod", tmp.path()).unwrap();
        assert_eq!(root, tmp.path().join("auto_mod"));

        let cargo = fs::read_to_string(root.join("Cargo.toml")).unwrap();
        assert!(cargo.contains("name = \"auto_mod\""));
        assert!(cargo.contains(&format!("hero = \"{}\"", env!("CARGO_PKG_VERSION"))));

        let lib = fs::read_to_string(root.join("src/lib.rs")).unwrap();
        assert!(lib.contains("ExtensionDescriptor::new(\"auto_mod\")"));
        assert!(lib.contains("struct AutoMod;"));
        assert!(lib.contains("fn auto_mod_cog("));
        assert!(!lib.contains("__NAME__") && !lib.contains("__TYPE__"));
    }

    #[test]
    fn refuses_to_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("music")).unwrap();
        fs::write(tmp.path().join("music/keep.txt"), "mine").unwrap();

        let err = scaffold("music", tmp.path()).unwrap_err();
        assert!(err.to_string().contains("refusing to overwrite"));
        assert_eq!(
            fs::read_to_string(tmp.path().join("music/keep.txt")).unwrap(),
            "mine"
        );
        assert!(!tmp.path().join("music/Cargo.toml").exists());
    }

    #[test]
    fn rejects_bad_names() {
        for name in ["", "Music", "1st", "my-ext", "a__b", "trailing_"] {
            assert!(validate_name(name).is_err(), "{name:?} should be rejected");
        }
        assert!(validate_name("music2").is_ok());
    }

    #[test]
    fn type_names_are_pascal_case() {
        assert_eq!(type_name("music"), "Music");
        assert_eq!(type_name("auto_mod"), "AutoMod");
    }
}
