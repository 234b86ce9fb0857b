//! `hero start`: runs the bot against the console gateway.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use hero::runtime::{ConfigLoader, HeroRuntime, Profile, shutdown_signal};
use tracing::info;

use crate::console::ConsoleGateway;

/// Author id of console messages when no owner is configured.
const CONSOLE_USER: u64 = 1;

pub async fn run(config: Option<&Path>, profile: Option<Profile>) -> Result<ExitCode> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = config {
        loader = loader.file(path);
    }
    if let Some(profile) = profile {
        loader = loader.profile(profile);
    }
    let config = loader.load().context("Failed to load configuration")?;

    // Console messages come from the first owner so owner-only commands can
    // be tried locally.
    let author = config
        .bot
        .owner_ids
        .first()
        .copied()
        .unwrap_or(CONSOLE_USER);
    let gateway = ConsoleGateway::stdio(author);

    let runtime = HeroRuntime::from_config(config, gateway.clone())
        .context("Failed to initialize the runtime")?;

    runtime
        .run_until(async {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = gateway.input_closed() => info!("Console input closed, shutting down"),
            }
        })
        .await?;

    Ok(ExitCode::SUCCESS)
}
