//! Hero CLI - run a bot from the terminal or scaffold a new extension.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hero::runtime::Profile;
use hero_cli::commands;

/// Hero - an extension-based chat bot framework
#[derive(Parser, Debug)]
#[command(name = "hero")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bot; stdin lines are chat messages, replies go to stdout
    Start {
        /// Config file to load instead of searching for hero.toml
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Config profile (test or prod); defaults to HERO_PROFILE
        #[arg(short, long)]
        profile: Option<Profile>,
    },

    /// Create a new extension crate skeleton
    Extension {
        /// Extension name (lowercase letters, digits and '_')
        name: String,

        /// Directory the extension crate is created in
        #[arg(long, default_value = "extensions")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start { config, profile } => {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    eprintln!("error: failed to start the async runtime: {e}");
                    return ExitCode::FAILURE;
                }
            };
            let result = runtime.block_on(commands::start::run(config.as_deref(), profile));
            // The stdin reader may still be parked in a blocking read.
            runtime.shutdown_background();
            result
        }
        Commands::Extension { name, dir } => commands::extension::run(&name, &dir),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_options() {
        let cli = Cli::try_parse_from(["hero", "start", "-c", "bot.toml", "--profile", "test"])
            .unwrap();
        match cli.command {
            Commands::Start { config, profile } => {
                assert_eq!(config, Some(PathBuf::from("bot.toml")));
                assert_eq!(profile, Some(Profile::Test));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn extension_dir_defaults() {
        let cli = Cli::try_parse_from(["hero", "extension", "music"]).unwrap();
        match cli.command {
            Commands::Extension { name, dir } => {
                assert_eq!(name, "music");
                assert_eq!(dir, PathBuf::from("extensions"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_profile_is_rejected() {
        assert!(Cli::try_parse_from(["hero", "start", "--profile", "staging"]).is_err());
    }
}
