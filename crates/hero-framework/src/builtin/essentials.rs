//! The `essentials` extension.
//!
//! Always loaded first by the runtime. Provides:
//!
//! | Command | Who | Effect |
//! |---------|-----|--------|
//! | `ping` | anyone | replies with the handling latency |
//! | `help [command…]` | anyone | overview, or help for one command or group |
//! | `set prefixes <p>…` | owners | replaces the command prefixes |
//! | `set description <text>` | owners | replaces the bot description |
//! | `set status [text]` | owners | sets (or clears) the status text |
//! | `register` | anyone | opts the author in to data storage |
//! | `unregister` | anyone | deletes the author's data and opts out |
//!
//! It also counts completed commands per registered user.

use std::sync::Arc;

use hero_core::{Lookup, MessagePayload, UserRecord, names};
use linkme::distributed_slice;
use tower::BoxError;

use crate::catalog::BUNDLED_EXTENSIONS;
use crate::cog::CogBuilder;
use crate::command::check::owner_only;
use crate::command::help::{command_help, group_help, overview};
use crate::command::CommandSpec;
use crate::context::Context;
use crate::core::Core;
use crate::error::CommandError;
use crate::extension::{ExtensionDescriptor, ExtensionSetup};
use crate::extractor::{Args, Db, RawArgs};

pub const NAME: &str = "essentials";

pub const DESCRIPTOR: ExtensionDescriptor = ExtensionDescriptor::new(NAME)
    .description("Basic commands every bot needs")
    .cogs(&[essentials_cog]);

#[distributed_slice(BUNDLED_EXTENSIONS)]
static ESSENTIALS: ExtensionDescriptor = DESCRIPTOR;

struct Essentials;

fn essentials_cog(_: &ExtensionSetup) -> CogBuilder {
    CogBuilder::of::<Essentials>()
        .command(CommandSpec::new("ping", ping).help("Calculates the ping time."))
        .command(
            CommandSpec::new("help", help).help("Shows help for a command, or lists all commands."),
        )
        .command(
            CommandSpec::new("set_prefixes", set_prefixes)
                .help("Replaces the command prefixes.")
                .check(owner_only()),
        )
        .command(
            CommandSpec::new("set_description", set_description)
                .help("Replaces the bot description.")
                .check(owner_only()),
        )
        .command(
            CommandSpec::new("set_status", set_status)
                .help("Sets the status text; without text the status is cleared.")
                .check(owner_only()),
        )
        .command(CommandSpec::new("register", register).help("Registers you in my system."))
        .command(CommandSpec::new("unregister", unregister).help("Removes you from my system."))
        .listener(names::COMMAND_COMPLETION, count_command)
}

// =============================================================================
// General
// =============================================================================

async fn ping(ctx: Arc<Context>) -> String {
    format!("Pong.\nTime: {}ms", ctx.elapsed().as_millis())
}

async fn help(ctx: Arc<Context>, Args(path): Args) -> String {
    let core = ctx.core();
    if path.is_empty() {
        let roots = core.registry().commands().children(&[]);
        return overview(&core.description(), &ctx.prefix(), &roots);
    }

    let registry = core.registry();
    match registry.resolve(&path) {
        Some(resolved) if resolved.depth == path.len() => {
            if resolved.command.is_group() {
                group_help(&resolved.command, &resolved.children)
            } else {
                command_help(&resolved.command)
            }
        }
        _ => format!("No command called \"{}\" found.", path.join(" ")),
    }
}

// =============================================================================
// Presence (owners only)
// =============================================================================

async fn set_prefixes(core: Arc<Core>, Args(prefixes): Args) -> Result<&'static str, BoxError> {
    if prefixes.is_empty() {
        return Err(CommandError::InvalidInput("at least one prefix is required".into()).into());
    }
    core.set_prefixes(prefixes).await?;
    Ok("Done.")
}

async fn set_description(core: Arc<Core>, RawArgs(description): RawArgs) -> Result<&'static str, BoxError> {
    if description.trim().is_empty() {
        return Err(CommandError::InvalidInput("a description is required".into()).into());
    }
    core.set_description(description.trim()).await?;
    Ok("Done.")
}

async fn set_status(core: Arc<Core>, RawArgs(status): RawArgs) -> Result<&'static str, BoxError> {
    let status = status.trim();
    core.set_status((!status.is_empty()).then(|| status.to_string()))
        .await?;
    Ok("Done.")
}

// =============================================================================
// Registration
// =============================================================================

async fn register(ctx: Arc<Context>, Db(db): Db, message: MessagePayload) -> Result<String, BoxError> {
    let user_id = message.author.id;
    match db.wrap_user(user_id).await? {
        Lookup::Found(_) => return Ok("You are already registered in my system!".to_string()),
        Lookup::NotFound | Lookup::Inactive(_) => db.save_user(UserRecord::new(user_id)).await?,
    }
    Ok(format!(
        "You are now registered. Thank you for using my commands and functions!\n\n\
         If you ever change your mind, just use `{}unregister` to remove yourself from my system, \
         which will irreversibly and immediately delete all data related to your Discord ID from my system.",
        ctx.prefix()
    ))
}

async fn unregister(ctx: Arc<Context>, Db(db): Db, message: MessagePayload) -> Result<String, BoxError> {
    let user_id = message.author.id;
    match db.wrap_user(user_id).await? {
        Lookup::Found(_) => {
            db.delete_user(user_id).await?;
        }
        Lookup::NotFound => {
            // Remember the opt-out so later lookups report the user as inactive.
            let mut user = UserRecord::new(user_id);
            user.is_active = false;
            db.save_user(user).await?;
        }
        Lookup::Inactive(_) => return Ok("You are already unregistered!".to_string()),
    }
    Ok(format!(
        "You have been successfully removed from my system! You will have to use `{}register` \
         if you change your mind to enable storing data related to your Discord user ID again.",
        ctx.prefix()
    ))
}

async fn count_command(Db(db): Db, message: MessagePayload) -> Result<(), BoxError> {
    if let Lookup::Found(mut user) = db.wrap_user(message.author.id).await? {
        user.command_count += 1;
        db.save_user(user).await?;
    }
    Ok(())
}
