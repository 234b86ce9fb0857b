//! Invocation checks.
//!
//! A [`Check`] runs before the command body; any check returning an error
//! stops the invocation. Cog-level checks are prepended to every command of
//! the cog.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use hero_core::Lookup;

use crate::context::Context;
use crate::error::{CommandError, CommandResult};

type CheckFn = Arc<dyn Fn(Arc<Context>) -> BoxFuture<'static, CommandResult<()>> + Send + Sync>;

/// A named, possibly asynchronous precondition of a command.
#[derive(Clone)]
pub struct Check {
    name: String,
    f: CheckFn,
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Check").field(&self.name).finish()
    }
}

impl Check {
    /// A check from a synchronous predicate; `false` fails with
    /// [`CommandError::CheckFailed`].
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        let label = name.clone();
        Self {
            name,
            f: Arc::new(move |ctx| {
                let result = if predicate(&ctx) {
                    Ok(())
                } else {
                    Err(CommandError::check_failed(label.clone()))
                };
                futures::future::ready(result).boxed()
            }),
        }
    }

    /// A check from an async function choosing its own error.
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(move |ctx| f(ctx).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(&self, ctx: Arc<Context>) -> CommandResult<()> {
        (self.f)(ctx).await
    }
}

/// Only users listed in `bot.owner_ids` pass.
pub fn owner_only() -> Check {
    Check::new("owner_only", |ctx| {
        ctx.author_id()
            .is_some_and(|id| ctx.core().config().is_owner(id))
    })
}

/// Bot owners and users whose stored record is flagged `is_staff` pass.
///
/// Deactivated and unknown users fail; a store error aborts the invocation
/// as a handler error.
pub fn staff_only() -> Check {
    Check::from_fn("staff_only", |ctx: Arc<Context>| async move {
        let Some(id) = ctx.author_id() else {
            return Err(CommandError::check_failed("staff_only"));
        };
        if ctx.core().config().is_owner(id) {
            return Ok(());
        }
        match ctx.core().store().wrap_user(id).await {
            Ok(Lookup::Found(user)) if user.is_staff => Ok(()),
            Ok(_) => Err(CommandError::check_failed("staff_only")),
            Err(e) => Err(CommandError::Handler(e.into())),
        }
    })
}

/// Only passes while the bot runs with the test profile.
pub fn test_only() -> Check {
    Check::new("test_only", |ctx| ctx.core().config().test_mode)
}

/// Rejects invocations from direct messages.
pub fn guild_only() -> Check {
    Check::from_fn("guild_only", |ctx: Arc<Context>| async move {
        match ctx.message() {
            Some(message) if message.is_direct() => Err(CommandError::NoPrivateMessage),
            _ => Ok(()),
        }
    })
}
