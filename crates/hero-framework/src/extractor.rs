//! Handler parameter extraction.
//!
//! Every handler parameter implements [`FromContext`]. Extraction is
//! synchronous: everything a handler can ask for is already on the
//! [`Context`] or reachable through the core.
//!
//! ```rust,ignore
//! async fn kick(
//!     Args(args): Args,
//!     State(moderation): State<Moderation>,
//!     Settings(settings): Settings,
//! ) -> Result<String, BoxError> {
//!     // …
//! }
//! ```

use std::ops::Deref;
use std::sync::Arc;

use hero_core::{Cache, MessagePayload, Store};
use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::core::Core;
use crate::error::{ExtractError, ExtractResult};
use crate::extension::SettingsHandle;

/// A type that can be extracted from a [`Context`].
pub trait FromContext: Sized {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self>;
}

impl<T: FromContext> FromContext for Option<T> {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        Ok(T::from_context(ctx).ok())
    }
}

impl FromContext for Arc<Context> {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        Ok(Arc::clone(ctx))
    }
}

impl FromContext for Arc<Core> {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        Ok(Arc::clone(ctx.core()))
    }
}

/// The triggering chat message.
impl FromContext for MessagePayload {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        ctx.message().cloned().ok_or(ExtractError::NotAMessage)
    }
}

// =============================================================================
// Command arguments
// =============================================================================

/// Command arguments after shell-style splitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args(pub Vec<String>);

impl Deref for Args {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

impl FromContext for Args {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        ctx.invocation()
            .map(|i| Args(i.args.clone()))
            .ok_or(ExtractError::NotACommand)
    }
}

/// Everything after the command name, verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArgs(pub String);

impl Deref for RawArgs {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl FromContext for RawArgs {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        ctx.invocation()
            .map(|i| RawArgs(i.raw_args.clone()))
            .ok_or(ExtractError::NotACommand)
    }
}

/// Arguments parsed by a clap parser.
///
/// A parse failure is a user error: the invoker gets "Invalid input." and the
/// command help.
#[cfg(feature = "command")]
#[derive(Debug, Clone)]
pub struct Parsed<T>(pub T);

#[cfg(feature = "command")]
impl<T> Deref for Parsed<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

#[cfg(feature = "command")]
impl<T: clap::Parser> FromContext for Parsed<T> {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        let invocation = ctx.invocation().ok_or(ExtractError::NotACommand)?;
        let argv = std::iter::once(invocation.invoked_with.as_str())
            .chain(invocation.args.iter().map(String::as_str));
        T::try_parse_from(argv)
            .map(Parsed)
            .map_err(|e| ExtractError::InvalidArguments(e.to_string()))
    }
}

// =============================================================================
// Event payload
// =============================================================================

/// The event's JSON payload decoded as `T`.
#[derive(Debug, Clone)]
pub struct Payload<T>(pub T);

impl<T> Deref for Payload<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: DeserializeOwned> FromContext for Payload<T> {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        serde_json::from_value(ctx.event().payload.clone())
            .map(Payload)
            .map_err(|e| ExtractError::Payload {
                ty: std::any::type_name::<T>(),
                message: e.to_string(),
            })
    }
}

// =============================================================================
// Extension resources
// =============================================================================

/// State of the cog the handler belongs to.
pub struct State<T: ?Sized>(pub Arc<T>);

impl<T: ?Sized> Deref for State<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Send + Sync + 'static> FromContext for State<T> {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        ctx.state::<T>()
            .map(State)
            .ok_or(ExtractError::MissingState(std::any::type_name::<T>()))
    }
}

/// Persisted settings of the handler's extension.
#[derive(Debug, Clone)]
pub struct Settings(pub SettingsHandle);

impl Deref for Settings {
    type Target = SettingsHandle;

    fn deref(&self) -> &SettingsHandle {
        &self.0
    }
}

impl FromContext for Settings {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        let name = ctx.extension_name().ok_or(ExtractError::NotACommand)?;
        ctx.core()
            .get_settings(name)
            .map(Settings)
            .ok_or_else(|| ExtractError::MissingSettings(name.to_string()))
    }
}

/// Controller of the handler's extension.
pub struct Controller<T>(pub Arc<T>);

impl<T> Deref for Controller<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Send + Sync + 'static> FromContext for Controller<T> {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        ctx.extension()
            .and_then(|ext| ext.controller::<T>())
            .map(Controller)
            .ok_or(ExtractError::MissingController(std::any::type_name::<T>()))
    }
}

/// Cache namespace of the handler's extension, or the root namespace for
/// core-level handlers.
#[derive(Debug, Clone)]
pub struct ExtCache(pub Cache);

impl Deref for ExtCache {
    type Target = Cache;

    fn deref(&self) -> &Cache {
        &self.0
    }
}

impl FromContext for ExtCache {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        let cache = match ctx.extension() {
            Some(ext) => ext.cache().clone(),
            None => ctx.core().cache().clone(),
        };
        Ok(ExtCache(cache))
    }
}

/// The handler's extension config section decoded as `T`.
///
/// A missing or malformed section yields `T::default()`.
#[derive(Debug, Clone)]
pub struct ExtensionConfig<T>(pub T);

impl<T> Deref for ExtensionConfig<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: DeserializeOwned + Default> FromContext for ExtensionConfig<T> {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        let value = match ctx.extension_name() {
            Some(name) => ctx.core().config().extension_config(name),
            None => return Ok(ExtensionConfig(T::default())),
        };
        Ok(ExtensionConfig(serde_json::from_value(value).unwrap_or_default()))
    }
}

/// The persistence layer.
#[derive(Clone)]
pub struct Db(pub Arc<dyn Store>);

impl Deref for Db {
    type Target = dyn Store;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl FromContext for Db {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        Ok(Db(Arc::clone(ctx.core().store())))
    }
}
