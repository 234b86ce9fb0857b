//! The [`Handler`] trait and handler return values.
//!
//! Handlers are plain async functions. Every parameter is extracted from the
//! invocation [`Context`] through [`FromContext`]; the return value is
//! processed by [`HandlerResponse`].
//!
//! ```rust,ignore
//! // No parameters, no reply
//! async fn noop() {}
//!
//! // Replies with the returned string
//! async fn echo(RawArgs(text): RawArgs) -> String {
//!     text
//! }
//!
//! // Errors are reported to the user and logged
//! async fn stats(db: Db, msg: MessagePayload) -> Result<String, BoxError> {
//!     let user = db.wrap_user(msg.author.id).await?;
//!     Ok(format!("{user:?}"))
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tower::BoxError;

use crate::context::Context;
use crate::error::{CommandError, CommandResult};
use crate::extractor::FromContext;

// ============================================================================
// HandlerResponse
// ============================================================================

/// A trait for types that can be returned from handlers.
#[async_trait]
pub trait HandlerResponse: Send + 'static {
    /// Performs the response's side effects (e.g. sending a reply).
    async fn process_response(self, ctx: &Context) -> CommandResult<()>;
}

/// `()` - no response needed.
#[async_trait]
impl HandlerResponse for () {
    async fn process_response(self, _ctx: &Context) -> CommandResult<()> {
        Ok(())
    }
}

/// `String` - replied to the invoking channel.
#[async_trait]
impl HandlerResponse for String {
    async fn process_response(self, ctx: &Context) -> CommandResult<()> {
        ctx.reply(self)
            .await
            .map_err(|e| CommandError::Handler(Box::new(e)))
    }
}

#[async_trait]
impl HandlerResponse for &'static str {
    async fn process_response(self, ctx: &Context) -> CommandResult<()> {
        self.to_string().process_response(ctx).await
    }
}

/// `Option<T>` - `None` sends nothing.
#[async_trait]
impl<T: HandlerResponse> HandlerResponse for Option<T> {
    async fn process_response(self, ctx: &Context) -> CommandResult<()> {
        match self {
            Some(t) => t.process_response(ctx).await,
            None => Ok(()),
        }
    }
}

/// `Result<T, E>` - `Err` becomes a [`CommandError`].
#[async_trait]
impl<T, E> HandlerResponse for Result<T, E>
where
    T: HandlerResponse,
    E: Into<BoxError> + Send + 'static,
{
    async fn process_response(self, ctx: &Context) -> CommandResult<()> {
        match self {
            Ok(t) => t.process_response(ctx).await,
            Err(e) => Err(CommandError::from_boxed(e.into())),
        }
    }
}

// ============================================================================
// Handler
// ============================================================================

/// An async function usable as a command, listener or group callback.
///
/// Implemented for `async fn`s and closures taking up to twelve
/// [`FromContext`] parameters and returning a [`HandlerResponse`].
#[async_trait]
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// Extracts the parameters, runs the function and processes its result.
    async fn call(self, ctx: Arc<Context>) -> CommandResult<()>;
}

macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case)]
        #[async_trait]
        impl<F, Fut, Res, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Res> + Send + 'static,
            Res: HandlerResponse,
            $( $ty: FromContext + Send + 'static, )*
        {
            async fn call(self, ctx: Arc<Context>) -> CommandResult<()> {
                $(
                    let $ty = $ty::from_context(&ctx)?;
                )*

                let res = (self)($($ty,)*).await;
                res.process_response(&ctx).await
            }
        }
    };
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);
