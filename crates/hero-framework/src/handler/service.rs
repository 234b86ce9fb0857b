//! Tower services wrapping handlers.
//!
//! [`HandlerService<H, T>`] adapts a single [`Handler`] to
//! `tower::Service<Arc<Context>>`. [`CatchPanicLayer`] is stacked on top so
//! a panicking handler becomes [`CommandError::Panicked`] instead of taking
//! the dispatcher task down, and the result is type-erased into a
//! [`BoxedService`] that commands, listeners and groups store.

use std::any::Any;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

use super::traits::Handler;
use crate::context::Context;
use crate::error::{CommandError, CommandResult};

/// Type-erased, cloneable handler service.
pub type BoxedService = BoxCloneSyncService<Arc<Context>, (), CommandError>;

// ============================================================================
// HandlerService
// ============================================================================

/// A tower [`Service`] that calls a single generic handler.
pub struct HandlerService<H, T> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<H, T> HandlerService<H, T> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<H: Clone, T> Clone for HandlerService<H, T> {
    fn clone(&self) -> Self {
        HandlerService {
            handler: self.handler.clone(),
            _marker: PhantomData,
        }
    }
}

impl<H, T> Service<Arc<Context>> for HandlerService<H, T>
where
    H: Handler<T>,
{
    type Response = ();
    type Error = CommandError;
    type Future = BoxFuture<'static, CommandResult<()>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<Context>) -> Self::Future {
        let handler = self.handler.clone();
        handler.call(ctx)
    }
}

// ============================================================================
// CatchPanic
// ============================================================================

/// Layer converting handler panics into [`CommandError::Panicked`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CatchPanicLayer;

impl<S> Layer<S> for CatchPanicLayer {
    type Service = CatchPanic<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CatchPanic { inner }
    }
}

/// Service produced by [`CatchPanicLayer`].
#[derive(Debug, Clone)]
pub struct CatchPanic<S> {
    inner: S,
}

impl<S> Service<Arc<Context>> for CatchPanic<S>
where
    S: Service<Arc<Context>, Response = (), Error = CommandError>,
    S::Future: Send + 'static,
{
    type Response = ();
    type Error = CommandError;
    type Future = BoxFuture<'static, CommandResult<()>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, ctx: Arc<Context>) -> Self::Future {
        let fut = self.inner.call(ctx);
        async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(CommandError::Panicked(panic_message(payload.as_ref()))),
            }
        }
        .boxed()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Wraps `handler` into the [`BoxedService`] stored by commands and
/// listeners.
pub fn into_service<H, T>(handler: H) -> BoxedService
where
    H: Handler<T>,
    T: Send + 'static,
{
    BoxCloneSyncService::new(CatchPanicLayer.layer(HandlerService::new(handler)))
}
