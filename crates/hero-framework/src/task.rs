//! Background task supervision.
//!
//! Every task runs under a supervisor that ties it to the gateway connection:
//!
//! ```text
//!            ┌──────────────── resume predicate holds ───────────────┐
//!            ▼                                                        │
//! spawn ──► wait for ready ──► run body ──► disconnect ──────────────┤
//!                │                │                                   │
//!                │ closed         ├─► body returns        ──► done    └─► no predicate
//!                ▼                │                                       / closed ──► done
//!              done               └─► cancelled (unload) ──► body may clean up, then done
//! ```
//!
//! Cancellation is cooperative: a cancelled body keeps being polled so it can
//! observe [`TaskContext::cancelled`] and clean up. [`TaskHandle::shutdown`]
//! aborts it once the grace period runs out.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use hero_core::{ConnectionMonitor, ConnectionState};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tower::BoxError;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::cog::CogHandle;
use crate::command::Owner;
use crate::core::Core;
use crate::handler::service::panic_message;

type TaskBody = Arc<dyn Fn(TaskContext) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;
type ResumePredicate = Arc<dyn Fn() -> bool + Send + Sync>;

// =============================================================================
// TaskOutput
// =============================================================================

/// Return values accepted from task bodies.
pub trait TaskOutput: Send + 'static {
    fn into_result(self) -> Result<(), BoxError>;
}

impl TaskOutput for () {
    fn into_result(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E: Into<BoxError> + Send + 'static> TaskOutput for Result<(), E> {
    fn into_result(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

// =============================================================================
// TaskSpec
// =============================================================================

/// Declaration of a background task.
#[derive(Clone)]
pub struct TaskSpec {
    name: String,
    body: TaskBody,
    unique: bool,
    resume: Option<ResumePredicate>,
}

impl std::fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("unique", &self.unique)
            .field("resumes", &self.resume.is_some())
            .finish()
    }
}

impl TaskSpec {
    /// A unique task that is cancelled for good on disconnect.
    pub fn new<F, Fut, R>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: TaskOutput,
    {
        Self {
            name: name.into(),
            body: Arc::new(move |ctx| body(ctx).map(TaskOutput::into_result).boxed()),
            unique: true,
            resume: None,
        }
    }

    /// With `unique` (the default) a second registration under the same name
    /// is a no-op while the first one is still running.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Restarts the task after a reconnect whenever `predicate` holds at the
    /// time of the disconnect.
    pub fn resume_when<P>(mut self, predicate: P) -> Self
    where
        P: Fn() -> bool + Send + Sync + 'static,
    {
        self.resume = Some(Arc::new(predicate));
        self
    }

    /// Restarts the task after every unexpected disconnect.
    pub fn resume_always(self) -> Self {
        self.resume_when(|| true)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn resumes(&self) -> bool {
        self.resume.is_some()
    }
}

// =============================================================================
// TaskContext
// =============================================================================

/// Handed to each run of a task body.
#[derive(Clone)]
pub struct TaskContext {
    core: Arc<Core>,
    name: Arc<str>,
    owner: Option<Owner>,
    cancel: CancellationToken,
    run: u32,
}

impl TaskContext {
    pub fn core(&self) -> &Arc<Core> {
        &self.core
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning extension, if any.
    pub fn extension(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.extension.as_str())
    }

    pub fn cog(&self) -> Option<&Arc<CogHandle>> {
        self.owner.as_ref().and_then(|o| o.cog.as_ref())
    }

    /// The owning cog's state.
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.cog().and_then(|c| c.state::<T>())
    }

    /// Resolves once the task has been cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 0 for the first run, incremented on every resume.
    pub fn run(&self) -> u32 {
        self.run
    }
}

// =============================================================================
// TaskHandle
// =============================================================================

/// Handle to a supervised task.
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    extension: Option<String>,
    cancel: CancellationToken,
    join: Mutex<Option<JoinHandle<()>>>,
    restarts: Arc<AtomicU32>,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Returns `true` once the supervisor has exited.
    pub fn is_finished(&self) -> bool {
        self.join
            .lock()
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// How many times the task was restarted after a reconnect.
    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }

    /// Signals cancellation without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels the task and waits up to `grace` for it to finish, aborting it
    /// afterwards.
    pub async fn shutdown(&self, grace: Duration) {
        self.cancel.cancel();
        let Some(mut join) = self.join.lock().take() else {
            return;
        };
        if tokio::time::timeout(grace, &mut join).await.is_err() {
            warn!(task = %self.name, grace_ms = grace.as_millis() as u64, "Task ignored cancellation, aborting");
            join.abort();
            let _ = join.await;
        }
    }
}

// =============================================================================
// Supervisor
// =============================================================================

enum Interrupt {
    Finished(std::thread::Result<Result<(), BoxError>>),
    Cancelled,
    Lost(ConnectionState),
}

/// Schedules `spec` under a supervisor and returns its handle.
pub(crate) fn spawn(core: &Arc<Core>, spec: TaskSpec, owner: Option<Owner>) -> Arc<TaskHandle> {
    let cancel = CancellationToken::new();
    let restarts = Arc::new(AtomicU32::new(0));
    let span = info_span!(
        "task",
        task = %spec.name,
        extension = owner.as_ref().map(|o| o.extension.as_str()).unwrap_or("-"),
    );
    let handle = Arc::new(TaskHandle {
        name: spec.name.clone(),
        extension: owner.as_ref().map(|o| o.extension.clone()),
        cancel: cancel.clone(),
        join: Mutex::new(None),
        restarts: Arc::clone(&restarts),
    });

    let ctx = TaskContext {
        core: Arc::clone(core),
        name: Arc::from(spec.name.as_str()),
        owner,
        cancel,
        run: 0,
    };
    let monitor = core.monitor().clone();
    let join = tokio::spawn(supervise(spec, ctx, monitor, restarts).instrument(span));
    *handle.join.lock() = Some(join);
    handle
}

async fn supervise(
    spec: TaskSpec,
    mut ctx: TaskContext,
    monitor: ConnectionMonitor,
    restarts: Arc<AtomicU32>,
) {
    let cancel = ctx.cancel.clone();
    loop {
        let ready = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            ready = monitor.wait_until_ready() => ready,
        };
        if !ready {
            debug!("Connection closed before the task could start");
            return;
        }

        debug!(run = ctx.run, "Task started");
        let body = AssertUnwindSafe((spec.body)(ctx.clone())).catch_unwind();
        tokio::pin!(body);

        let interrupt = tokio::select! {
            biased;
            out = &mut body => Interrupt::Finished(out),
            _ = cancel.cancelled() => Interrupt::Cancelled,
            state = monitor.wait_for_disconnect() => Interrupt::Lost(state),
        };

        match interrupt {
            Interrupt::Finished(out) => {
                report(out);
                return;
            }
            Interrupt::Cancelled => {
                debug!("Task cancelled, waiting for it to wind down");
                report(body.await);
                return;
            }
            Interrupt::Lost(state) => {
                let resume = state != ConnectionState::Closed
                    && spec.resume.as_ref().is_some_and(|predicate| predicate());
                if !resume {
                    info!(?state, "Task stopped on disconnect");
                    return;
                }
                info!("Task interrupted by disconnect, resuming once ready");
                restarts.fetch_add(1, Ordering::SeqCst);
                ctx.run += 1;
            }
        }
    }
}

fn report(out: std::thread::Result<Result<(), BoxError>>) {
    match out {
        Ok(Ok(())) => debug!("Task finished"),
        Ok(Err(e)) => error!(error = %e, "Task failed"),
        Err(payload) => error!(panic = %panic_message(payload.as_ref()), "Task panicked"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::testing::TestBot;

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn counting(starts: &Arc<AtomicUsize>) -> impl Fn(TaskContext) -> BoxFuture<'static, ()> + Send + Sync + 'static {
        let starts = Arc::clone(starts);
        move |_ctx| {
            let starts = Arc::clone(&starts);
            async move {
                starts.fetch_add(1, Ordering::SeqCst);
                futures::future::pending::<()>().await;
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn task_waits_for_ready() {
        let bot = TestBot::disconnected();
        let starts = Arc::new(AtomicUsize::new(0));
        let handle = spawn(&bot.core, TaskSpec::new("do_wait", counting(&starts)), None);

        settle().await;
        assert_eq!(starts.load(Ordering::SeqCst), 0);

        bot.core.monitor().mark_ready();
        settle().await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        handle.shutdown(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn resumable_task_restarts_after_reconnect() {
        let bot = TestBot::new();
        let starts = Arc::new(AtomicUsize::new(0));
        let spec = TaskSpec::new("do_poll", counting(&starts)).resume_always();
        let handle = spawn(&bot.core, spec, None);
        settle().await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        bot.core.monitor().mark_disconnected();
        settle().await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(!handle.is_finished());

        bot.core.monitor().mark_ready();
        settle().await;
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        assert_eq!(handle.restarts(), 1);
        handle.shutdown(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn task_without_predicate_stops_on_disconnect() {
        let bot = TestBot::new();
        let starts = Arc::new(AtomicUsize::new(0));
        let handle = spawn(&bot.core, TaskSpec::new("do_once", counting(&starts)), None);
        settle().await;

        bot.core.monitor().mark_disconnected();
        settle().await;
        assert!(handle.is_finished());

        bot.core.monitor().mark_ready();
        settle().await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closing_the_connection_never_resumes() {
        let bot = TestBot::new();
        let starts = Arc::new(AtomicUsize::new(0));
        let handle = spawn(
            &bot.core,
            TaskSpec::new("do_poll", counting(&starts)).resume_always(),
            None,
        );
        settle().await;

        bot.core.monitor().mark_closed();
        settle().await;
        assert!(handle.is_finished());
        assert_eq!(handle.restarts(), 0);
    }

    #[tokio::test]
    async fn cooperative_task_cleans_up_on_cancel() {
        let bot = TestBot::new();
        let cleaned = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&cleaned);
        let spec = TaskSpec::new("do_cleanup", move |ctx: TaskContext| {
            let flag = Arc::clone(&flag);
            async move {
                ctx.cancelled().await;
                flag.fetch_add(1, Ordering::SeqCst);
            }
        });
        let handle = spawn(&bot.core, spec, None);
        settle().await;

        handle.shutdown(Duration::from_secs(1)).await;
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_task_is_aborted_after_grace() {
        let bot = TestBot::new();
        let starts = Arc::new(AtomicUsize::new(0));
        let handle = spawn(&bot.core, TaskSpec::new("do_stubborn", counting(&starts)), None);
        settle().await;

        // Paused time auto-advances past the grace period.
        handle.shutdown(Duration::from_secs(5)).await;
        assert!(handle.is_finished());
    }
}
