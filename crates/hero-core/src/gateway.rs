//! The gateway collaborator: inbound event stream and outbound sends.
//!
//! A [`Gateway`] is handed an [`EventSink`] and the shared
//! [`ConnectionMonitor`] when connected. It pushes every platform event into
//! the sink and keeps the monitor in sync with its connection; the runtime
//! drains the matching [`EventStream`] and forwards events to the dispatcher.
//!
//! # Example
//!
//! ```rust,ignore
//! let (sink, mut stream) = EventSink::channel();
//! gateway.clone().connect(sink, monitor.clone()).await?;
//! while let Some(event) = stream.next().await {
//!     dispatcher.dispatch(event).await;
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::connection::ConnectionMonitor;
use crate::error::{GatewayError, GatewayResult};
use crate::event::{GatewayEvent, OutgoingMessage};

// =============================================================================
// Event channel
// =============================================================================

/// Sending half of the inbound event channel, owned by the gateway.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

/// Receiving half of the inbound event channel, owned by the runtime.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<GatewayEvent>,
}

impl EventSink {
    /// Creates a connected sink/stream pair.
    pub fn channel() -> (EventSink, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSink { tx }, EventStream { rx })
    }

    /// Pushes an event towards the dispatcher.
    ///
    /// Fails with [`GatewayError::Closed`] once the stream has been dropped.
    pub fn emit(&self, event: GatewayEvent) -> GatewayResult<()> {
        trace!(event = %event.name, "Gateway event received");
        self.tx.send(event).map_err(|_| GatewayError::Closed)
    }
}

impl EventStream {
    /// Waits for the next event; `None` once every sink is dropped.
    pub async fn next(&mut self) -> Option<GatewayEvent> {
        self.rx.recv().await
    }
}

// =============================================================================
// Gateway trait
// =============================================================================

/// A connection to the chat platform.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Starts the connection.
    ///
    /// Implementations spawn their own receive loop and return once the
    /// connection attempt has been started; readiness is reported through
    /// `monitor`.
    async fn connect(
        self: Arc<Self>,
        sink: EventSink,
        monitor: ConnectionMonitor,
    ) -> GatewayResult<()>;

    /// Posts a message to the platform.
    async fn send(&self, message: OutgoingMessage) -> GatewayResult<()>;

    /// Closes the connection for good.
    async fn close(&self) -> GatewayResult<()>;
}

/// Shared gateway handle.
pub type BoxedGateway = Arc<dyn Gateway>;

// =============================================================================
// Dispatcher trait
// =============================================================================

/// Consumer of inbound events, implemented by the framework.
///
/// The runtime calls [`Dispatcher::dispatch`] once per event drained from the
/// [`EventStream`]. Implementations must not wait for handlers to finish;
/// returning means the event has been routed, not that it has been handled.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, event: GatewayEvent);
}

// =============================================================================
// RecordingGateway
// =============================================================================

/// An in-process gateway that records every outbound message.
///
/// Useful for tests and for driving the framework without a platform
/// connection: events are injected through [`RecordingGateway::inject`].
#[derive(Debug, Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<OutgoingMessage>>,
    sink: Mutex<Option<EventSink>>,
    monitor: Mutex<Option<ConnectionMonitor>>,
}

impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a copy of every message sent so far.
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().clone()
    }

    /// Returns only the message contents, in send order.
    pub fn sent_contents(&self) -> Vec<String> {
        self.sent.lock().iter().map(|m| m.content.clone()).collect()
    }

    /// Forgets all recorded messages.
    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    /// Injects an inbound event as if the platform had sent it.
    pub fn inject(&self, event: GatewayEvent) -> GatewayResult<()> {
        match self.sink.lock().as_ref() {
            Some(sink) => sink.emit(event),
            None => Err(GatewayError::Closed),
        }
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    fn name(&self) -> &str {
        "recording"
    }

    async fn connect(
        self: Arc<Self>,
        sink: EventSink,
        monitor: ConnectionMonitor,
    ) -> GatewayResult<()> {
        *self.sink.lock() = Some(sink);
        monitor.mark_ready();
        *self.monitor.lock() = Some(monitor);
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> GatewayResult<()> {
        self.sent.lock().push(message);
        Ok(())
    }

    async fn close(&self) -> GatewayResult<()> {
        self.sink.lock().take();
        if let Some(monitor) = self.monitor.lock().take() {
            monitor.mark_closed();
        }
        Ok(())
    }
}
