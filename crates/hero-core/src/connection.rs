//! Connection state shared between the gateway and the framework.
//!
//! The gateway drives the [`ConnectionMonitor`]; the framework observes it to
//! delay background tasks until the bot is ready and to restart them after a
//! reconnect.
//!
//! ```text
//! Connecting ──► Ready ──► Disconnected ──► Ready ──► ...
//!      │           │             │
//!      └───────────┴─────────────┴──► Closed   (terminal)
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

/// Observable state of the gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected yet.
    Connecting,
    /// Connected and ready to receive events.
    Ready,
    /// The connection dropped unexpectedly; a reconnect is expected.
    Disconnected,
    /// The connection was closed on purpose. Terminal.
    Closed,
}

/// Cheaply cloneable handle over the current [`ConnectionState`].
#[derive(Debug, Clone)]
pub struct ConnectionMonitor {
    state: Arc<watch::Sender<ConnectionState>>,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMonitor {
    /// Creates a monitor in the [`ConnectionState::Connecting`] state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Connecting);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Marks the connection as ready (initial connect or resume).
    pub fn mark_ready(&self) {
        self.transition(ConnectionState::Ready);
    }

    /// Marks an unexpected disconnect.
    pub fn mark_disconnected(&self) {
        self.transition(ConnectionState::Disconnected);
    }

    /// Marks a deliberate close. No further transitions are accepted.
    pub fn mark_closed(&self) {
        self.transition(ConnectionState::Closed);
    }

    fn transition(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == ConnectionState::Closed || *current == next {
                return false;
            }
            debug!(from = ?*current, to = ?next, "Connection state changed");
            *current = next;
            true
        });
    }

    /// Suspends until the connection is ready.
    ///
    /// Returns `false` if the connection was closed instead.
    pub async fn wait_until_ready(&self) -> bool {
        let mut rx = self.state.subscribe();
        match rx
            .wait_for(|s| matches!(s, ConnectionState::Ready | ConnectionState::Closed))
            .await
        {
            Ok(state) => *state == ConnectionState::Ready,
            Err(_) => false,
        }
    }

    /// Suspends until the connection is lost, returning the state that ended
    /// it ([`Disconnected`](ConnectionState::Disconnected) or
    /// [`Closed`](ConnectionState::Closed)).
    pub async fn wait_for_disconnect(&self) -> ConnectionState {
        let mut rx = self.state.subscribe();
        match rx
            .wait_for(|s| {
                matches!(
                    s,
                    ConnectionState::Disconnected | ConnectionState::Closed
                )
            })
            .await
        {
            Ok(state) => *state,
            Err(_) => ConnectionState::Closed,
        }
    }

    /// Subscribes to raw state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}
