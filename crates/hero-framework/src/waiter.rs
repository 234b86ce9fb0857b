//! One-shot waiters for follow-up messages.
//!
//! A handler that needs an answer from the user registers a waiter and
//! suspends; the dispatcher offers every inbound message to the pending
//! waiters before routing it, and the first waiter whose filter accepts the
//! message receives a copy. The message is still dispatched normally.

use std::time::Duration;

use hero_core::MessagePayload;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

type MessageFilter = Box<dyn Fn(&MessagePayload) -> bool + Send + Sync>;

struct Waiter {
    channel_id: u64,
    author_id: u64,
    filter: MessageFilter,
    tx: oneshot::Sender<MessagePayload>,
}

/// Pending waiters of one [`Core`](crate::Core).
#[derive(Default)]
pub struct Waiters {
    pending: Mutex<Vec<Waiter>>,
}

impl std::fmt::Debug for Waiters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiters")
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl Waiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for a message by `author_id` in `channel_id`
    /// accepted by `filter`.
    pub async fn wait_for<F>(
        &self,
        channel_id: u64,
        author_id: u64,
        filter: F,
        timeout: Duration,
    ) -> Option<MessagePayload>
    where
        F: Fn(&MessagePayload) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().push(Waiter {
            channel_id,
            author_id,
            filter: Box::new(filter),
            tx,
        });
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(message)) => Some(message),
            _ => {
                trace!(channel_id, author_id, "Waiter timed out");
                None
            }
        }
    }

    /// Offers `message` to the pending waiters. Returns `true` if one of them
    /// took it.
    pub fn notify(&self, message: &MessagePayload) -> bool {
        let mut pending = self.pending.lock();
        pending.retain(|w| !w.tx.is_closed());
        let position = pending.iter().position(|w| {
            w.channel_id == message.channel_id
                && w.author_id == message.author.id
                && (w.filter)(message)
        });
        match position {
            Some(index) => {
                let waiter = pending.swap_remove(index);
                waiter.tx.send(message.clone()).is_ok()
            }
            None => false,
        }
    }

    /// Number of live waiters.
    pub fn len(&self) -> usize {
        let mut pending = self.pending.lock();
        pending.retain(|w| !w.tx.is_closed());
        pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interprets a yes/no answer by its first letter.
pub fn parse_answer(content: &str) -> Option<bool> {
    match content.trim_start().chars().next()?.to_ascii_lowercase() {
        'y' => Some(true),
        'n' => Some(false),
        _ => None,
    }
}

/// Interprets a 1-based choice number given as the first word.
pub fn parse_choice(content: &str, choices: usize) -> Option<usize> {
    let n: usize = content.split_whitespace().next()?.parse().ok()?;
    (1..=choices).contains(&n).then_some(n)
}
