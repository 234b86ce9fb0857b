//! Per-invocation context handed to handlers and checks.

use std::sync::Arc;
use std::time::Duration;

use hero_core::{GatewayError, GatewayEvent, GatewayResult, MessagePayload, OutgoingMessage};
use tokio::time::Instant;

use crate::cog::CogHandle;
use crate::command::Command;
use crate::command::help::{command_help, group_help};
use crate::command::Owner;
use crate::core::Core;
use crate::extension::Extension;
use crate::waiter::{parse_answer, parse_choice};

/// Default timeout of the `wait_for_*` helpers.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// How a message turned into a command invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The prefix the message started with.
    pub prefix: String,
    /// The resolved command.
    pub command: Arc<Command>,
    /// The words that named the command, space-joined.
    pub invoked_with: String,
    /// Remaining words after shell-style splitting.
    pub args: Vec<String>,
    /// Remaining text, unsplit.
    pub raw_args: String,
}

/// Context of one listener or command invocation.
#[derive(Debug)]
pub struct Context {
    core: Arc<Core>,
    event: Arc<GatewayEvent>,
    message: Option<MessagePayload>,
    invocation: Option<Invocation>,
    owner: Option<Owner>,
    received_at: Instant,
}

impl Context {
    pub fn new(core: Arc<Core>, event: Arc<GatewayEvent>) -> Self {
        Self {
            core,
            event,
            message: None,
            invocation: None,
            owner: None,
            received_at: Instant::now(),
        }
    }

    pub fn with_message(mut self, message: Option<MessagePayload>) -> Self {
        self.message = message;
        self
    }

    pub fn with_invocation(mut self, invocation: Invocation) -> Self {
        self.invocation = Some(invocation);
        self
    }

    pub fn with_owner(mut self, owner: Option<Owner>) -> Self {
        self.owner = owner;
        self
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn core(&self) -> &Arc<Core> {
        &self.core
    }

    pub fn event(&self) -> &Arc<GatewayEvent> {
        &self.event
    }

    /// The chat message behind this context, if any.
    pub fn message(&self) -> Option<&MessagePayload> {
        self.message.as_ref()
    }

    pub fn author_id(&self) -> Option<u64> {
        self.message.as_ref().map(|m| m.author.id)
    }

    pub fn invocation(&self) -> Option<&Invocation> {
        self.invocation.as_ref()
    }

    pub fn command(&self) -> Option<&Arc<Command>> {
        self.invocation.as_ref().map(|i| &i.command)
    }

    /// The prefix used, or the first configured prefix outside commands.
    pub fn prefix(&self) -> String {
        match &self.invocation {
            Some(invocation) => invocation.prefix.clone(),
            None => self.core.prefixes().into_iter().next().unwrap_or_default(),
        }
    }

    pub fn owner(&self) -> Option<&Owner> {
        self.owner.as_ref()
    }

    /// Name of the extension whose handler is running.
    pub fn extension_name(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.extension.as_str())
    }

    /// The running handler's extension, if it is still loaded.
    pub fn extension(&self) -> Option<Arc<Extension>> {
        self.core.get_extension(self.extension_name()?)
    }

    pub fn cog(&self) -> Option<&Arc<CogHandle>> {
        self.owner.as_ref().and_then(|o| o.cog.as_ref())
    }

    /// The running cog's state.
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.cog().and_then(|c| c.state::<T>())
    }

    /// Time since the event was received.
    pub fn elapsed(&self) -> Duration {
        self.received_at.elapsed()
    }

    // ─── Replies ────────────────────────────────────────────────────────────

    /// Posts `content` in the channel of the triggering message.
    pub async fn reply(&self, content: impl Into<String>) -> GatewayResult<()> {
        let message = self
            .message
            .as_ref()
            .ok_or_else(|| GatewayError::send("event has no channel to reply to"))?;
        self.core
            .send(OutgoingMessage::reply(message, content))
            .await
    }

    /// Sends the help of the invoked command (a group lists its subcommands).
    pub async fn send_help(&self) -> GatewayResult<()> {
        let Some(command) = self.command() else {
            return Ok(());
        };
        let text = if command.is_group() {
            let children = self.core.registry().commands().children(command.path());
            group_help(command, &children)
        } else {
            command_help(command)
        };
        self.reply(text).await
    }

    // ─── Waiting for the user ───────────────────────────────────────────────

    /// Waits for the next message of the same author in the same channel that
    /// passes `filter`, returning its content.
    pub async fn wait_for_response<F>(&self, filter: F, timeout: Duration) -> Option<String>
    where
        F: Fn(&MessagePayload) -> bool + Send + Sync + 'static,
    {
        let message = self.message.as_ref()?;
        self.core
            .waiters()
            .wait_for(message.channel_id, message.author.id, filter, timeout)
            .await
            .map(|m| m.content)
    }

    /// Waits for a yes/no answer.
    pub async fn wait_for_answer(&self, timeout: Duration) -> Option<bool> {
        let answer = self
            .wait_for_response(|m| parse_answer(&m.content).is_some(), timeout)
            .await?;
        parse_answer(&answer)
    }

    /// Lists `choices` numbered from 1 and waits for the user to pick one.
    ///
    /// Returns the 1-based number of the choice.
    pub async fn wait_for_choice<S: AsRef<str>>(&self, choices: &[S], timeout: Duration) -> Option<usize> {
        let listing = choices
            .iter()
            .enumerate()
            .map(|(i, c)| format!("**{}**: {}", i + 1, c.as_ref()))
            .collect::<Vec<_>>()
            .join("\n");
        self.reply(listing).await.ok()?;

        let count = choices.len();
        let choice = self
            .wait_for_response(move |m| parse_choice(&m.content, count).is_some(), timeout)
            .await?;
        parse_choice(&choice, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestBot, message_from};

    #[tokio::test]
    async fn reply_goes_to_the_message_channel() {
        let bot = TestBot::new();
        let ctx = bot.context(message_from(1, "!hi"));
        ctx.reply("hello").await.unwrap();

        let sent = bot.gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel_id, 7);
        assert_eq!(sent[0].content, "hello");
    }

    #[tokio::test]
    async fn reply_without_message_fails() {
        let bot = TestBot::new();
        let ctx = Context::new(
            Arc::clone(&bot.core),
            Arc::new(GatewayEvent::new("ready", serde_json::Value::Null)),
        );
        assert!(ctx.reply("hello").await.is_err());
    }

    #[tokio::test]
    async fn wait_for_answer_reads_the_follow_up() {
        let bot = TestBot::new();
        let ctx = bot.context(message_from(1, "!confirm"));

        let core = Arc::clone(&bot.core);
        let feeder = tokio::spawn(async move {
            while core.waiters().is_empty() {
                tokio::task::yield_now().await;
            }
            core.waiters().notify(&message_from(1, "whatever"));
            core.waiters().notify(&message_from(1, "Yes"));
        });

        assert_eq!(ctx.wait_for_answer(DEFAULT_WAIT_TIMEOUT).await, Some(true));
        feeder.await.unwrap();
    }

    #[tokio::test]
    async fn wait_for_choice_lists_the_options() {
        let bot = TestBot::new();
        let ctx = bot.context(message_from(1, "!pick"));

        let core = Arc::clone(&bot.core);
        let feeder = tokio::spawn(async move {
            while core.waiters().is_empty() {
                tokio::task::yield_now().await;
            }
            core.waiters().notify(&message_from(1, "2"));
        });

        let picked = ctx.wait_for_choice(&["red", "blue"], DEFAULT_WAIT_TIMEOUT).await;
        assert_eq!(picked, Some(2));
        assert_eq!(bot.gateway.sent_contents()[0], "**1**: red\n**2**: blue");
        feeder.await.unwrap();
    }
}
