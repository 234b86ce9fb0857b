//! Routing of gateway events to listeners and commands.
//!
//! For every inbound event the [`EventDispatcher`]:
//!
//! 1. hands chat messages to pending [`Waiters`](crate::waiter::Waiters);
//! 2. spawns every listener bound to the event name, concurrently;
//! 3. for messages from non-bot authors, spawns command processing.
//!
//! Nothing is awaited on the receive path, so a slow handler never delays the
//! next event. Each listener and command invocation is isolated: failures are
//! logged (and, for commands, reported to the invoker) but never propagate.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use hero_core::{Dispatcher, GatewayEvent, MessagePayload, names};
use serde_json::json;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tracing::{Instrument, debug, debug_span, error, trace, warn};

use crate::command::{Command, shell_split};
use crate::context::{Context, Invocation};
use crate::core::Core;
use crate::error::{CommandError, CommandResult};

/// Routes gateway events into a [`Core`].
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    core: Arc<Core>,
}

impl EventDispatcher {
    pub fn new(core: Arc<Core>) -> Self {
        Self { core }
    }

    /// Routes `event` and returns the handles of the spawned invocations.
    pub fn route(&self, event: GatewayEvent) -> Vec<JoinHandle<()>> {
        let event = Arc::new(event);
        let message = event.as_message();

        if let Some(msg) = &message
            && self.core.waiters().notify(msg)
        {
            trace!(message = msg.id, "Message delivered to a waiter");
        }

        let mut handles = spawn_listeners(&self.core, &event, message.clone());
        if let Some(msg) = message
            && !msg.author.bot
        {
            handles.push(tokio::spawn(process_commands(
                Arc::clone(&self.core),
                event,
                msg,
            )));
        }
        handles
    }
}

#[async_trait]
impl Dispatcher for EventDispatcher {
    async fn dispatch(&self, event: GatewayEvent) {
        self.route(event);
    }
}

// =============================================================================
// Listeners
// =============================================================================

fn spawn_listeners(
    core: &Arc<Core>,
    event: &Arc<GatewayEvent>,
    message: Option<MessagePayload>,
) -> Vec<JoinHandle<()>> {
    let listeners = core.registry().listeners_for(&event.name);
    if listeners.is_empty() {
        trace!(event = %event.name, "No listeners");
    }

    listeners
        .into_iter()
        .map(|listener| {
            let ctx = Arc::new(
                Context::new(Arc::clone(core), Arc::clone(event))
                    .with_message(message.clone())
                    .with_owner(listener.owner().cloned()),
            );
            let span = debug_span!(
                "listener",
                event = %event.name,
                extension = listener.extension().unwrap_or("-"),
            );
            let service = listener.service().clone();
            tokio::spawn(
                async move {
                    if let Err(e) = service.oneshot(ctx).await {
                        warn!(error = %e, "Listener failed");
                    }
                }
                .instrument(span),
            )
        })
        .collect()
}

// =============================================================================
// Commands
// =============================================================================

/// The longest configured prefix `content` starts with.
fn match_prefix(prefixes: &[String], content: &str) -> Option<String> {
    prefixes
        .iter()
        .filter(|p| !p.is_empty() && content.starts_with(p.as_str()))
        .max_by_key(|p| p.len())
        .cloned()
}

/// `text` without its first `n` whitespace-separated words.
fn skip_words(text: &str, n: usize) -> &str {
    let mut rest = text.trim_start();
    for _ in 0..n {
        rest = match rest.find(char::is_whitespace) {
            Some(end) => rest[end..].trim_start(),
            None => "",
        };
    }
    rest
}

async fn process_commands(core: Arc<Core>, event: Arc<GatewayEvent>, message: MessagePayload) {
    let Some(prefix) = match_prefix(&core.prefixes(), &message.content) else {
        return;
    };
    let body = &message.content[prefix.len()..];
    let (words, split_error) = match shell_split(body) {
        Ok(words) => (words, None),
        Err(e) => (
            body.split_whitespace().map(str::to_string).collect::<Vec<_>>(),
            Some(e),
        ),
    };
    if words.is_empty() {
        return;
    }

    let Some(resolved) = core.registry().resolve(&words) else {
        trace!(command = %words[0], "Unknown command ignored");
        return;
    };
    let command = Arc::clone(&resolved.command);
    let invocation = Invocation {
        prefix,
        command: Arc::clone(&command),
        invoked_with: words[..resolved.depth].join(" "),
        args: words[resolved.depth..].to_vec(),
        raw_args: skip_words(body, resolved.depth).to_string(),
    };
    let ctx = Arc::new(
        Context::new(Arc::clone(&core), event)
            .with_message(Some(message.clone()))
            .with_owner(command.owner().cloned())
            .with_invocation(invocation),
    );

    let span = debug_span!(
        "command",
        command = %command.qualified_name(),
        author = message.author.id,
        extension = command.extension().unwrap_or("-"),
    );
    async move {
        let result = match split_error {
            Some(e) => Err(CommandError::InvalidInput(e.to_string())),
            None => invoke(&ctx, &command).await,
        };
        finish(&core, &ctx, &command, &message, result).await;
    }
    .instrument(span)
    .await;
}

/// Runs the enable flag, the checks and the callback of `command`.
async fn invoke(ctx: &Arc<Context>, command: &Command) -> CommandResult<()> {
    if !command.is_enabled() {
        return Err(CommandError::Disabled);
    }
    for check in command.checks() {
        check.run(Arc::clone(ctx)).await?;
    }
    match command.callback() {
        Some(callback) => callback.clone().oneshot(Arc::clone(ctx)).await,
        None => ctx
            .send_help()
            .await
            .map_err(|e| CommandError::Handler(Box::new(e))),
    }
}

/// Reports the outcome to the invoker and to the completion/error listeners.
async fn finish(
    core: &Arc<Core>,
    ctx: &Arc<Context>,
    command: &Command,
    message: &MessagePayload,
    result: CommandResult<()>,
) {
    let mut payload = json!({
        "command": command.qualified_name(),
        "author_id": message.author.id,
        "channel_id": message.channel_id,
    });

    let event_name = match &result {
        Ok(()) => {
            debug!("Command completed");
            names::COMMAND_COMPLETION
        }
        Err(err) => {
            if err.is_internal() {
                error!(error = %err, "Command failed");
            } else {
                debug!(error = %err, "Command rejected");
            }
            if let Err(e) = ctx.reply(err.user_message(command)).await {
                warn!(error = %e, "Could not report the command failure");
            }
            payload["error"] = json!(err.to_string());
            names::COMMAND_ERROR
        }
    };

    let event = Arc::new(GatewayEvent::new(event_name, payload));
    join_all(spawn_listeners(core, &event, Some(message.clone()))).await;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use hero_core::Author;
    use tower::BoxError;

    use super::*;
    use crate::command::CommandSpec;
    use crate::command::check::{guild_only, owner_only};
    use crate::extractor::{Args, RawArgs};
    use crate::testing::{TestBot, dm_from, message_from};

    async fn route(bot: &TestBot, msg: MessagePayload) {
        let handles = bot.core.dispatcher().route(GatewayEvent::message(&msg));
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let prefixes = vec!["!".to_string(), "!!".to_string(), String::new()];
        assert_eq!(match_prefix(&prefixes, "!!ping").as_deref(), Some("!!"));
        assert_eq!(match_prefix(&prefixes, "!ping").as_deref(), Some("!"));
        assert_eq!(match_prefix(&prefixes, "ping"), None);
    }

    #[test]
    fn raw_args_skip_the_command_words() {
        assert_eq!(skip_words("  settings  set   a b", 2), "a b");
        assert_eq!(skip_words("ping", 1), "");
    }

    #[tokio::test]
    async fn commands_receive_their_arguments() {
        let bot = TestBot::new();
        bot.core
            .add_command(CommandSpec::new("echo", |Args(args): Args| async move {
                args.join("|")
            }))
            .unwrap();
        bot.core
            .add_command(CommandSpec::new("say", |RawArgs(raw): RawArgs| async move { raw }))
            .unwrap();

        route(&bot, message_from(1, "!echo a \"b c\" d")).await;
        route(&bot, message_from(1, "!say  hello   world")).await;
        assert_eq!(bot.gateway.sent_contents(), vec!["a|b c|d", "hello   world"]);
    }

    #[tokio::test]
    async fn nested_commands_resolve_through_groups() {
        let bot = TestBot::new();
        bot.core
            .add_command(CommandSpec::new("settings_ping", || async { "pong" }))
            .unwrap();

        route(&bot, message_from(1, "!settings ping")).await;
        route(&bot, message_from(1, "!settings")).await;

        let sent = bot.gateway.sent_contents();
        assert_eq!(sent[0], "pong");
        assert!(sent[1].starts_with("**settings**\nsettings command group"));
        assert!(sent[1].contains("ping"));
    }

    #[tokio::test]
    async fn unknown_commands_and_plain_messages_are_ignored() {
        let bot = TestBot::new();
        route(&bot, message_from(1, "!nothing here")).await;
        route(&bot, message_from(1, "hello")).await;
        route(&bot, message_from(1, "!")).await;
        assert!(bot.gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn bot_authors_do_not_trigger_commands() {
        let bot = TestBot::new();
        bot.core
            .add_command(CommandSpec::new("ping", || async { "pong" }))
            .unwrap();

        let mut msg = message_from(1, "!ping");
        msg.author = Author {
            id: 1,
            name: "other-bot".to_string(),
            bot: true,
        };
        route(&bot, msg).await;
        assert!(bot.gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn listeners_run_for_every_matching_event() {
        static HITS: AtomicUsize = AtomicUsize::new(0);

        let bot = TestBot::new();
        for _ in 0..3 {
            bot.core.add_listener(names::MESSAGE, || async {
                HITS.fetch_add(1, Ordering::SeqCst);
            });
        }
        bot.core.add_listener("member_join", || async {
            HITS.fetch_add(100, Ordering::SeqCst);
        });

        route(&bot, message_from(1, "hi")).await;
        assert_eq!(HITS.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failing_listener_does_not_affect_the_others() {
        static HITS: AtomicUsize = AtomicUsize::new(0);

        let bot = TestBot::new();
        bot.core.add_listener(names::MESSAGE, || async {
            if true {
                panic!("listener bug");
            }
        });
        bot.core.add_listener(names::MESSAGE, || async {
            Err::<(), BoxError>("listener error".into())
        });
        bot.core.add_listener(names::MESSAGE, || async {
            HITS.fetch_add(1, Ordering::SeqCst);
        });

        route(&bot, message_from(1, "hi")).await;
        assert_eq!(HITS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_reported_to_the_invoker() {
        let bot = TestBot::new();
        bot.core
            .add_command(CommandSpec::new("secret", || async { "hidden" }).check(owner_only()))
            .unwrap();
        bot.core
            .add_command(CommandSpec::new("guild", || async { "ok" }).check(guild_only()))
            .unwrap();
        bot.core
            .add_command(CommandSpec::new("off", || async { "ok" }).disabled())
            .unwrap();
        bot.core
            .add_command(CommandSpec::new("boom", || async {
                Err::<(), BoxError>("database down".into())
            }))
            .unwrap();
        bot.core
            .add_command(CommandSpec::new("crash", || async {
                if true {
                    panic!("bug");
                }
            }))
            .unwrap();
        bot.core
            .add_command(CommandSpec::new("quote", |Args(_): Args| async {}).help("Quotes."))
            .unwrap();

        route(&bot, message_from(1, "!secret")).await;
        route(&bot, dm_from(1, "!guild")).await;
        route(&bot, message_from(1, "!off")).await;
        route(&bot, message_from(1, "!boom")).await;
        route(&bot, message_from(1, "!crash")).await;
        route(&bot, message_from(1, "!quote \"unterminated")).await;

        assert_eq!(
            bot.gateway.sent_contents(),
            vec![
                "You do not have permission to use this command.",
                "This command cannot be used in direct messages.",
                "This command has been disabled.",
                "An error occurred while running the command **boom**.",
                "An error occurred while running the command **crash**.",
                "Invalid input.\n**quote**\nQuotes.",
            ]
        );
    }

    #[tokio::test]
    async fn completion_and_error_events_are_emitted() {
        static COMPLETED: AtomicUsize = AtomicUsize::new(0);
        static FAILED: AtomicUsize = AtomicUsize::new(0);

        let bot = TestBot::new();
        bot.core
            .add_command(CommandSpec::new("ok", || async {}))
            .unwrap();
        bot.core
            .add_command(CommandSpec::new("fail", || async {
                Err::<(), BoxError>("nope".into())
            }))
            .unwrap();
        bot.core.add_listener(names::COMMAND_COMPLETION, |msg: MessagePayload| async move {
            assert_eq!(msg.author.id, 1);
            COMPLETED.fetch_add(1, Ordering::SeqCst);
        });
        bot.core.add_listener(
            names::COMMAND_ERROR,
            |crate::extractor::Payload(body): crate::extractor::Payload<serde_json::Value>| async move {
                assert_eq!(body["command"], "fail");
                FAILED.fetch_add(1, Ordering::SeqCst);
            },
        );

        route(&bot, message_from(1, "!ok")).await;
        route(&bot, message_from(1, "!fail")).await;
        assert_eq!(COMPLETED.load(Ordering::SeqCst), 1);
        assert_eq!(FAILED.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn messages_reach_waiters_before_commands() {
        let bot = TestBot::new();
        let core = Arc::clone(&bot.core);
        let waiting = tokio::spawn(async move {
            core.waiters()
                .wait_for(7, 1, |_| true, std::time::Duration::from_secs(5))
                .await
        });
        while bot.core.waiters().is_empty() {
            tokio::task::yield_now().await;
        }

        route(&bot, message_from(1, "yes")).await;
        assert_eq!(waiting.await.unwrap().map(|m| m.content).as_deref(), Some("yes"));
    }
}
