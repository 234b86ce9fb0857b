//! Fixtures shared by the unit tests.

use std::sync::Arc;

use hero_core::{Author, GatewayEvent, MessagePayload, RecordingGateway};

use crate::config::CoreConfig;
use crate::context::Context;
use crate::core::Core;

/// A core wired to a [`RecordingGateway`] and in-memory backends.
pub(crate) struct TestBot {
    pub core: Arc<Core>,
    pub gateway: Arc<RecordingGateway>,
}

impl TestBot {
    /// A connected bot with the default config.
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    /// A connected bot.
    pub fn with_config(config: CoreConfig) -> Self {
        let bot = Self::disconnected_with(config);
        bot.core.monitor().mark_ready();
        bot
    }

    /// A bot whose connection has not become ready yet.
    pub fn disconnected() -> Self {
        Self::disconnected_with(CoreConfig::default())
    }

    fn disconnected_with(config: CoreConfig) -> Self {
        let gateway = RecordingGateway::new();
        let core = Core::builder(config, gateway.clone()).build();
        Self { core, gateway }
    }

    /// A listener-style context for `message`.
    pub fn context(&self, message: MessagePayload) -> Arc<Context> {
        let event = Arc::new(GatewayEvent::message(&message));
        Arc::new(Context::new(Arc::clone(&self.core), event).with_message(Some(message)))
    }
}

/// A guild message by `author` in channel 7 of guild 3.
pub(crate) fn message_from(author: u64, content: &str) -> MessagePayload {
    MessagePayload {
        id: 100,
        author: Author {
            id: author,
            name: format!("user{author}"),
            bot: false,
        },
        channel_id: 7,
        guild_id: Some(3),
        content: content.to_string(),
    }
}

/// A direct message by `author`.
pub(crate) fn dm_from(author: u64, content: &str) -> MessagePayload {
    MessagePayload {
        guild_id: None,
        ..message_from(author, content)
    }
}
