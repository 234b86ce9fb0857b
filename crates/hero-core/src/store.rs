//! The persistence collaborator.
//!
//! Two concerns live behind [`Store`]:
//!
//! - **Extension settings**: one JSON document per `(namespace, extension)`,
//!   fetched-or-created when an extension loads.
//! - **Platform records**: `wrap_*` operations turn a raw platform id into a
//!   persisted record. "Does not exist" and "exists but inactive" are not
//!   errors; they come back as [`Lookup`] variants for the caller to match on.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreResult;
use crate::event::MessagePayload;

// =============================================================================
// Lookup
// =============================================================================

/// Outcome of looking up a persisted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// The record exists and is active.
    Found(T),
    /// No record exists for the id.
    NotFound,
    /// A record exists but has been deactivated (e.g. an unregistered user).
    Inactive(u64),
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Returns the record when found.
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(t) => Some(t),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(t) => Lookup::Found(f(t)),
            Self::NotFound => Lookup::NotFound,
            Self::Inactive(id) => Lookup::Inactive(id),
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// A persisted platform user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: u64,
    pub is_active: bool,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub command_count: u64,
}

impl UserRecord {
    /// A freshly registered, active user.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            is_active: true,
            is_staff: false,
            command_count: 0,
        }
    }
}

/// A persisted guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRecord {
    pub id: u64,
    pub is_active: bool,
}

/// A persisted text channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChannelRecord {
    pub id: u64,
    pub guild_id: Option<u64>,
    pub is_active: bool,
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: u64,
    pub channel_id: u64,
    pub author_id: u64,
}

// =============================================================================
// Store trait
// =============================================================================

/// Async persistence interface used by the framework and by command handlers.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Returns the settings document for `extension`, inserting `defaults`
    /// first if none exists yet.
    async fn get_or_create_settings(
        &self,
        namespace: &str,
        extension: &str,
        defaults: Value,
    ) -> StoreResult<Value>;

    /// Replaces the settings document for `extension`.
    async fn save_settings(&self, namespace: &str, extension: &str, settings: Value)
    -> StoreResult<()>;

    /// Users are never created implicitly; an unknown id is
    /// [`Lookup::NotFound`].
    async fn wrap_user(&self, user_id: u64) -> StoreResult<Lookup<UserRecord>>;

    /// Inserts or replaces a user record.
    async fn save_user(&self, user: UserRecord) -> StoreResult<()>;

    /// Deletes a user record, returning whether one existed.
    async fn delete_user(&self, user_id: u64) -> StoreResult<bool>;

    /// Guilds are created on first sight.
    async fn wrap_guild(&self, guild_id: u64) -> StoreResult<Lookup<GuildRecord>>;

    /// Text channels are created on first sight.
    async fn wrap_text_channel(
        &self,
        channel_id: u64,
        guild_id: Option<u64>,
    ) -> StoreResult<Lookup<TextChannelRecord>>;

    /// Messages are only created when `create_if_new` is set.
    async fn wrap_message(
        &self,
        message: &MessagePayload,
        create_if_new: bool,
    ) -> StoreResult<Lookup<MessageRecord>>;
}

// =============================================================================
// MemoryStore
// =============================================================================

#[derive(Debug, Default)]
struct Tables {
    settings: HashMap<(String, String), Value>,
    users: HashMap<u64, UserRecord>,
    guilds: HashMap<u64, GuildRecord>,
    channels: HashMap<u64, TextChannelRecord>,
    messages: HashMap<u64, MessageRecord>,
}

/// Process-local [`Store`]; contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_or_create_settings(
        &self,
        namespace: &str,
        extension: &str,
        defaults: Value,
    ) -> StoreResult<Value> {
        let mut tables = self.tables.write();
        Ok(tables
            .settings
            .entry((namespace.to_string(), extension.to_string()))
            .or_insert(defaults)
            .clone())
    }

    async fn save_settings(
        &self,
        namespace: &str,
        extension: &str,
        settings: Value,
    ) -> StoreResult<()> {
        self.tables
            .write()
            .settings
            .insert((namespace.to_string(), extension.to_string()), settings);
        Ok(())
    }

    async fn wrap_user(&self, user_id: u64) -> StoreResult<Lookup<UserRecord>> {
        Ok(match self.tables.read().users.get(&user_id) {
            Some(user) if user.is_active => Lookup::Found(user.clone()),
            Some(user) => Lookup::Inactive(user.id),
            None => Lookup::NotFound,
        })
    }

    async fn save_user(&self, user: UserRecord) -> StoreResult<()> {
        self.tables.write().users.insert(user.id, user);
        Ok(())
    }

    async fn delete_user(&self, user_id: u64) -> StoreResult<bool> {
        Ok(self.tables.write().users.remove(&user_id).is_some())
    }

    async fn wrap_guild(&self, guild_id: u64) -> StoreResult<Lookup<GuildRecord>> {
        let mut tables = self.tables.write();
        let guild = tables.guilds.entry(guild_id).or_insert(GuildRecord {
            id: guild_id,
            is_active: true,
        });
        Ok(if guild.is_active {
            Lookup::Found(guild.clone())
        } else {
            Lookup::Inactive(guild_id)
        })
    }

    async fn wrap_text_channel(
        &self,
        channel_id: u64,
        guild_id: Option<u64>,
    ) -> StoreResult<Lookup<TextChannelRecord>> {
        let mut tables = self.tables.write();
        let channel = tables
            .channels
            .entry(channel_id)
            .or_insert(TextChannelRecord {
                id: channel_id,
                guild_id,
                is_active: true,
            });
        Ok(if channel.is_active {
            Lookup::Found(channel.clone())
        } else {
            Lookup::Inactive(channel_id)
        })
    }

    async fn wrap_message(
        &self,
        message: &MessagePayload,
        create_if_new: bool,
    ) -> StoreResult<Lookup<MessageRecord>> {
        let mut tables = self.tables.write();
        if let Some(record) = tables.messages.get(&message.id) {
            return Ok(Lookup::Found(record.clone()));
        }
        if !create_if_new {
            return Ok(Lookup::NotFound);
        }
        let record = MessageRecord {
            id: message.id,
            channel_id: message.channel_id,
            author_id: message.author.id,
        };
        tables.messages.insert(message.id, record.clone());
        Ok(Lookup::Found(record))
    }
}
