//! The [`Core`]: one running bot.
//!
//! `Core` owns the immutable [`CoreConfig`], the collaborator handles
//! (gateway, connection monitor, store, cache), the [`Registry`] and the
//! [`ExtensionManager`]. It is always held as `Arc<Core>`; every component
//! that needs the bot (contexts, tasks, controllers) keeps a clone.
//!
//! # Example
//!
//! ```rust,ignore
//! let core = Core::builder(config, gateway)
//!     .extension(MODERATION)
//!     .build();
//!
//! let report = core.boot().await;
//! for (name, err) in &report.failed {
//!     tracing::error!(extension = %name, error = %err, "Extension failed to load");
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use hero_core::{
    BoxedGateway, Cache, CacheBackend, ConnectionMonitor, GatewayResult, MemoryCache, MemoryStore,
    OutgoingMessage, Store, StoreResult,
};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::command::{Command, CommandSpec, Owner};
use crate::config::CoreConfig;
use crate::dispatcher::EventDispatcher;
use crate::error::{LifecycleResult, RegistryResult};
use crate::extension::{Extension, ExtensionDescriptor, SettingsHandle};
use crate::handler::{Handler, into_service};
use crate::lifecycle::{BootReport, ExtensionManager, ExtensionState, LoadOutcome, loading_extension};
use crate::registry::{Registry, RegistrySummary};
use crate::task::{TaskHandle, TaskSpec};
use crate::waiter::Waiters;

/// Settings key under which the core persists its presence.
const PRESENCE_KEY: &str = "core";

/// Runtime-adjustable bot presentation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub prefixes: Vec<String>,
    pub description: String,
    pub status: Option<String>,
}

// =============================================================================
// CoreBuilder
// =============================================================================

/// Assembles a [`Core`].
pub struct CoreBuilder {
    config: CoreConfig,
    gateway: BoxedGateway,
    monitor: ConnectionMonitor,
    store: Option<Arc<dyn Store>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    extensions: Vec<ExtensionDescriptor>,
}

impl CoreBuilder {
    /// Persistence backend; defaults to [`MemoryStore`].
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Cache backend; defaults to [`MemoryCache`].
    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    /// Shares an existing connection monitor (normally the gateway's).
    pub fn monitor(mut self, monitor: ConnectionMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    /// Registers a project-local extension.
    pub fn extension(mut self, descriptor: ExtensionDescriptor) -> Self {
        self.extensions.push(descriptor);
        self
    }

    pub fn build(self) -> Arc<Core> {
        let config = Arc::new(self.config);
        let backend = self
            .cache_backend
            .unwrap_or_else(|| Arc::new(MemoryCache::new()));
        let cache = Cache::new(backend, config.namespace.clone()).with_default_ttl(config.cache_ttl);
        let extensions = ExtensionManager::new();
        for descriptor in self.extensions {
            extensions.register(descriptor);
        }

        Arc::new(Core {
            presence: RwLock::new(Presence {
                prefixes: config.prefixes.clone(),
                description: config.description.clone(),
                status: None,
            }),
            presence_update: tokio::sync::Mutex::new(()),
            registry: RwLock::new(Registry::new(config.grouping)),
            store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            gateway: self.gateway,
            monitor: self.monitor,
            cache,
            extensions,
            waiters: Waiters::new(),
            config,
        })
    }
}

// =============================================================================
// Core
// =============================================================================

/// A running bot.
pub struct Core {
    config: Arc<CoreConfig>,
    gateway: BoxedGateway,
    monitor: ConnectionMonitor,
    store: Arc<dyn Store>,
    cache: Cache,
    registry: RwLock<Registry>,
    extensions: ExtensionManager,
    presence: RwLock<Presence>,
    /// Serialises read-modify-write of the presence across the store write.
    presence_update: tokio::sync::Mutex<()>,
    waiters: Waiters,
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("namespace", &self.config.namespace)
            .field("gateway", &self.gateway.name())
            .field("state", &self.monitor.state())
            .field("extensions", &self.registry.read().load_order())
            .finish_non_exhaustive()
    }
}

impl Core {
    pub fn builder(config: CoreConfig, gateway: BoxedGateway) -> CoreBuilder {
        CoreBuilder {
            config,
            gateway,
            monitor: ConnectionMonitor::new(),
            store: None,
            cache_backend: None,
            extensions: Vec::new(),
        }
    }

    // ─── Collaborators ──────────────────────────────────────────────────────

    pub fn config(&self) -> &Arc<CoreConfig> {
        &self.config
    }

    pub fn gateway(&self) -> &BoxedGateway {
        &self.gateway
    }

    pub fn monitor(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The bot-wide cache namespace.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// The cache namespace of `extension` (`<namespace>_<extension>`).
    pub fn extension_cache(&self, extension: &str) -> Cache {
        self.cache.scoped(extension)
    }

    pub fn waiters(&self) -> &Waiters {
        &self.waiters
    }

    /// Shared read access to the registry.
    ///
    /// Do not hold the guard across an `.await`.
    pub fn registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read()
    }

    pub(crate) fn registry_mut(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write()
    }

    /// Posts a message through the gateway.
    pub async fn send(&self, message: OutgoingMessage) -> GatewayResult<()> {
        debug!(channel = message.channel_id, "Sending message");
        self.gateway.send(message).await
    }

    /// A dispatcher routing gateway events into this core.
    pub fn dispatcher(self: &Arc<Self>) -> EventDispatcher {
        EventDispatcher::new(Arc::clone(self))
    }

    // ─── Presence ───────────────────────────────────────────────────────────

    pub fn presence(&self) -> Presence {
        self.presence.read().clone()
    }

    pub fn prefixes(&self) -> Vec<String> {
        self.presence.read().prefixes.clone()
    }

    pub fn description(&self) -> String {
        self.presence.read().description.clone()
    }

    pub fn status(&self) -> Option<String> {
        self.presence.read().status.clone()
    }

    pub async fn set_prefixes(&self, prefixes: Vec<String>) -> StoreResult<()> {
        self.update_presence(|p| p.prefixes = prefixes).await
    }

    pub async fn set_description(&self, description: impl Into<String>) -> StoreResult<()> {
        let description = description.into();
        self.update_presence(|p| p.description = description).await
    }

    pub async fn set_status(&self, status: Option<String>) -> StoreResult<()> {
        self.update_presence(|p| p.status = status).await
    }

    /// Loads the persisted presence, seeding it from the config on first run.
    pub async fn restore_presence(&self) -> StoreResult<()> {
        let _serial = self.presence_update.lock().await;
        let defaults = serde_json::to_value(self.presence())?;
        let stored = self
            .store
            .get_or_create_settings(&self.config.namespace, PRESENCE_KEY, defaults)
            .await?;
        let mut presence: Presence = serde_json::from_value(stored)?;
        if presence.prefixes.is_empty() {
            presence.prefixes = self.config.prefixes.clone();
        }
        debug!(prefixes = ?presence.prefixes, "Presence restored");
        *self.presence.write() = presence;
        Ok(())
    }

    async fn update_presence(&self, update: impl FnOnce(&mut Presence)) -> StoreResult<()> {
        let _serial = self.presence_update.lock().await;
        let next = {
            let mut presence = self.presence.read().clone();
            update(&mut presence);
            presence
        };
        self.store
            .save_settings(
                &self.config.namespace,
                PRESENCE_KEY,
                serde_json::to_value(&next)?,
            )
            .await?;
        *self.presence.write() = next;
        Ok(())
    }

    // ─── Extension lookups ──────────────────────────────────────────────────

    pub fn get_extension(&self, name: &str) -> Option<Arc<Extension>> {
        self.registry.read().get_extension(name)
    }

    /// The controller of `extension`, if it is loaded and holds a `T`.
    pub fn get_controller<T: Send + Sync + 'static>(&self, extension: &str) -> Option<Arc<T>> {
        self.get_extension(extension)?.controller::<T>()
    }

    pub fn get_settings(&self, extension: &str) -> Option<SettingsHandle> {
        self.get_extension(extension)?.settings().cloned()
    }

    // ─── Core-level registration ────────────────────────────────────────────

    /// Registers a command that belongs to no extension.
    ///
    /// Called while an extension is being set up, the command is attributed
    /// to that extension instead and leaves with it.
    pub fn add_command(&self, spec: CommandSpec) -> RegistryResult<Arc<Command>> {
        let owner = loading_extension().map(Owner::extension);
        self.registry.write().add_command(&spec, owner, &[])
    }

    pub fn remove_command(&self, name: &str) -> Option<Arc<Command>> {
        self.registry.write().remove_command(name)
    }

    /// Binds a listener that belongs to no extension (see
    /// [`add_command`](Self::add_command) for registrations during setup).
    pub fn add_listener<H, T>(&self, event: impl Into<String>, handler: H)
    where
        H: Handler<T>,
        T: Send + 'static,
    {
        let owner = loading_extension().map(Owner::extension);
        self.registry.write().add_listener(event, into_service(handler), owner);
    }

    /// Removes the listeners of `event` that belong to no extension.
    pub fn remove_listener(&self, event: &str) -> usize {
        self.registry.write().remove_listeners(event)
    }

    /// Schedules a task that belongs to no extension.
    pub fn add_task(self: &Arc<Self>, spec: TaskSpec) -> Arc<TaskHandle> {
        let owner = loading_extension().map(Owner::extension);
        self.registry.write().add_task(self, spec, owner)
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Adds a project-local extension to the catalog.
    pub fn register_extension(&self, descriptor: ExtensionDescriptor) -> bool {
        self.extensions.register(descriptor)
    }

    pub fn extension_state(&self, name: &str) -> ExtensionState {
        self.extensions.state(name)
    }

    /// Names the catalog can resolve, local first.
    pub fn available_extensions(&self) -> Vec<&'static str> {
        self.extensions.available()
    }

    pub async fn load(self: &Arc<Self>, name: &str) -> LifecycleResult<LoadOutcome> {
        self.extensions.load(self, name).await
    }

    pub async fn unload(self: &Arc<Self>, name: &str) -> LifecycleResult<()> {
        self.extensions.unload(self, name).await
    }

    pub async fn reload(self: &Arc<Self>, name: &str) -> LifecycleResult<()> {
        self.extensions.reload(self, name).await
    }

    /// Loads `names` in dependency order.
    pub async fn load_all(self: &Arc<Self>, names: &[String]) -> BootReport {
        self.extensions.load_all(self, names).await
    }

    /// Restores the presence and loads the configured extensions.
    pub async fn boot(self: &Arc<Self>) -> BootReport {
        if let Err(e) = self.restore_presence().await {
            warn!(error = %e, "Could not restore presence, using configured values");
        }
        let names = self.config.enabled_extensions.clone();
        let report = self.load_all(&names).await;
        info!(
            loaded = report.loaded.len(),
            disabled = report.disabled.len(),
            failed = report.failed.len(),
            "Boot finished"
        );
        report
    }

    /// Unloads every extension in reverse load order and stops the
    /// remaining core-level tasks.
    pub async fn shutdown(self: &Arc<Self>) {
        self.extensions.shutdown(self).await;
        let tasks = self.registry.write().drain_tasks();
        let grace = self.config.task_cancel_grace;
        futures::future::join_all(tasks.iter().map(|t| t.shutdown(grace))).await;
    }

    pub fn registry_summary(&self) -> RegistrySummary {
        self.registry.read().summary()
    }
}

#[cfg(test)]
mod tests {
    use hero_core::{
        GuildRecord, Lookup, MessagePayload, MessageRecord, RecordingGateway, TextChannelRecord,
        UserRecord,
    };

    use super::*;
    use crate::testing::TestBot;

    #[tokio::test]
    async fn presence_changes_are_persisted() {
        let bot = TestBot::new();
        bot.core
            .set_prefixes(vec!["?".to_string(), "hero ".to_string()])
            .await
            .unwrap();
        bot.core.set_status(Some("watching".to_string())).await.unwrap();

        let stored = bot
            .core
            .store()
            .get_or_create_settings("default", PRESENCE_KEY, serde_json::Value::Null)
            .await
            .unwrap();
        let stored: Presence = serde_json::from_value(stored).unwrap();
        assert_eq!(stored.prefixes, vec!["?", "hero "]);
        assert_eq!(stored.status.as_deref(), Some("watching"));
    }

    /// Yields inside every settings write so concurrent updates interleave.
    #[derive(Default)]
    struct YieldingStore(MemoryStore);

    #[async_trait::async_trait]
    impl Store for YieldingStore {
        async fn get_or_create_settings(
            &self,
            namespace: &str,
            extension: &str,
            defaults: serde_json::Value,
        ) -> StoreResult<serde_json::Value> {
            self.0.get_or_create_settings(namespace, extension, defaults).await
        }

        async fn save_settings(
            &self,
            namespace: &str,
            extension: &str,
            settings: serde_json::Value,
        ) -> StoreResult<()> {
            tokio::task::yield_now().await;
            self.0.save_settings(namespace, extension, settings).await
        }

        async fn wrap_user(&self, user_id: u64) -> StoreResult<Lookup<UserRecord>> {
            self.0.wrap_user(user_id).await
        }

        async fn save_user(&self, user: UserRecord) -> StoreResult<()> {
            self.0.save_user(user).await
        }

        async fn delete_user(&self, user_id: u64) -> StoreResult<bool> {
            self.0.delete_user(user_id).await
        }

        async fn wrap_guild(&self, guild_id: u64) -> StoreResult<Lookup<GuildRecord>> {
            self.0.wrap_guild(guild_id).await
        }

        async fn wrap_text_channel(
            &self,
            channel_id: u64,
            guild_id: Option<u64>,
        ) -> StoreResult<Lookup<TextChannelRecord>> {
            self.0.wrap_text_channel(channel_id, guild_id).await
        }

        async fn wrap_message(
            &self,
            message: &MessagePayload,
            create_if_new: bool,
        ) -> StoreResult<Lookup<MessageRecord>> {
            self.0.wrap_message(message, create_if_new).await
        }
    }

    #[tokio::test]
    async fn concurrent_presence_updates_are_not_lost() {
        let core = Core::builder(CoreConfig::default(), RecordingGateway::new())
            .store(Arc::new(YieldingStore::default()))
            .build();

        let (prefixes, status) = tokio::join!(
            core.set_prefixes(vec!["?".to_string()]),
            core.set_status(Some("idle".to_string())),
        );
        prefixes.unwrap();
        status.unwrap();

        assert_eq!(core.prefixes(), vec!["?"]);
        assert_eq!(core.status().as_deref(), Some("idle"));
        let stored = core
            .store()
            .get_or_create_settings("default", PRESENCE_KEY, serde_json::Value::Null)
            .await
            .unwrap();
        let stored: Presence = serde_json::from_value(stored).unwrap();
        assert_eq!(stored.prefixes, vec!["?"]);
        assert_eq!(stored.status.as_deref(), Some("idle"));
    }

    #[tokio::test]
    async fn restore_presence_seeds_from_config() {
        let bot = TestBot::new();
        bot.core.restore_presence().await.unwrap();
        assert_eq!(bot.core.prefixes(), vec!["!"]);

        bot.core.set_description("a bot").await.unwrap();
        bot.core.restore_presence().await.unwrap();
        assert_eq!(bot.core.description(), "a bot");
    }

    #[tokio::test]
    async fn core_level_commands_and_listeners() {
        let bot = TestBot::new();
        bot.core
            .add_command(CommandSpec::new("status", || async { "ok" }))
            .unwrap();
        bot.core.add_listener("ready", || async {});

        let summary = bot.core.registry_summary();
        assert_eq!(summary.commands, vec!["status"]);
        assert_eq!(summary.listeners.get("ready"), Some(&1));

        assert!(bot.core.remove_command("status").is_some());
        assert_eq!(bot.core.remove_listener("ready"), 1);
        assert_eq!(bot.core.registry_summary(), RegistrySummary::default());
    }
}
