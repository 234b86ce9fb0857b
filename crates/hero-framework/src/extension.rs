//! Extension descriptors and loaded extensions.
//!
//! An extension is described by a static, `Copy` [`ExtensionDescriptor`]:
//! its name, its dependencies, the cogs it contributes and optional hooks.
//! Loading the descriptor produces an [`Extension`] holding the per-load
//! resources (config, settings, controller, cache) and the
//! [`Contributions`] registered for it.
//!
//! ```rust,ignore
//! pub static MODERATION: ExtensionDescriptor = ExtensionDescriptor::new("moderation")
//!     .description("Moderation tools")
//!     .depends_on(&["essentials"])
//!     .cogs(&[moderation_cog])
//!     .settings(|| json!({ "log_channel": null }))
//!     .controller(ModerationController::create)
//!     .teardown(|core| Box::pin(async move { Ok(()) }));
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use hero_core::{Cache, Store, StoreResult};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tower::BoxError;

use crate::catalog::ExtensionSource;
use crate::cog::{CogBuilder, CogHandle};
use crate::command::{CommandSpec, Owner};
use crate::core::Core;
use crate::handler::{Handler, into_service};
use crate::registry::{Contributions, Listener, PendingCommand, PendingTask};
use crate::task::TaskSpec;

/// Produces one cog of an extension.
pub type CogFactory = fn(&ExtensionSetup) -> CogBuilder;

/// Replaces cog discovery: the hook adds cogs and contributions itself.
pub type SetupFn = fn(&mut ExtensionSetup) -> Result<(), BoxError>;

/// Runs after the extension has been removed from the registry.
pub type TeardownFn = fn(Arc<Core>) -> BoxFuture<'static, Result<(), BoxError>>;

/// Default settings document, stored on first load.
pub type SettingsFn = fn() -> Value;

/// Builds the extension's controller.
pub type ControllerFn = fn(ControllerContext) -> Result<Arc<dyn Any + Send + Sync>, BoxError>;

// =============================================================================
// ExtensionDescriptor
// =============================================================================

/// A static, `Copy` description of an extension.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionDescriptor {
    /// Unique extension name (also its config and settings key).
    pub name: &'static str,
    pub description: &'static str,
    /// Extensions that must be loaded first.
    pub depends_on: &'static [&'static str],
    /// Cogs instantiated on load when no [`setup`](Self::setup) hook is set.
    pub cogs: &'static [CogFactory],
    pub setup: Option<SetupFn>,
    pub teardown: Option<TeardownFn>,
    pub settings: Option<SettingsFn>,
    pub controller: Option<ControllerFn>,
}

impl ExtensionDescriptor {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            description: "",
            depends_on: &[],
            cogs: &[],
            setup: None,
            teardown: None,
            settings: None,
            controller: None,
        }
    }

    pub const fn description(self, description: &'static str) -> Self {
        Self {
            description,
            ..self
        }
    }

    pub const fn depends_on(self, depends_on: &'static [&'static str]) -> Self {
        Self { depends_on, ..self }
    }

    pub const fn cogs(self, cogs: &'static [CogFactory]) -> Self {
        Self { cogs, ..self }
    }

    pub const fn setup(self, setup: SetupFn) -> Self {
        Self {
            setup: Some(setup),
            ..self
        }
    }

    pub const fn teardown(self, teardown: TeardownFn) -> Self {
        Self {
            teardown: Some(teardown),
            ..self
        }
    }

    pub const fn settings(self, settings: SettingsFn) -> Self {
        Self {
            settings: Some(settings),
            ..self
        }
    }

    pub const fn controller(self, controller: ControllerFn) -> Self {
        Self {
            controller: Some(controller),
            ..self
        }
    }
}

// =============================================================================
// Settings
// =============================================================================

/// The persisted settings document of one extension.
///
/// Fetched (or created from the descriptor's defaults) when the extension
/// loads; reads are served from memory, writes go through to the store.
#[derive(Clone)]
pub struct SettingsHandle {
    namespace: String,
    extension: String,
    store: Arc<dyn Store>,
    value: Arc<RwLock<Value>>,
}

impl fmt::Debug for SettingsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsHandle")
            .field("extension", &self.extension)
            .field("value", &*self.value.read())
            .finish_non_exhaustive()
    }
}

impl SettingsHandle {
    pub(crate) async fn load(
        store: Arc<dyn Store>,
        namespace: &str,
        extension: &str,
        defaults: Value,
    ) -> StoreResult<Self> {
        let value = store
            .get_or_create_settings(namespace, extension, defaults)
            .await?;
        Ok(Self {
            namespace: namespace.to_string(),
            extension: extension.to_string(),
            store,
            value: Arc::new(RwLock::new(value)),
        })
    }

    /// The raw settings document.
    pub fn value(&self) -> Value {
        self.value.read().clone()
    }

    /// Deserialises the settings document.
    pub fn get<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.value())
    }

    /// Replaces and persists the settings document.
    pub async fn save<T: Serialize + ?Sized>(&self, settings: &T) -> StoreResult<()> {
        let value = serde_json::to_value(settings)?;
        self.store
            .save_settings(&self.namespace, &self.extension, value.clone())
            .await?;
        *self.value.write() = value;
        Ok(())
    }

    /// Sets one top-level key and persists the document.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        let mut doc = self.value();
        if !doc.is_object() {
            doc = Value::Object(Default::default());
        }
        if let Value::Object(map) = &mut doc {
            map.insert(key.to_string(), serde_json::to_value(value)?);
        }
        self.save(&doc).await
    }
}

// =============================================================================
// Controller construction
// =============================================================================

/// Everything a controller is built from.
#[derive(Clone)]
pub struct ControllerContext {
    pub core: Arc<Core>,
    pub extension: String,
    pub store: Arc<dyn Store>,
    pub cache: Cache,
    pub settings: Option<SettingsHandle>,
}

// =============================================================================
// ExtensionSetup
// =============================================================================

/// Collects the cogs and contributions of one extension load.
///
/// Cog factories receive it by reference; a [`SetupFn`] hook receives it
/// mutably and registers everything itself.
pub struct ExtensionSetup {
    core: Arc<Core>,
    name: String,
    config: Value,
    settings: Option<SettingsHandle>,
    controller: Option<Arc<dyn Any + Send + Sync>>,
    cogs: Vec<Arc<CogHandle>>,
    contributions: Contributions,
}

impl ExtensionSetup {
    pub(crate) fn new(
        core: Arc<Core>,
        name: &str,
        config: Value,
        settings: Option<SettingsHandle>,
        controller: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Self {
        Self {
            core,
            name: name.to_string(),
            config,
            settings,
            controller,
            cogs: Vec::new(),
            contributions: Contributions::default(),
        }
    }

    /// The running core.
    ///
    /// Commands, listeners and tasks added on it during setup belong to this
    /// extension and are removed if the load fails. Unlike the `add_*`
    /// methods below, they are not part of the snapshot a failed reload
    /// restores.
    pub fn core(&self) -> &Arc<Core> {
        &self.core
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The extension's config section.
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Deserialises the config section, falling back to `T::default()`.
    pub fn config_as<T: DeserializeOwned + Default>(&self) -> T {
        serde_json::from_value(self.config.clone()).unwrap_or_default()
    }

    pub fn settings(&self) -> Option<&SettingsHandle> {
        self.settings.as_ref()
    }

    pub fn controller<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(self.controller.as_ref()?).downcast::<T>().ok()
    }

    /// Instantiates and adds a cog.
    pub fn add_cog(&mut self, cog: CogBuilder) -> &mut Self {
        let (handle, contributions) = cog.instantiate(&self.name);
        self.cogs.push(handle);
        self.contributions.extend(contributions);
        self
    }

    /// Adds a command that belongs to no cog.
    pub fn add_command(&mut self, spec: CommandSpec) -> &mut Self {
        self.contributions.commands.push(PendingCommand {
            spec,
            owner: Owner::extension(self.name.clone()),
            checks: Vec::new(),
        });
        self
    }

    /// Adds a listener that belongs to no cog.
    pub fn add_listener<H, T>(&mut self, event: impl Into<String>, handler: H) -> &mut Self
    where
        H: Handler<T>,
        T: Send + 'static,
    {
        self.contributions.listeners.push(Listener::new(
            event.into(),
            into_service(handler),
            Some(Owner::extension(self.name.clone())),
        ));
        self
    }

    /// Adds a task that belongs to no cog.
    pub fn add_task(&mut self, spec: TaskSpec) -> &mut Self {
        self.contributions.tasks.push(PendingTask {
            spec,
            owner: Owner::extension(self.name.clone()),
        });
        self
    }

    pub(crate) fn finish(self) -> (Vec<Arc<CogHandle>>, Contributions) {
        (self.cogs, self.contributions)
    }
}

// =============================================================================
// Extension
// =============================================================================

/// A loaded extension.
pub struct Extension {
    name: String,
    descriptor: ExtensionDescriptor,
    source: ExtensionSource,
    config: Value,
    settings: Option<SettingsHandle>,
    controller: Option<Arc<dyn Any + Send + Sync>>,
    cache: Cache,
    cogs: Vec<Arc<CogHandle>>,
    contributions: Contributions,
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("cogs", &self.cogs)
            .field("contributions", &self.contributions)
            .finish_non_exhaustive()
    }
}

/// Parts an [`Extension`] is assembled from by the lifecycle manager.
pub(crate) struct ExtensionParts {
    pub descriptor: ExtensionDescriptor,
    pub source: ExtensionSource,
    pub config: Value,
    pub settings: Option<SettingsHandle>,
    pub controller: Option<Arc<dyn Any + Send + Sync>>,
    pub cache: Cache,
    pub cogs: Vec<Arc<CogHandle>>,
    pub contributions: Contributions,
}

impl Extension {
    pub(crate) fn new(parts: ExtensionParts) -> Self {
        Self {
            name: parts.descriptor.name.to_string(),
            descriptor: parts.descriptor,
            source: parts.source,
            config: parts.config,
            settings: parts.settings,
            controller: parts.controller,
            cache: parts.cache,
            cogs: parts.cogs,
            contributions: parts.contributions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &ExtensionDescriptor {
        &self.descriptor
    }

    /// Which catalog the extension was loaded from.
    pub fn source(&self) -> ExtensionSource {
        self.source
    }

    /// The config section read at load time.
    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn settings(&self) -> Option<&SettingsHandle> {
        self.settings.as_ref()
    }

    pub fn controller<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(self.controller.as_ref()?).downcast::<T>().ok()
    }

    /// The extension's cache namespace.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Cogs in registration order.
    pub fn cogs(&self) -> &[Arc<CogHandle>] {
        &self.cogs
    }

    pub fn contributions(&self) -> &Contributions {
        &self.contributions
    }
}
