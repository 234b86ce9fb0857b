//! Extension lifecycle: load, unload, reload and dependency-ordered boot.
//!
//! Each extension moves through the following states:
//!
//! ```text
//!                 ┌──────── failed load (full rollback) ────────┐
//!                 ▼                                              │
//! Unloaded ──► Loading ──► Loaded ──► Unloading ──► Unloaded     │
//!                 │           │                                  │
//!                 └───────────┼──────────────────────────────────┘
//!                             ▼
//!                         Reloading ──► Loaded (new code or restored snapshot)
//!                                   └─► Unloaded (restore failed)
//! ```
//!
//! Lifecycle operations are serialised by an async mutex, so two loads never
//! interleave. Every registry mutation is one synchronous call under the
//! registry write lock; the dispatcher never observes an extension half-way
//! registered.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::catalog::{ExtensionCatalog, ExtensionSource};
use crate::core::Core;
use crate::error::{LifecycleError, LifecycleResult};
use crate::extension::{
    ControllerContext, Extension, ExtensionDescriptor, ExtensionParts, ExtensionSetup, SettingsHandle,
};

tokio::task_local! {
    /// Name of the extension whose cogs are being instantiated on this task.
    static LOADING: String;
}

/// The extension currently being set up on this task, if any.
///
/// Registrations made straight on the [`Core`] from a setup hook, a cog
/// factory or a controller constructor are attributed to it, so a failed
/// load can take them back.
pub(crate) fn loading_extension() -> Option<String> {
    LOADING.try_with(Clone::clone).ok()
}

// =============================================================================
// State & results
// =============================================================================

/// Lifecycle state of one extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtensionState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Unloading,
    Reloading,
}

/// Successful result of [`ExtensionManager::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// The extension is administratively disabled and was skipped.
    Disabled,
}

/// Result of a dependency-ordered [`ExtensionManager::load_all`].
#[derive(Debug, Default)]
pub struct BootReport {
    /// Loaded extensions, in load order.
    pub loaded: Vec<String>,
    pub disabled: Vec<String>,
    pub failed: Vec<(String, LifecycleError)>,
}

impl BootReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

// =============================================================================
// Topological sort
// =============================================================================

/// Orders `descriptors` into load layers with Kahn's algorithm.
///
/// An edge A → B exists when B depends on A and both are in `descriptors`;
/// dependencies outside the set are checked when B is loaded. Returns the
/// layers (indices into `descriptors`) and the indices that could not be
/// ordered because they are part of, or depend on, a cycle.
fn topological_layers(descriptors: &[ExtensionDescriptor]) -> (Vec<Vec<usize>>, Vec<usize>) {
    let n = descriptors.len();
    let index: HashMap<&str, usize> = descriptors
        .iter()
        .enumerate()
        .map(|(i, d)| (d.name, i))
        .collect();

    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, descriptor) in descriptors.iter().enumerate() {
        for dependency in descriptor.depends_on {
            match index.get(dependency) {
                Some(&provider) if provider != i => {
                    dependents[provider].push(i);
                    in_degree[i] += 1;
                }
                Some(_) => {
                    warn!(extension = descriptor.name, "Extension depends on itself, ignored");
                }
                None => {}
            }
        }
    }

    let mut layers = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            for &j in &dependents[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    next.push(j);
                }
            }
        }
        next.sort_unstable();
        layers.push(current);
        current = next;
    }

    let stuck = (0..n).filter(|&i| in_degree[i] > 0).collect();
    (layers, stuck)
}

// =============================================================================
// ExtensionManager
// =============================================================================

/// Drives the extension state machine against a [`Core`]'s registry.
#[derive(Debug, Default)]
pub struct ExtensionManager {
    catalog: RwLock<ExtensionCatalog>,
    states: Mutex<HashMap<String, ExtensionState>>,
    lock: tokio::sync::Mutex<()>,
}

impl ExtensionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a project-local descriptor to the catalog.
    pub fn register(&self, descriptor: ExtensionDescriptor) -> bool {
        self.catalog.write().register(descriptor)
    }

    pub fn available(&self) -> Vec<&'static str> {
        self.catalog.read().names()
    }

    pub fn state(&self, name: &str) -> ExtensionState {
        self.states.lock().get(name).copied().unwrap_or_default()
    }

    fn set_state(&self, name: &str, state: ExtensionState) {
        let mut states = self.states.lock();
        if state == ExtensionState::Unloaded {
            states.remove(name);
        } else {
            states.insert(name.to_string(), state);
        }
    }

    // ─── Public operations ──────────────────────────────────────────────────

    /// Loads `name`.
    ///
    /// On error nothing of the extension stays registered.
    pub async fn load(&self, core: &Arc<Core>, name: &str) -> LifecycleResult<LoadOutcome> {
        let _guard = self.lock.lock().await;
        self.load_locked(core, name)
            .instrument(info_span!("extension.load", extension = %name))
            .await
    }

    /// Unloads `name`: commands, listeners and tasks are removed, tasks are
    /// cancelled, then the teardown hook runs.
    pub async fn unload(&self, core: &Arc<Core>, name: &str) -> LifecycleResult<()> {
        let _guard = self.lock.lock().await;
        self.unload_locked(core, name)
            .instrument(info_span!("extension.unload", extension = %name))
            .await
            .map(|_| ())
    }

    /// Unloads and loads `name` again.
    ///
    /// If the new load fails, the previous extension (same cogs, same
    /// contributions) is registered again and the load error is returned.
    /// If that fails too, the extension stays unloaded and
    /// [`LifecycleError::RestoreFailed`] carries both errors.
    pub async fn reload(&self, core: &Arc<Core>, name: &str) -> LifecycleResult<()> {
        let _guard = self.lock.lock().await;
        self.reload_locked(core, name)
            .instrument(info_span!("extension.reload", extension = %name))
            .await
    }

    /// Loads `names` layer by layer in dependency order.
    ///
    /// Failures are collected per extension; the others still load.
    pub async fn load_all(&self, core: &Arc<Core>, names: &[String]) -> BootReport {
        let _guard = self.lock.lock().await;
        let mut report = BootReport::default();

        let mut candidates = Vec::new();
        for name in names {
            if candidates.iter().any(|d: &ExtensionDescriptor| d.name == name.as_str()) {
                debug!(extension = %name, "Extension listed twice, loading once");
                continue;
            }
            match self.catalog.read().resolve(name) {
                Some((descriptor, _)) => candidates.push(descriptor),
                None => report
                    .failed
                    .push((name.clone(), LifecycleError::ExtensionNotFound(name.clone()))),
            }
        }

        let (layers, stuck) = topological_layers(&candidates);
        for i in stuck {
            let name = candidates[i].name.to_string();
            error!(extension = %name, "Extension is part of a dependency cycle, not loading");
            report
                .failed
                .push((name.clone(), LifecycleError::DependencyCycle(name)));
        }

        for layer in layers {
            for i in layer {
                let name = candidates[i].name;
                let outcome = self
                    .load_locked(core, name)
                    .instrument(info_span!("extension.load", extension = %name))
                    .await;
                match outcome {
                    Ok(LoadOutcome::Loaded) => report.loaded.push(name.to_string()),
                    Ok(LoadOutcome::Disabled) => report.disabled.push(name.to_string()),
                    Err(e) => {
                        error!(extension = %name, error = %e, "Extension failed to load");
                        report.failed.push((name.to_string(), e));
                    }
                }
            }
        }
        report
    }

    /// Unloads every loaded extension in reverse load order.
    pub async fn shutdown(&self, core: &Arc<Core>) {
        let _guard = self.lock.lock().await;
        let order: Vec<String> = core.registry().load_order().to_vec();
        for name in order.iter().rev() {
            if let Err(e) = self
                .unload_locked(core, name)
                .instrument(info_span!("extension.unload", extension = %name))
                .await
            {
                warn!(extension = %name, error = %e, "Extension failed to unload during shutdown");
            }
        }
    }

    // ─── Steps (lifecycle lock held) ────────────────────────────────────────

    async fn load_locked(&self, core: &Arc<Core>, name: &str) -> LifecycleResult<LoadOutcome> {
        if core.registry().has_extension(name) {
            return Err(LifecycleError::AlreadyLoaded(name.to_string()));
        }
        let (descriptor, source) = self
            .catalog
            .read()
            .resolve(name)
            .ok_or_else(|| LifecycleError::ExtensionNotFound(name.to_string()))?;

        if core.config().is_disabled(name) {
            info!("Extension is disabled, skipping");
            return Ok(LoadOutcome::Disabled);
        }

        let missing = descriptor
            .depends_on
            .iter()
            .find(|dependency| !core.registry().has_extension(dependency));
        if let Some(dependency) = missing {
            return Err(LifecycleError::MissingDependency {
                extension: name.to_string(),
                dependency: dependency.to_string(),
            });
        }

        self.set_state(name, ExtensionState::Loading);
        let instantiated = LOADING
            .scope(name.to_string(), self.instantiate(core, descriptor, source))
            .await;
        match instantiated {
            Ok(extension) => {
                let contributions = extension.contributions().clone();
                let added = core
                    .registry_mut()
                    .add_extension(core, Arc::clone(&extension), &contributions);
                if let Err(e) = added {
                    self.discard(core, name).await;
                    self.set_state(name, ExtensionState::Unloaded);
                    return Err(e.into());
                }
                self.set_state(name, ExtensionState::Loaded);
                info!(
                    source = ?source,
                    cogs = extension.cogs().len(),
                    commands = contributions.command_names().len(),
                    listeners = contributions.listener_count(),
                    tasks = contributions.task_count(),
                    "Extension loaded"
                );
                Ok(LoadOutcome::Loaded)
            }
            Err(e) => {
                self.discard(core, name).await;
                self.set_state(name, ExtensionState::Unloaded);
                Err(e)
            }
        }
    }

    /// Takes back whatever a failed load of `name` registered on the core
    /// directly, cancelling its tasks.
    async fn discard(&self, core: &Arc<Core>, name: &str) {
        let leftovers = core.registry_mut().take_contributions_of(name);
        if leftovers.is_empty() {
            return;
        }
        warn!(
            commands = leftovers.commands.len(),
            listeners = leftovers.listeners,
            tasks = leftovers.tasks.len(),
            "Removed registrations of the failed load"
        );
        for task in &leftovers.tasks {
            task.cancel();
        }
        let grace = core.config().task_cancel_grace;
        join_all(leftovers.tasks.iter().map(|task| task.shutdown(grace))).await;
    }

    /// Builds the extension's resources and collects its contributions
    /// without touching the registry.
    async fn instantiate(
        &self,
        core: &Arc<Core>,
        descriptor: ExtensionDescriptor,
        source: ExtensionSource,
    ) -> LifecycleResult<Arc<Extension>> {
        let name = descriptor.name;
        let config = core.config().extension_config(name);

        let settings = match descriptor.settings {
            Some(defaults) => Some(
                SettingsHandle::load(
                    Arc::clone(core.store()),
                    &core.config().namespace,
                    name,
                    defaults(),
                )
                .await?,
            ),
            None => None,
        };

        let cache = core.extension_cache(name);
        let controller = match descriptor.controller {
            Some(create) => Some(
                create(ControllerContext {
                    core: Arc::clone(core),
                    extension: name.to_string(),
                    store: Arc::clone(core.store()),
                    cache: cache.clone(),
                    settings: settings.clone(),
                })
                .map_err(|e| LifecycleError::setup(name, e))?,
            ),
            None => None,
        };

        let mut setup = ExtensionSetup::new(
            Arc::clone(core),
            name,
            config.clone(),
            settings.clone(),
            controller.clone(),
        );
        match descriptor.setup {
            Some(hook) => hook(&mut setup).map_err(|e| LifecycleError::setup(name, e))?,
            None => {
                for factory in descriptor.cogs {
                    let cog = factory(&setup);
                    setup.add_cog(cog);
                }
            }
        }
        let (cogs, contributions) = setup.finish();

        Ok(Arc::new(Extension::new(ExtensionParts {
            descriptor,
            source,
            config,
            settings,
            controller,
            cache,
            cogs,
            contributions,
        })))
    }

    async fn unload_locked(&self, core: &Arc<Core>, name: &str) -> LifecycleResult<Arc<Extension>> {
        let detached = core
            .registry_mut()
            .remove_extension(name)
            .map_err(|_| LifecycleError::NotLoaded(name.to_string()))?;
        self.set_state(name, ExtensionState::Unloading);

        for task in &detached.tasks {
            task.cancel();
        }
        let grace = core.config().task_cancel_grace;
        join_all(detached.tasks.iter().map(|task| task.shutdown(grace))).await;

        if let Some(teardown) = detached.extension.descriptor().teardown
            && let Err(e) = teardown(Arc::clone(core)).await
        {
            warn!(error = %e, "Extension teardown failed");
        }

        self.set_state(name, ExtensionState::Unloaded);
        info!(
            commands = detached.commands.len(),
            listeners = detached.listeners,
            tasks = detached.tasks.len(),
            "Extension unloaded"
        );
        Ok(detached.extension)
    }

    async fn reload_locked(&self, core: &Arc<Core>, name: &str) -> LifecycleResult<()> {
        let snapshot = core
            .get_extension(name)
            .ok_or_else(|| LifecycleError::NotLoaded(name.to_string()))?;
        self.set_state(name, ExtensionState::Reloading);
        self.unload_locked(core, name).await?;
        self.set_state(name, ExtensionState::Reloading);

        let reload_error = match self.load_locked(core, name).await {
            Ok(_) => {
                if self.state(name) == ExtensionState::Reloading {
                    self.set_state(name, ExtensionState::Unloaded);
                }
                info!("Extension reloaded");
                return Ok(());
            }
            Err(e) => e,
        };

        let restored = core
            .registry_mut()
            .add_extension(core, Arc::clone(&snapshot), snapshot.contributions());
        match restored {
            Ok(()) => {
                self.set_state(name, ExtensionState::Loaded);
                warn!(error = %reload_error, "Reload failed, previous extension restored");
                Err(reload_error)
            }
            Err(restore_error) => {
                self.set_state(name, ExtensionState::Unloaded);
                error!(
                    reload_error = %reload_error,
                    restore_error = %restore_error,
                    "Reload failed and the previous extension could not be restored"
                );
                Err(LifecycleError::RestoreFailed {
                    extension: name.to_string(),
                    reload: Box::new(reload_error),
                    restore: Box::new(restore_error.into()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::future::BoxFuture;
    use serde_json::json;
    use tower::BoxError;

    use super::*;
    use crate::cog::CogBuilder;
    use crate::command::CommandSpec;
    use crate::config::CoreConfig;
    use crate::error::{ConflictReason, RegistryError};
    use crate::registry::RegistrySummary;
    use crate::task::TaskSpec;
    use crate::testing::TestBot;

    // ─── Fixtures ───────────────────────────────────────────────────────────

    fn mod_cog(_: &ExtensionSetup) -> CogBuilder {
        CogBuilder::new("Mod")
            .command(CommandSpec::new("kick", || async { "kicked" }))
            .command(CommandSpec::new("settings_set_log_channel", || async {}))
            .command(CommandSpec::new("settings_get_log_channel", || async {}))
            .listener("member_join", || async {})
            .task(TaskSpec::new("do_sweep", |ctx: crate::task::TaskContext| async move {
                ctx.cancelled().await;
            }))
    }

    const MODERATION: ExtensionDescriptor = ExtensionDescriptor::new("moderation")
        .description("Moderation tools")
        .cogs(&[mod_cog]);

    fn first_cog(_: &ExtensionSetup) -> CogBuilder {
        CogBuilder::new("First")
            .command(CommandSpec::new("alpha", || async {}))
            .command(CommandSpec::new("beta_one", || async {}))
            .listener("ready", || async {})
    }

    fn clashing_cog(_: &ExtensionSetup) -> CogBuilder {
        CogBuilder::new("Second")
            .command(CommandSpec::new("gamma", || async {}))
            .command(CommandSpec::new("kick", || async {}))
    }

    /// Its second cog collides with `moderation`'s `kick`.
    const CLASHING: ExtensionDescriptor =
        ExtensionDescriptor::new("clashing").cogs(&[first_cog, clashing_cog]);

    fn config_for(names: &[&str]) -> CoreConfig {
        CoreConfig {
            grouping: crate::command::GroupingMode::Single,
            task_cancel_grace: Duration::from_millis(50),
            enabled_extensions: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    fn bot_with(descriptors: &[ExtensionDescriptor]) -> TestBot {
        let bot = TestBot::with_config(config_for(&[]));
        for descriptor in descriptors {
            bot.core.register_extension(*descriptor);
        }
        bot
    }

    // ─── Load / unload ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn moderation_builds_the_expected_tree() {
        let bot = bot_with(&[MODERATION]);
        assert_eq!(bot.core.load("moderation").await.unwrap(), LoadOutcome::Loaded);
        assert_eq!(bot.core.extension_state("moderation"), ExtensionState::Loaded);

        let registry = bot.core.registry();
        let tree = registry.commands();
        assert!(tree.get(&["kick".to_string()]).is_some());
        assert!(tree.is_synthesized(&["settings".to_string()]));
        let children: Vec<String> = tree
            .children(&["settings".to_string()])
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(children, vec!["get_log_channel", "set_log_channel"]);
    }

    #[tokio::test]
    async fn moderation_nests_every_underscore_by_default() {
        let bot = TestBot::with_config(CoreConfig {
            grouping: crate::command::GroupingMode::default(),
            ..config_for(&[])
        });
        bot.core.register_extension(MODERATION);
        bot.core.load("moderation").await.unwrap();

        assert_eq!(
            bot.core.registry_summary().commands,
            vec![
                "kick",
                "settings",
                "settings get",
                "settings get log",
                "settings get log channel",
                "settings set",
                "settings set log",
                "settings set log channel",
            ]
        );
        let registry = bot.core.registry();
        let tree = registry.commands();
        assert!(tree.get(&["settings".to_string(), "set_log_channel".to_string()]).is_none());
        assert!(tree.is_synthesized(&["settings".to_string(), "set".to_string(), "log".to_string()]));
    }

    #[tokio::test]
    async fn loading_twice_fails_without_side_effects() {
        let bot = bot_with(&[MODERATION]);
        bot.core.load("moderation").await.unwrap();
        let before = bot.core.registry_summary();

        let err = bot.core.load("moderation").await.unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyLoaded(ref n) if n == "moderation"));
        assert_eq!(bot.core.registry_summary(), before);
    }

    #[tokio::test]
    async fn unloading_an_unknown_extension_fails_without_side_effects() {
        let bot = bot_with(&[MODERATION]);
        bot.core.load("moderation").await.unwrap();
        let before = bot.core.registry_summary();

        let err = bot.core.unload("nonexistent").await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotLoaded(ref n) if n == "nonexistent"));
        assert_eq!(bot.core.registry_summary(), before);
    }

    #[tokio::test]
    async fn unknown_extension_is_not_found() {
        let bot = bot_with(&[]);
        let err = bot.core.load("nope").await.unwrap_err();
        assert!(matches!(err, LifecycleError::ExtensionNotFound(_)));
    }

    #[tokio::test]
    async fn failed_load_rolls_back_every_contribution() {
        let bot = bot_with(&[MODERATION, CLASHING]);
        bot.core.load("moderation").await.unwrap();
        let before = bot.core.registry_summary();

        let err = bot.core.load("clashing").await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Registry(RegistryError::CommandConflict {
                reason: ConflictReason::NameTaken,
                ..
            })
        ));

        let registry = bot.core.registry();
        assert!(!registry.has_extension("clashing"));
        assert!(!registry.has_contributions_of("clashing"));
        drop(registry);
        assert_eq!(bot.core.registry_summary(), before);
        assert_eq!(bot.core.extension_state("clashing"), ExtensionState::Unloaded);
    }

    #[tokio::test]
    async fn first_registration_keeps_working_after_a_conflict() {
        let bot = bot_with(&[MODERATION, CLASHING]);
        bot.core.load("moderation").await.unwrap();
        let _ = bot.core.load("clashing").await;

        let resolved = bot.core.registry().resolve(&["kick".to_string()]).unwrap();
        assert_eq!(resolved.command.extension(), Some("moderation"));
    }

    #[tokio::test]
    async fn unload_then_load_restores_the_same_shape() {
        let bot = bot_with(&[MODERATION]);
        bot.core.load("moderation").await.unwrap();
        let original = bot.core.registry_summary();

        bot.core.unload("moderation").await.unwrap();
        assert_eq!(bot.core.registry_summary(), RegistrySummary::default());

        bot.core.load("moderation").await.unwrap();
        assert_eq!(bot.core.registry_summary(), original);
    }

    #[tokio::test]
    async fn unload_cancels_tasks_and_runs_teardown() {
        static TORN_DOWN: AtomicBool = AtomicBool::new(false);

        fn teardown(_core: Arc<Core>) -> BoxFuture<'static, Result<(), BoxError>> {
            Box::pin(async {
                TORN_DOWN.store(true, Ordering::SeqCst);
                Err("teardown blew up".into())
            })
        }

        const TORN: ExtensionDescriptor = ExtensionDescriptor::new("torn")
            .cogs(&[mod_cog])
            .teardown(teardown);

        let bot = bot_with(&[TORN]);
        bot.core.load("torn").await.unwrap();
        let task = bot.core.registry().tasks_named("do_sweep").remove(0);

        bot.core.unload("torn").await.unwrap();
        assert!(task.is_finished());
        assert!(TORN_DOWN.load(Ordering::SeqCst));
        assert!(!bot.core.registry().has_extension("torn"));
    }

    #[tokio::test]
    async fn disabled_extensions_are_skipped() {
        let config = CoreConfig {
            disabled_extensions: ["moderation".to_string()].into(),
            ..Default::default()
        };
        let bot = TestBot::with_config(config);
        bot.core.register_extension(MODERATION);

        assert_eq!(bot.core.load("moderation").await.unwrap(), LoadOutcome::Disabled);
        assert!(!bot.core.registry().has_extension("moderation"));
    }

    #[tokio::test]
    async fn failed_setup_takes_back_core_registrations() {
        fn setup(setup: &mut ExtensionSetup) -> Result<(), BoxError> {
            setup.core().add_command(CommandSpec::new("leaked", || async {}))?;
            setup.core().add_listener("ready", || async {});
            setup.core().add_task(TaskSpec::new("do_leak", |ctx: crate::task::TaskContext| async move {
                ctx.cancelled().await;
            }));
            Err("half way through".into())
        }

        const HALF: ExtensionDescriptor = ExtensionDescriptor::new("half").setup(setup);

        let bot = bot_with(&[HALF]);
        let before = bot.core.registry_summary();

        let err = bot.core.load("half").await.unwrap_err();
        assert!(matches!(err, LifecycleError::Setup { .. }));
        assert_eq!(bot.core.registry_summary(), before);
        assert!(bot.core.registry().tasks_named("do_leak").is_empty());
        assert_eq!(bot.core.extension_state("half"), ExtensionState::Unloaded);
    }

    #[tokio::test]
    async fn core_registrations_during_setup_leave_with_the_extension() {
        fn setup(setup: &mut ExtensionSetup) -> Result<(), BoxError> {
            setup.core().add_command(CommandSpec::new("stats", || async {}))?;
            setup.core().add_listener("ready", || async {});
            Ok(())
        }

        const STATS: ExtensionDescriptor = ExtensionDescriptor::new("stats").setup(setup);

        let bot = bot_with(&[STATS]);
        bot.core.load("stats").await.unwrap();
        assert!(bot.core.registry().has_contributions_of("stats"));

        let resolved = bot.core.registry().resolve(&["stats".to_string()]).unwrap();
        assert_eq!(resolved.command.extension(), Some("stats"));
        // Core-level listener removal leaves extension listeners alone.
        assert_eq!(bot.core.remove_listener("ready"), 0);

        bot.core.unload("stats").await.unwrap();
        assert_eq!(bot.core.registry_summary(), RegistrySummary::default());
    }

    // ─── Settings, config and controllers ───────────────────────────────────

    struct Counter {
        start: u64,
    }

    fn counter_controller(
        ctx: ControllerContext,
    ) -> Result<Arc<dyn std::any::Any + Send + Sync>, BoxError> {
        let start = ctx
            .settings
            .as_ref()
            .and_then(|s| s.value().get("start").and_then(|v| v.as_u64()))
            .unwrap_or(0);
        Ok(Arc::new(Counter { start }))
    }

    #[tokio::test]
    async fn settings_and_controller_are_built_on_load() {
        const COUNTING: ExtensionDescriptor = ExtensionDescriptor::new("counting")
            .settings(|| json!({ "start": 3 }))
            .controller(counter_controller);

        let bot = bot_with(&[COUNTING]);
        bot.core.load("counting").await.unwrap();

        let controller = bot.core.get_controller::<Counter>("counting").unwrap();
        assert_eq!(controller.start, 3);
        assert!(bot.core.get_controller::<String>("counting").is_none());

        let settings = bot.core.get_settings("counting").unwrap();
        settings.set("start", &10).await.unwrap();

        bot.core.reload("counting").await.unwrap();
        assert_eq!(bot.core.get_controller::<Counter>("counting").unwrap().start, 10);
    }

    #[tokio::test]
    async fn setup_hook_receives_the_config_section() {
        static SEEN: AtomicUsize = AtomicUsize::new(0);

        fn setup(setup: &mut ExtensionSetup) -> Result<(), BoxError> {
            let limit = setup.config().get("limit").and_then(|v| v.as_u64()).unwrap_or(0);
            SEEN.store(limit as usize, Ordering::SeqCst);
            setup.add_command(CommandSpec::new("limits", || async {}));
            Ok(())
        }

        const LIMITS: ExtensionDescriptor = ExtensionDescriptor::new("limits").setup(setup);

        let mut config = config_for(&[]);
        config
            .extension_configs
            .insert("limits".to_string(), json!({ "limit": 7 }));
        let bot = TestBot::with_config(config);
        bot.core.register_extension(LIMITS);

        bot.core.load("limits").await.unwrap();
        assert_eq!(SEEN.load(Ordering::SeqCst), 7);
        assert_eq!(bot.core.registry_summary().commands, vec!["limits"]);
    }

    // ─── Reload ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn failed_reload_restores_the_previous_extension() {
        static BROKEN: AtomicBool = AtomicBool::new(false);

        fn setup(setup: &mut ExtensionSetup) -> Result<(), BoxError> {
            if BROKEN.load(Ordering::SeqCst) {
                return Err("syntax error".into());
            }
            setup.add_command(CommandSpec::new("flaky", || async { "ok" }));
            Ok(())
        }

        const FLAKY: ExtensionDescriptor = ExtensionDescriptor::new("flaky").setup(setup);

        let bot = bot_with(&[FLAKY]);
        bot.core.load("flaky").await.unwrap();
        let before = bot.core.registry_summary();

        BROKEN.store(true, Ordering::SeqCst);
        let err = bot.core.reload("flaky").await.unwrap_err();
        assert!(matches!(err, LifecycleError::Setup { .. }));
        assert_eq!(bot.core.extension_state("flaky"), ExtensionState::Loaded);
        assert_eq!(bot.core.registry_summary(), before);
    }

    #[tokio::test]
    async fn failed_restore_reports_both_errors() {
        static BROKEN: AtomicBool = AtomicBool::new(false);

        fn setup(setup: &mut ExtensionSetup) -> Result<(), BoxError> {
            if BROKEN.load(Ordering::SeqCst) {
                return Err("broken".into());
            }
            setup.add_command(CommandSpec::new("fragile", || async {}));
            Ok(())
        }

        // Leaves a core-level placeholder under the extension's command name.
        fn teardown(core: Arc<Core>) -> BoxFuture<'static, Result<(), BoxError>> {
            Box::pin(async move {
                core.add_command(CommandSpec::new("fragile", || async { "Down for maintenance." }))?;
                Ok(())
            })
        }

        const FRAGILE: ExtensionDescriptor = ExtensionDescriptor::new("fragile")
            .setup(setup)
            .teardown(teardown);

        let bot = bot_with(&[FRAGILE]);
        bot.core.load("fragile").await.unwrap();

        BROKEN.store(true, Ordering::SeqCst);
        let err = bot.core.reload("fragile").await.unwrap_err();
        match err {
            LifecycleError::RestoreFailed {
                extension,
                reload,
                restore,
            } => {
                assert_eq!(extension, "fragile");
                assert!(matches!(*reload, LifecycleError::Setup { .. }));
                assert!(matches!(*restore, LifecycleError::Registry(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(bot.core.extension_state("fragile"), ExtensionState::Unloaded);
        assert!(!bot.core.registry().has_extension("fragile"));

        let placeholder = bot.core.registry().resolve(&["fragile".to_string()]).unwrap();
        assert_eq!(placeholder.command.extension(), None);
    }

    #[tokio::test]
    async fn reloading_an_unloaded_extension_fails() {
        let bot = bot_with(&[MODERATION]);
        let err = bot.core.reload("moderation").await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotLoaded(_)));
    }

    // ─── Dependency-ordered boot ────────────────────────────────────────────

    const BASE: ExtensionDescriptor = ExtensionDescriptor::new("base");
    const MIDDLE: ExtensionDescriptor = ExtensionDescriptor::new("middle").depends_on(&["base"]);
    const TOP: ExtensionDescriptor = ExtensionDescriptor::new("top").depends_on(&["middle", "base"]);
    const LOOP_A: ExtensionDescriptor = ExtensionDescriptor::new("loop_a").depends_on(&["loop_b"]);
    const LOOP_B: ExtensionDescriptor = ExtensionDescriptor::new("loop_b").depends_on(&["loop_a"]);
    const ORPHAN: ExtensionDescriptor = ExtensionDescriptor::new("orphan").depends_on(&["ghost"]);

    #[test]
    fn layers_follow_dependencies() {
        let (layers, stuck) = topological_layers(&[TOP, MIDDLE, BASE]);
        assert_eq!(layers, vec![vec![2], vec![1], vec![0]]);
        assert!(stuck.is_empty());

        let (layers, stuck) = topological_layers(&[BASE, LOOP_A, LOOP_B]);
        assert_eq!(layers, vec![vec![0]]);
        assert_eq!(stuck, vec![1, 2]);
    }

    #[tokio::test]
    async fn load_all_orders_by_dependency_and_isolates_failures() {
        let bot = bot_with(&[BASE, MIDDLE, TOP, LOOP_A, LOOP_B, ORPHAN]);
        let names: Vec<String> = ["top", "loop_a", "middle", "orphan", "base", "loop_b", "missing"]
            .iter()
            .map(|n| n.to_string())
            .collect();

        let report = bot.core.load_all(&names).await;
        assert_eq!(report.loaded, vec!["base", "middle", "top"]);
        assert_eq!(bot.core.registry().load_order(), ["base", "middle", "top"]);

        let mut failed: Vec<&str> = report.failed.iter().map(|(n, _)| n.as_str()).collect();
        failed.sort_unstable();
        assert_eq!(failed, vec!["loop_a", "loop_b", "missing", "orphan"]);
        assert!(report.failed.iter().any(|(n, e)| n == "orphan"
            && matches!(e, LifecycleError::MissingDependency { dependency, .. } if dependency == "ghost")));
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn shutdown_unloads_in_reverse_order() {
        static ORDER: parking_lot::Mutex<Vec<&'static str>> = parking_lot::Mutex::new(Vec::new());

        fn base_down(_: Arc<Core>) -> BoxFuture<'static, Result<(), BoxError>> {
            Box::pin(async {
                ORDER.lock().push("base");
                Ok(())
            })
        }
        fn top_down(_: Arc<Core>) -> BoxFuture<'static, Result<(), BoxError>> {
            Box::pin(async {
                ORDER.lock().push("top");
                Ok(())
            })
        }

        const DOWN_BASE: ExtensionDescriptor = ExtensionDescriptor::new("down_base").teardown(base_down);
        const DOWN_TOP: ExtensionDescriptor = ExtensionDescriptor::new("down_top")
            .depends_on(&["down_base"])
            .teardown(top_down);

        let bot = bot_with(&[DOWN_TOP, DOWN_BASE]);
        let report = bot
            .core
            .load_all(&["down_top".to_string(), "down_base".to_string()])
            .await;
        assert!(report.is_success());

        bot.core.shutdown().await;
        assert_eq!(*ORDER.lock(), vec!["top", "base"]);
        assert!(bot.core.registry().load_order().is_empty());
    }
}
