//! The registry: every loaded extension and everything it contributed.
//!
//! The registry is the single piece of mutable shared state of a running
//! bot. It lives behind a `parking_lot::RwLock` inside [`Core`]:
//!
//! - **Writers** (the lifecycle manager and the `Core::add_*` helpers) hold
//!   the write lock for exactly one operation. No operation awaits, so a
//!   mutation is never observed half-done.
//! - **Readers** (the dispatcher) take short read locks to resolve a command
//!   or snapshot the listeners of an event, then release the lock before any
//!   handler runs.
//!
//! Invariant: the command tree, the listener map and the task table contain
//! contributions from exactly the set of registered extensions (plus
//! contributions made directly on the core).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::command::{Check, Command, CommandSpec, CommandTree, GroupingMode, Owner, Resolved, split_name};
use crate::core::Core;
use crate::error::{RegistryError, RegistryResult};
use crate::extension::Extension;
use crate::handler::BoxedService;
use crate::task::{self, TaskHandle, TaskSpec};

// =============================================================================
// Contributions
// =============================================================================

/// A command waiting to be mounted.
#[derive(Clone)]
pub(crate) struct PendingCommand {
    pub(crate) spec: CommandSpec,
    pub(crate) owner: Owner,
    /// Cog-level checks, run before the command's own.
    pub(crate) checks: Vec<Check>,
}

/// A task waiting to be scheduled.
#[derive(Clone)]
pub(crate) struct PendingTask {
    pub(crate) spec: TaskSpec,
    pub(crate) owner: Owner,
}

/// A handler bound to an event name.
#[derive(Clone)]
pub struct Listener {
    event: String,
    service: BoxedService,
    owner: Option<Owner>,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("event", &self.event)
            .field("extension", &self.extension())
            .finish_non_exhaustive()
    }
}

impl Listener {
    pub(crate) fn new(event: String, service: BoxedService, owner: Option<Owner>) -> Self {
        Self {
            event,
            service,
            owner,
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn extension(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.extension.as_str())
    }

    pub fn owner(&self) -> Option<&Owner> {
        self.owner.as_ref()
    }

    pub fn service(&self) -> &BoxedService {
        &self.service
    }
}

/// Everything one load of an extension registers.
///
/// Kept on the [`Extension`] so a failed reload can put the previous
/// contributions back.
#[derive(Clone, Default)]
pub struct Contributions {
    pub(crate) commands: Vec<PendingCommand>,
    pub(crate) listeners: Vec<Listener>,
    pub(crate) tasks: Vec<PendingTask>,
}

impl fmt::Debug for Contributions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contributions")
            .field("commands", &self.commands.len())
            .field("listeners", &self.listeners.len())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl Contributions {
    pub(crate) fn extend(&mut self, other: Contributions) {
        self.commands.extend(other.commands);
        self.listeners.extend(other.listeners);
        self.tasks.extend(other.tasks);
    }

    /// Declared command names, in registration order.
    pub fn command_names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.spec.name()).collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

// =============================================================================
// Summary
// =============================================================================

/// Point-in-time view of the registry contents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistrySummary {
    /// Loaded extensions in load order.
    pub extensions: Vec<String>,
    /// Qualified names of every command node, depth-first.
    pub commands: Vec<String>,
    /// Listener count per event name.
    pub listeners: BTreeMap<String, usize>,
    /// Names of running tasks, sorted.
    pub tasks: Vec<String>,
}

/// Commands, listeners and tasks attributed to one extension, taken out of
/// the registry.
#[derive(Debug, Default)]
pub struct Taken {
    pub commands: Vec<Arc<Command>>,
    pub listeners: usize,
    /// Handles of the extension's tasks; the caller cancels them.
    pub tasks: Vec<Arc<TaskHandle>>,
}

impl Taken {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.listeners == 0 && self.tasks.is_empty()
    }
}

/// What [`Registry::remove_extension`] took out.
#[derive(Debug)]
pub struct Detached {
    pub extension: Arc<Extension>,
    pub commands: Vec<Arc<Command>>,
    pub listeners: usize,
    /// Handles of the extension's tasks; the caller cancels them.
    pub tasks: Vec<Arc<TaskHandle>>,
}

// =============================================================================
// Registry
// =============================================================================

/// Process-wide table of extensions, commands, listeners and tasks.
#[derive(Debug)]
pub struct Registry {
    grouping: GroupingMode,
    extensions: HashMap<String, Arc<Extension>>,
    load_order: Vec<String>,
    commands: CommandTree,
    listeners: HashMap<String, Vec<Listener>>,
    tasks: HashMap<String, Vec<Arc<TaskHandle>>>,
}

impl Registry {
    pub fn new(grouping: GroupingMode) -> Self {
        Self {
            grouping,
            extensions: HashMap::new(),
            load_order: Vec::new(),
            commands: CommandTree::new(),
            listeners: HashMap::new(),
            tasks: HashMap::new(),
        }
    }

    // ─── Extensions ─────────────────────────────────────────────────────────

    /// Registers `extension` with all of `contributions`.
    ///
    /// Commands are mounted first, in order. If any of them is rejected,
    /// every command mounted by this call is removed again and nothing else is
    /// registered. Listeners, the extension entry and finally the tasks
    /// follow; none of those steps can fail.
    pub(crate) fn add_extension(
        &mut self,
        core: &Arc<Core>,
        extension: Arc<Extension>,
        contributions: &Contributions,
    ) -> RegistryResult<()> {
        let name = extension.name().to_string();
        if self.extensions.contains_key(&name) {
            return Err(RegistryError::AlreadyLoaded(name));
        }

        for pending in &contributions.commands {
            if let Err(e) = self.add_command(&pending.spec, Some(pending.owner.clone()), &pending.checks) {
                let rolled_back = self.commands.remove_owned_by(&name);
                warn!(
                    extension = %name,
                    command = %pending.spec.name(),
                    rolled_back = rolled_back.len(),
                    error = %e,
                    "Command registration failed, rolled back extension commands"
                );
                return Err(e);
            }
        }

        for listener in &contributions.listeners {
            self.listeners
                .entry(listener.event.clone())
                .or_default()
                .push(listener.clone());
        }

        self.extensions.insert(name.clone(), extension);
        self.load_order.push(name);

        for pending in &contributions.tasks {
            self.add_task(core, pending.spec.clone(), Some(pending.owner.clone()));
        }
        Ok(())
    }

    /// Removes `name` and everything attributed to it.
    ///
    /// Commands go first so no further invocation reaches the extension,
    /// then listeners, then tasks (returned for the caller to cancel), then
    /// the extension entry.
    pub(crate) fn remove_extension(&mut self, name: &str) -> RegistryResult<Detached> {
        if !self.extensions.contains_key(name) {
            return Err(RegistryError::NotLoaded(name.to_string()));
        }

        let Taken {
            commands,
            listeners,
            tasks,
        } = self.take_contributions_of(name);

        self.load_order.retain(|n| n != name);
        let extension = self
            .extensions
            .remove(name)
            .ok_or_else(|| RegistryError::NotLoaded(name.to_string()))?;

        Ok(Detached {
            extension,
            commands,
            listeners,
            tasks,
        })
    }

    /// Removes every command, listener and task attributed to `extension`,
    /// in that order, whether or not the extension entry exists.
    pub(crate) fn take_contributions_of(&mut self, extension: &str) -> Taken {
        let commands = self.commands.remove_owned_by(extension);

        let mut listeners = 0;
        self.listeners.retain(|_, bound| {
            let before = bound.len();
            bound.retain(|l| l.extension() != Some(extension));
            listeners += before - bound.len();
            !bound.is_empty()
        });

        let mut tasks = Vec::new();
        self.tasks.retain(|_, handles| {
            let (owned, rest): (Vec<_>, Vec<_>) = handles
                .drain(..)
                .partition(|h| h.extension() == Some(extension));
            tasks.extend(owned);
            *handles = rest;
            !handles.is_empty()
        });

        Taken {
            commands,
            listeners,
            tasks,
        }
    }

    pub fn get_extension(&self, name: &str) -> Option<Arc<Extension>> {
        self.extensions.get(name).cloned()
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains_key(name)
    }

    /// Loaded extension names in load order.
    pub fn load_order(&self) -> &[String] {
        &self.load_order
    }

    // ─── Commands ───────────────────────────────────────────────────────────

    /// Resolves `spec`'s flat name and mounts it.
    pub fn add_command(
        &mut self,
        spec: &CommandSpec,
        owner: Option<Owner>,
        inherited: &[Check],
    ) -> RegistryResult<Arc<Command>> {
        let path = split_name(spec.name(), self.grouping)
            .map_err(|reason| RegistryError::invalid_name(spec.name(), reason))?;
        let command = self.commands.insert(spec.build(path, owner, inherited))?;
        debug!(
            command = %command.qualified_name(),
            extension = command.extension().unwrap_or("-"),
            "Command registered"
        );
        Ok(command)
    }

    /// Removes the command declared as `name` (and its subcommands).
    pub fn remove_command(&mut self, name: &str) -> Option<Arc<Command>> {
        let path = split_name(name, self.grouping).ok()?;
        self.commands.remove(&path)
    }

    pub fn resolve(&self, words: &[String]) -> Option<Resolved> {
        self.commands.resolve(words)
    }

    pub fn commands(&self) -> &CommandTree {
        &self.commands
    }

    // ─── Listeners ──────────────────────────────────────────────────────────

    /// Binds a listener. Never fails.
    pub fn add_listener(&mut self, event: impl Into<String>, service: BoxedService, owner: Option<Owner>) {
        let event = event.into();
        self.listeners
            .entry(event.clone())
            .or_default()
            .push(Listener::new(event, service, owner));
    }

    /// Removes the core-level listeners of `event`; extension listeners stay.
    pub fn remove_listeners(&mut self, event: &str) -> usize {
        let Some(bound) = self.listeners.get_mut(event) else {
            return 0;
        };
        let before = bound.len();
        bound.retain(|l| l.owner.is_some());
        let removed = before - bound.len();
        if bound.is_empty() {
            self.listeners.remove(event);
        }
        removed
    }

    /// Snapshot of the listeners bound to `event`.
    pub fn listeners_for(&self, event: &str) -> Vec<Listener> {
        self.listeners.get(event).cloned().unwrap_or_default()
    }

    // ─── Tasks ──────────────────────────────────────────────────────────────

    /// Schedules `spec`, or returns the running task of the same name when
    /// the task spec is unique.
    pub(crate) fn add_task(&mut self, core: &Arc<Core>, spec: TaskSpec, owner: Option<Owner>) -> Arc<TaskHandle> {
        let running = self.tasks.entry(spec.name().to_string()).or_default();
        running.retain(|h| !h.is_finished());
        if spec.is_unique()
            && let Some(existing) = running.first()
        {
            debug!(task = %spec.name(), "Unique task already running, keeping the original");
            return Arc::clone(existing);
        }
        info!(
            task = %spec.name(),
            extension = owner.as_ref().map(|o| o.extension.as_str()).unwrap_or("-"),
            "Task scheduled"
        );
        let handle = task::spawn(core, spec, owner);
        running.push(Arc::clone(&handle));
        handle
    }

    /// Running task handles named `name`.
    pub fn tasks_named(&self, name: &str) -> Vec<Arc<TaskHandle>> {
        self.tasks
            .get(name)
            .map(|hs| hs.iter().filter(|h| !h.is_finished()).cloned().collect())
            .unwrap_or_default()
    }

    /// Takes every task handle out of the table.
    pub(crate) fn drain_tasks(&mut self) -> Vec<Arc<TaskHandle>> {
        self.tasks.drain().flat_map(|(_, hs)| hs).collect()
    }

    // ─── Introspection ──────────────────────────────────────────────────────

    /// Returns `true` if any command, listener or task is attributed to
    /// `extension`.
    pub fn has_contributions_of(&self, extension: &str) -> bool {
        self.commands.has_commands_of(extension)
            || self
                .listeners
                .values()
                .flatten()
                .any(|l| l.extension() == Some(extension))
            || self
                .tasks
                .values()
                .flatten()
                .any(|h| h.extension() == Some(extension))
    }

    pub fn summary(&self) -> RegistrySummary {
        let mut tasks: Vec<String> = self
            .tasks
            .values()
            .flatten()
            .filter(|h| !h.is_finished())
            .map(|h| h.name().to_string())
            .collect();
        tasks.sort();
        RegistrySummary {
            extensions: self.load_order.clone(),
            commands: self.commands.shape(),
            listeners: self
                .listeners
                .iter()
                .map(|(event, bound)| (event.clone(), bound.len()))
                .collect(),
            tasks,
        }
    }
}
