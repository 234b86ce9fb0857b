//! Cogs: the unit extensions group commands, listeners and tasks into.
//!
//! A cog is declared with a [`CogBuilder`] and instantiated once per load of
//! its extension. Instantiation produces a [`CogHandle`], which commands,
//! listeners and tasks of the cog keep as their owner so handlers can reach
//! the cog's state.
//!
//! ```rust,ignore
//! struct Moderation {
//!     log_channel: Mutex<Option<u64>>,
//! }
//!
//! fn moderation_cog(setup: &ExtensionSetup) -> CogBuilder {
//!     CogBuilder::of::<Moderation>()
//!         .state(Moderation { log_channel: Mutex::new(None) })
//!         .check(guild_only())
//!         .command(CommandSpec::new("kick", kick))
//!         .command(CommandSpec::new("settings_set_log_channel", set_log_channel))
//!         .listener("member_join", greet)
//!         .auto_task("do_sweep", sweep)
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::command::{Check, CommandSpec, Owner};
use crate::handler::{Handler, into_service};
use crate::registry::{Contributions, Listener, PendingCommand, PendingTask};
use crate::task::{TaskContext, TaskOutput, TaskSpec};

// =============================================================================
// CogHandle
// =============================================================================

/// A live cog instance.
pub struct CogHandle {
    name: String,
    extension: String,
    qualified_name: String,
    state: Option<Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for CogHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CogHandle")
            .field("qualified_name", &self.qualified_name)
            .field("has_state", &self.state.is_some())
            .finish()
    }
}

impl CogHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `extension.cog`
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// The cog's state, if it holds a `T`.
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(self.state.as_ref()?).downcast::<T>().ok()
    }
}

// =============================================================================
// CogBuilder
// =============================================================================

/// Declaration of a cog.
#[derive(Clone)]
pub struct CogBuilder {
    name: String,
    state: Option<Arc<dyn Any + Send + Sync>>,
    checks: Vec<Check>,
    commands: Vec<CommandSpec>,
    listeners: Vec<(String, crate::handler::BoxedService)>,
    tasks: Vec<TaskSpec>,
}

impl fmt::Debug for CogBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CogBuilder")
            .field("name", &self.name)
            .field("commands", &self.commands.len())
            .field("listeners", &self.listeners.len())
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl CogBuilder {
    /// Starts a cog named after `type_name` in snake_case (`ModTools` →
    /// `mod_tools`).
    pub fn new(type_name: &str) -> Self {
        Self {
            name: snake_case(type_name),
            state: None,
            checks: Vec::new(),
            commands: Vec::new(),
            listeners: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Starts a cog named after the type `T`.
    pub fn of<T: ?Sized>() -> Self {
        let full = std::any::type_name::<T>();
        let short = full.rsplit("::").next().unwrap_or(full);
        Self::new(short)
    }

    /// Attaches state reachable through the `State<T>` extractor.
    pub fn state<T: Send + Sync + 'static>(mut self, state: T) -> Self {
        self.state = Some(Arc::new(state));
        self
    }

    /// Adds a check run before every command of this cog.
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    /// Adds a command; commands register in the order they are added.
    pub fn command(mut self, spec: CommandSpec) -> Self {
        self.commands.push(spec);
        self
    }

    /// Binds `handler` to the event called `event`.
    pub fn listener<H, T>(mut self, event: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T>,
        T: Send + 'static,
    {
        self.listeners.push((event.into(), into_service(handler)));
        self
    }

    /// Adds a background task started when the cog is registered.
    pub fn task(mut self, spec: TaskSpec) -> Self {
        self.tasks.push(spec);
        self
    }

    /// Adds a unique task that resumes after every unexpected disconnect.
    pub fn auto_task<F, Fut, R>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: TaskOutput,
    {
        self.task(TaskSpec::new(name, body).resume_always())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instantiates the cog for `extension`.
    pub(crate) fn instantiate(self, extension: &str) -> (Arc<CogHandle>, Contributions) {
        let handle = Arc::new(CogHandle {
            qualified_name: format!("{extension}.{}", self.name),
            name: self.name,
            extension: extension.to_string(),
            state: self.state,
        });
        let owner = Owner::cog(Arc::clone(&handle));

        let contributions = Contributions {
            commands: self
                .commands
                .into_iter()
                .map(|spec| PendingCommand {
                    spec,
                    owner: owner.clone(),
                    checks: self.checks.clone(),
                })
                .collect(),
            listeners: self
                .listeners
                .into_iter()
                .map(|(event, service)| Listener::new(event, service, Some(owner.clone())))
                .collect(),
            tasks: self
                .tasks
                .into_iter()
                .map(|spec| PendingTask {
                    spec,
                    owner: owner.clone(),
                })
                .collect(),
        };
        (handle, contributions)
    }
}

/// `ModTools` → `mod_tools`, `HTTPCache` → `http_cache`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
