//! Process-level orchestration of a Hero bot.
//!
//! [`HeroRuntime`] owns the [`Core`] and drives it through its whole life:
//!
//! 1. load and validate the configuration, install logging
//! 2. boot the configured extensions (dependency order, `essentials` first)
//! 3. connect the gateway and pump its events into the dispatcher
//! 4. wait for Ctrl+C / SIGTERM
//! 5. unload every extension in reverse order and close the gateway
//!
//! # Example
//!
//! ```rust,ignore
//! use hero_runtime::HeroRuntime;
//!
//! let runtime = HeroRuntime::builder(gateway)
//!     .config_file("hero.toml")
//!     .extension(moderation::DESCRIPTOR)
//!     .build()?;
//!
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use hero_core::{BoxedGateway, Dispatcher, EventSink, EventStream, Store};
use hero_framework::{BootReport, Core, EventDispatcher, ExtensionDescriptor};
use tokio::signal;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, HeroConfig, Profile, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging::{self, LoggingGuard};

/// A configured Hero bot, ready to run.
pub struct HeroRuntime {
    config: HeroConfig,
    core: Arc<Core>,
    /// Drains the gateway's event stream while running.
    pump: Mutex<Option<JoinHandle<()>>>,
    _logging: Option<LoggingGuard>,
}

impl std::fmt::Debug for HeroRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeroRuntime")
            .field("profile", &self.config.profile)
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl HeroRuntime {
    /// Starts building a runtime that talks to the platform through `gateway`.
    pub fn builder(gateway: BoxedGateway) -> RuntimeBuilder {
        RuntimeBuilder::new(gateway)
    }

    /// Builds a runtime from an already loaded configuration.
    pub fn from_config(config: HeroConfig, gateway: BoxedGateway) -> RuntimeResult<Self> {
        RuntimeBuilder::new(gateway).config(config).build()
    }

    pub fn config(&self) -> &HeroConfig {
        &self.config
    }

    pub fn core(&self) -> &Arc<Core> {
        &self.core
    }

    /// Boots the extensions, then connects the gateway.
    ///
    /// Extensions that fail to load are reported in the returned
    /// [`BootReport`] and do not stop the bot.
    pub async fn start(&self) -> RuntimeResult<BootReport> {
        let mut pump = self.pump.lock().await;
        if pump.is_some() {
            return Err(RuntimeError::AlreadyRunning);
        }

        info!(
            gateway = self.core.gateway().name(),
            profile = %self.config.profile,
            "Starting Hero runtime"
        );

        let report = self.core.boot().await;
        if !report.is_success() {
            let failed: Vec<&str> = report.failed.iter().map(|(name, _)| name.as_str()).collect();
            warn!(?failed, "Some extensions failed to load");
        }

        let (sink, stream) = EventSink::channel();
        let handle = tokio::spawn(pump_events(stream, self.core.dispatcher()));

        let gateway = Arc::clone(self.core.gateway());
        if let Err(e) = gateway.connect(sink, self.core.monitor().clone()).await {
            error!(error = %e, "Gateway failed to connect");
            handle.abort();
            self.core.shutdown().await;
            return Err(e.into());
        }

        *pump = Some(handle);
        info!("Runtime started");
        Ok(report)
    }

    /// Unloads every extension and closes the gateway.
    pub async fn stop(&self) -> RuntimeResult<()> {
        let Some(pump) = self.pump.lock().await.take() else {
            warn!("Runtime is not running");
            return Ok(());
        };

        info!("Stopping Hero runtime");
        pump.abort();
        self.core.shutdown().await;
        self.core.gateway().close().await?;
        info!("Runtime stopped");

        Ok(())
    }

    /// Runs until a shutdown signal is received.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("Hero is now running. Press Ctrl+C to stop.");
        shutdown_signal().await;
        self.stop().await
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await
    }
}

async fn pump_events(mut stream: EventStream, dispatcher: EventDispatcher) {
    while let Some(event) = stream.next().await {
        dispatcher.dispatch(event).await;
    }
    debug!("Event stream closed");
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal as unix_signal};

        match unix_signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Cannot listen for SIGTERM, only Ctrl+C stops the bot"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Cannot listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

enum ConfigSource {
    Loader(ConfigLoader),
    Ready(Box<HeroConfig>),
}

/// Builder for a [`HeroRuntime`].
pub struct RuntimeBuilder {
    gateway: BoxedGateway,
    source: ConfigSource,
    extensions: Vec<ExtensionDescriptor>,
    store: Option<Arc<dyn Store>>,
    init_logging: bool,
}

impl RuntimeBuilder {
    pub fn new(gateway: BoxedGateway) -> Self {
        Self {
            gateway,
            source: ConfigSource::Loader(ConfigLoader::new()),
            extensions: Vec::new(),
            store: None,
            init_logging: true,
        }
    }

    fn map_loader(mut self, f: impl FnOnce(ConfigLoader) -> ConfigLoader) -> Self {
        self.source = match self.source {
            ConfigSource::Loader(loader) => ConfigSource::Loader(f(loader)),
            ready => ready,
        };
        self
    }

    /// Loads this file instead of searching for `hero.toml`.
    pub fn config_file<P: AsRef<Path>>(self, path: P) -> Self {
        self.map_loader(|loader| loader.file(path))
    }

    pub fn profile(self, profile: Profile) -> Self {
        self.map_loader(|loader| loader.profile(profile))
    }

    pub fn search_path<P: AsRef<Path>>(self, path: P) -> Self {
        self.map_loader(|loader| loader.search_path(path))
    }

    pub fn without_env(self) -> Self {
        self.map_loader(ConfigLoader::without_env)
    }

    /// Uses `config` as is; no file or environment is read.
    pub fn config(mut self, config: HeroConfig) -> Self {
        self.source = ConfigSource::Ready(Box::new(config));
        self
    }

    /// Registers a project-local extension. Local extensions shadow bundled
    /// ones of the same name.
    pub fn extension(mut self, descriptor: ExtensionDescriptor) -> Self {
        self.extensions.push(descriptor);
        self
    }

    /// Replaces the backend chosen by `store.backend`.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Leaves the global `tracing` subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn build(self) -> RuntimeResult<HeroRuntime> {
        let config = match self.source {
            ConfigSource::Loader(loader) => loader.load()?,
            ConfigSource::Ready(config) => *config,
        };
        validate_config(&config)?;

        let logging = if self.init_logging {
            logging::init_from_config(&config.logging)
        } else {
            None
        };

        let mut builder = Core::builder(config.core_config(), self.gateway);
        if let Some(store) = self.store {
            builder = builder.store(store);
        }
        for descriptor in self.extensions {
            builder = builder.extension(descriptor);
        }
        let core = builder.build();

        info!(
            profile = %config.profile,
            namespace = %config.bot.namespace,
            extensions = core.config().enabled_extensions.len(),
            "Runtime initialized from configuration"
        );

        Ok(HeroRuntime {
            config,
            core,
            pump: Mutex::new(None),
            _logging: logging,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hero_core::{Author, GatewayEvent, MessagePayload, RecordingGateway};
    use hero_framework::{CogBuilder, CommandSpec, ExtensionSetup, ExtensionState};

    use super::*;
    use crate::config::ConfigError;

    async fn hello() -> &'static str {
        "Hello there."
    }

    fn greeter(_: &ExtensionSetup) -> CogBuilder {
        CogBuilder::new("Greeter").command(CommandSpec::new("hello", hello))
    }

    const GREETER: ExtensionDescriptor = ExtensionDescriptor::new("greeter").cogs(&[greeter]);

    fn message(content: &str) -> GatewayEvent {
        GatewayEvent::message(&MessagePayload {
            id: 1,
            author: Author {
                id: 42,
                name: "tester".into(),
                bot: false,
            },
            channel_id: 9,
            guild_id: Some(5),
            content: content.into(),
        })
    }

    fn runtime(gateway: &Arc<RecordingGateway>, config: HeroConfig) -> RuntimeResult<HeroRuntime> {
        HeroRuntime::builder(gateway.clone())
            .config(config)
            .extension(GREETER)
            .without_logging()
            .build()
    }

    async fn replies(gateway: &RecordingGateway, count: usize) -> Vec<String> {
        for _ in 0..200 {
            if gateway.sent().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        gateway.sent_contents()
    }

    #[tokio::test]
    async fn boots_routes_and_shuts_down() {
        let gateway = RecordingGateway::new();
        let mut config = HeroConfig::default();
        config.extensions.enabled = vec!["greeter".into()];
        let runtime = runtime(&gateway, config).unwrap();

        let report = runtime.start().await.unwrap();
        assert!(report.is_success());
        assert!(report.loaded.contains(&"greeter".to_string()));
        assert!(runtime.core().monitor().is_ready());

        gateway.inject(message("!hello")).unwrap();
        assert_eq!(replies(&gateway, 1).await, vec!["Hello there."]);

        runtime.stop().await.unwrap();
        assert_eq!(
            runtime.core().extension_state("greeter"),
            ExtensionState::Unloaded
        );
        assert!(runtime.core().monitor().is_closed());
        assert!(gateway.inject(message("!hello")).is_err());
    }

    #[cfg(feature = "builtin-extensions")]
    #[tokio::test]
    async fn essentials_is_loaded_first() {
        let gateway = RecordingGateway::new();
        let mut config = HeroConfig::default();
        config.extensions.enabled = vec!["greeter".into()];
        let runtime = runtime(&gateway, config).unwrap();

        let report = runtime.start().await.unwrap();
        assert_eq!(report.loaded, vec!["essentials", "greeter"]);

        gateway.inject(message("!ping")).unwrap();
        assert!(replies(&gateway, 1).await[0].starts_with("Pong."));
        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_extensions_do_not_stop_the_boot() {
        let gateway = RecordingGateway::new();
        let mut config = HeroConfig::default();
        config.extensions.enabled = vec!["nope".into(), "greeter".into()];
        let runtime = runtime(&gateway, config).unwrap();

        let report = runtime.start().await.unwrap();
        assert!(report.loaded.contains(&"greeter".to_string()));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "nope");
        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let gateway = RecordingGateway::new();
        let runtime = runtime(&gateway, HeroConfig::default()).unwrap();
        runtime.start().await.unwrap();
        assert!(matches!(
            runtime.start().await,
            Err(RuntimeError::AlreadyRunning)
        ));
        runtime.stop().await.unwrap();
        // Stopping twice is harmless.
        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unsupported_backend_is_fatal() {
        let gateway = RecordingGateway::new();
        let mut config = HeroConfig::default();
        config.cache.backend = "redis".into();
        assert!(matches!(
            runtime(&gateway, config),
            Err(RuntimeError::Config(ConfigError::UnsupportedBackend { .. }))
        ));
    }

    #[tokio::test]
    async fn run_until_stops_when_the_future_completes() {
        let gateway = RecordingGateway::new();
        let runtime = runtime(&gateway, HeroConfig::default()).unwrap();
        runtime.run_until(async {}).await.unwrap();
        assert!(runtime.core().monitor().is_closed());
    }
}
