//! Main runtime orchestration.
//!
//! The runtime owns the adapter registry, builds the dispatch controller
//! from configuration, starts every adapter with an [`AdapterContext`],
//! collects their inbound endpoints and serves them all on one HTTP server.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use switchboard_runtime::SwitchboardRuntime;
//!
//! // Simplest way - auto-loads config from current directory
//! let runtime = SwitchboardRuntime::new();
//!
//! // Custom configuration path
//! let runtime = SwitchboardRuntime::builder()
//!     .config_file("config/switchboard.yaml")
//!     .build()?;
//!
//! // Use pre-loaded config
//! let config = load_config()?;
//! let runtime = SwitchboardRuntime::from_config(&config);
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use switchboard_core::{
    AdapterContext, AdapterRegistry, BotEngine, BoxedAdapter, BoxedBotLogic, BoxedClassifier,
    BoxedStore, BoxedUserLock, ConfigurableAdapter, DispatchController, EndpointRegistrar,
    InMemoryStore, InMemoryUserLock, ListenerHandle, TransportContext,
};
use tokio::signal;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, ConfigResult, SwitchboardConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Resources held while the runtime is running.
struct Running {
    shutdown: CancellationToken,
    listener: Option<ListenerHandle>,
    tasks: Vec<JoinHandle<()>>,
}

/// The main Switchboard runtime.
///
/// # Simple Usage
///
/// ```rust,ignore
/// use switchboard_runtime::SwitchboardRuntime;
///
/// // Auto-loads config from switchboard.toml in current directory
/// let runtime = SwitchboardRuntime::new();
///
/// runtime.set_bot_logic(Arc::new(MyBot)).await;
/// runtime.register_adapter::<RestAdapter>().await?;
/// runtime.run().await?;
/// ```
///
/// # Custom Configuration
///
/// ```rust,ignore
/// let runtime = SwitchboardRuntime::builder()
///     .config_file("config/production.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct SwitchboardRuntime {
    /// The configuration.
    config: SwitchboardConfig,
    /// Adapters by application id, read by every dispatch.
    registry: Arc<AdapterRegistry>,
    /// Adapters in registration order.
    adapters: RwLock<Vec<BoxedAdapter>>,
    /// Transport context.
    transport_context: RwLock<TransportContext>,
    /// Conversation store.
    store: RwLock<BoxedStore>,
    /// Per-user lock.
    user_lock: RwLock<BoxedUserLock>,
    /// Bot logic run for every event.
    bot_logic: RwLock<Option<BoxedBotLogic>>,
    /// Optional classifier handed to the bot logic.
    classifier: RwLock<Option<BoxedClassifier>>,
    /// Dispatch controller (populated by `init`).
    controller: RwLock<Option<Arc<DispatchController>>>,
    /// Running state.
    running: Mutex<Option<Running>>,
    /// Address the HTTP server is bound to.
    local_addr: RwLock<Option<SocketAddr>>,
}

impl SwitchboardRuntime {
    /// Creates a new runtime with automatic configuration loading.
    ///
    /// If no configuration file is found, default settings are used.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                SwitchboardConfig::default()
            });

        Self::from_config(&config)
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a new runtime from configuration.
    ///
    /// Initializes logging, and a transport context with every capability
    /// compiled in.
    pub fn from_config(config: &SwitchboardConfig) -> Self {
        logging::init_from_config(&config.logging);

        let transport_ctx = Self::create_default_transport_context();
        let store: BoxedStore = Arc::new(InMemoryStore::with_settings(config.store.to_settings()));

        info!(
            log_level = %config.logging.level,
            bind = %config.server.bind,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            registry: Arc::new(AdapterRegistry::new()),
            adapters: RwLock::new(Vec::new()),
            transport_context: RwLock::new(transport_ctx),
            store: RwLock::new(store),
            user_lock: RwLock::new(Arc::new(InMemoryUserLock::new())),
            bot_logic: RwLock::new(None),
            classifier: RwLock::new(None),
            controller: RwLock::new(None),
            running: Mutex::new(None),
            local_addr: RwLock::new(None),
        }
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &SwitchboardConfig {
        &self.config
    }

    /// Returns the adapter registry.
    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Creates a transport context with every capability enabled by cargo features.
    #[allow(unused_mut)]
    fn create_default_transport_context() -> TransportContext {
        let mut ctx = TransportContext::new();

        #[cfg(feature = "http-server")]
        {
            use switchboard_transport::HttpServerCapabilityImpl;
            ctx = ctx.with_http_server(Arc::new(HttpServerCapabilityImpl::new()));
            debug!("Registered HttpServer capability");
        }

        #[cfg(feature = "http-client")]
        {
            use switchboard_transport::HttpClientCapabilityImpl;
            match HttpClientCapabilityImpl::new() {
                Ok(client) => {
                    ctx = ctx.with_http_client(Arc::new(client));
                    debug!("Registered HttpClient capability");
                }
                Err(e) => error!(error = %e, "Failed to create HTTP client capability"),
            }
        }

        ctx
    }

    /// Replaces the transport context.
    pub async fn set_transport_context(&self, ctx: TransportContext) {
        *self.transport_context.write().await = ctx;
    }

    /// Sets the bot logic.
    pub async fn set_bot_logic(&self, logic: BoxedBotLogic) {
        *self.bot_logic.write().await = Some(logic);
    }

    /// Sets the classifier exposed to the bot logic.
    pub async fn set_classifier(&self, classifier: BoxedClassifier) {
        *self.classifier.write().await = Some(classifier);
    }

    /// Replaces the in-memory conversation store.
    pub async fn set_store(&self, store: BoxedStore) {
        *self.store.write().await = store;
    }

    /// Replaces the in-process user lock.
    pub async fn set_user_lock(&self, lock: BoxedUserLock) {
        *self.user_lock.write().await = lock;
    }

    /// Registers an adapter built from its configuration section.
    ///
    /// This will:
    /// 1. Look for configuration under `adapters.<A::adapter_name()>`
    /// 2. If found, deserialize it into `A::Config`
    /// 3. If not found, use `A::Config::default()`
    /// 4. Call `A::from_config(config)` and register the adapter
    pub async fn register_adapter<A>(&self) -> RuntimeResult<()>
    where
        A: ConfigurableAdapter + 'static,
    {
        let adapter_name = A::adapter_name();

        let config: A::Config = if let Some(config_value) = self.config.adapters.get(adapter_name) {
            config_value.deserialize().map_err(|e| {
                RuntimeError::AdapterConfigDeserialize(format!(
                    "Failed to deserialize config for adapter '{adapter_name}': {e}"
                ))
            })?
        } else {
            warn!(
                adapter = adapter_name,
                "No configuration found for adapter, using default"
            );
            Default::default()
        };

        let adapter = A::from_config(config)?;
        self.add_adapter(adapter).await
    }

    /// Registers an already built adapter.
    pub async fn add_adapter(&self, adapter: BoxedAdapter) -> RuntimeResult<()> {
        let application_id = adapter.application_id().to_string();
        let mut adapters = self.adapters.write().await;
        if self.registry.by_application_id(&application_id).is_some() {
            return Err(RuntimeError::ApplicationExists(application_id));
        }

        info!(
            adapter = adapter.name(),
            application_id = %application_id,
            connector_type = %adapter.connector_type(),
            "Registered adapter"
        );
        self.registry.register(Arc::clone(&adapter));
        adapters.push(adapter);
        Ok(())
    }

    /// Returns the number of registered adapters.
    pub async fn adapter_count(&self) -> usize {
        self.adapters.read().await.len()
    }

    /// Returns the dispatch controller, once initialized.
    pub async fn controller(&self) -> Option<Arc<DispatchController>> {
        self.controller.read().await.clone()
    }

    /// Returns the address the HTTP server is bound to, while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().await
    }

    /// Returns whether the runtime is currently running.
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Builds the dispatch controller from the configuration.
    pub async fn init(&self) -> RuntimeResult<()> {
        let logic = self
            .bot_logic
            .read()
            .await
            .clone()
            .ok_or(RuntimeError::MissingBotLogic)?;
        let settings = self.config.dispatch.to_settings()?;

        let mut engine = BotEngine::new(logic);
        if let Some(classifier) = self.classifier.read().await.clone() {
            engine = engine.with_classifier(classifier);
        }

        let controller = DispatchController::new(
            Arc::clone(&self.registry),
            Arc::clone(&*self.store.read().await),
            Arc::clone(&*self.user_lock.read().await),
            engine,
            settings,
        );
        *self.controller.write().await = Some(Arc::new(controller));

        info!(
            adapters = self.adapter_count().await,
            worker_limit = self.config.dispatch.worker_limit,
            "Runtime initialized"
        );
        Ok(())
    }

    /// Starts the adapters and the HTTP server.
    pub async fn start(&self) -> RuntimeResult<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!("Runtime is already running");
            return Ok(());
        }

        if self.controller.read().await.is_none() {
            self.init().await?;
        }
        let Some(controller) = self.controller().await else {
            return Err(RuntimeError::MissingBotLogic);
        };

        info!("Starting Switchboard runtime");

        let transport = self.transport_context.read().await.clone();
        let shutdown = CancellationToken::new();
        let adapters = self.adapters.read().await.clone();

        let mut tasks = Vec::new();
        let mut registrar = EndpointRegistrar::new();
        for adapter in &adapters {
            let mut ctx = AdapterContext::new(transport.clone(), shutdown.clone());
            if let Err(e) = adapter.on_start(&mut ctx).await {
                error!(adapter = adapter.name(), error = %e, "Failed to start adapter");
                continue;
            }
            debug!(
                adapter = adapter.name(),
                tasks = ctx.task_count(),
                "Adapter started"
            );
            tasks.extend(ctx.into_tasks());
            adapter.register_inbound_endpoint(Arc::clone(&controller), &mut registrar);
        }

        let endpoints = registrar.into_endpoints();
        let listener = if endpoints.is_empty() {
            warn!("No inbound endpoint registered, HTTP server not started");
            None
        } else {
            let Some(server) = transport.http_server() else {
                shutdown.cancel();
                return Err(RuntimeError::CapabilityMissing("http-server"));
            };
            match server.serve(&self.config.server.bind, endpoints).await {
                Ok(listener) => Some(listener),
                Err(e) => {
                    shutdown.cancel();
                    return Err(e.into());
                }
            }
        };

        *self.local_addr.write().await = listener.as_ref().and_then(|l| l.local_addr);
        *running = Some(Running {
            shutdown,
            listener,
            tasks,
        });

        info!("Runtime started");
        Ok(())
    }

    /// Stops the HTTP server, the background tasks and the adapters.
    pub async fn stop(&self) -> RuntimeResult<()> {
        let Some(state) = self.running.lock().await.take() else {
            warn!("Runtime is not running");
            return Ok(());
        };

        info!("Stopping Switchboard runtime");

        state.shutdown.cancel();
        if let Some(listener) = state.listener {
            listener.stop();
        }
        *self.local_addr.write().await = None;

        for result in join_all(state.tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        for adapter in self.adapters.read().await.iter() {
            if let Err(e) = adapter.on_shutdown().await {
                error!(adapter = adapter.name(), error = %e, "Error during adapter shutdown");
            }
        }

        info!("Runtime stopped");
        Ok(())
    }

    /// Runs the runtime until a shutdown signal is received.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.init().await?;
        self.start().await?;

        info!("Switchboard runtime is now running. Press Ctrl+C to stop.");

        wait_for_shutdown().await;

        self.stop().await
    }

    /// Runs the runtime with a custom shutdown future.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: std::future::Future<Output = ()>,
    {
        self.init().await?;
        self.start().await?;

        shutdown.await;

        self.stop().await
    }
}

impl Default for SwitchboardRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a `SwitchboardRuntime` with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = SwitchboardRuntime::builder()
///     .config_file("config/production.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: SwitchboardConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> ConfigResult<SwitchboardRuntime> {
        let config = self.config_loader.load()?;
        Ok(SwitchboardRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
