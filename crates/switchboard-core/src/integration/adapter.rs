//! Channel adapter contract.
//!
//! An adapter bridges one external protocol and the internal event model.
//! The dispatch core only ever calls it through this trait:
//!
//! - [`register_inbound_endpoint`](Adapter::register_inbound_endpoint) wires routes at startup
//! - [`authenticate`](Adapter::authenticate) and [`parse`](Adapter::parse) turn a request into at most one event
//! - [`create_callback`](Adapter::create_callback) builds the per-dispatch response sink
//! - [`send`](Adapter::send), [`has_feature`](Adapter::has_feature),
//!   [`add_suggestions`](Adapter::add_suggestions) and
//!   [`to_connector_message`](Adapter::to_connector_message) render output
//!
//! # Configuration-Based Creation
//!
//! Each adapter defines its own configuration type. The runtime locates it
//! under `adapters.<name>` and hands it to [`ConfigurableAdapter::from_config`]:
//!
//! ```yaml
//! adapters:
//!   rest:  # <- ConfigurableAdapter::adapter_name()
//!     application_id: web
//!     path: /io/web
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::registry::AdapterRegistry;
use super::transport::{EndpointRegistrar, InboundRequest, InboundResponse, TransportContext};
use crate::conversation::UserPreferences;
use crate::dispatch::{BoxedCallback, ConnectorCallback, DispatchController, Responder};
use crate::foundation::{
    Action, AdapterResult, AuthError, AuthResult, ConnectorMessage, ConnectorType, Event,
    FailureCause, GenericMessage, Locale, PlayerId,
};

/// Feature name of multi-card messages.
pub const FEATURE_CAROUSEL: &str = "carousel";
/// Feature name of quick replies.
pub const FEATURE_SUGGESTIONS: &str = "suggestions";

/// The event an adapter extracted from a request, with its routing hints.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEvent {
    /// The event.
    pub event: Event,
    /// Request locale, when the channel supplies one.
    pub locale: Option<Locale>,
    /// Id the user was known under before, to reconcile with the current one.
    pub prior_user_id: Option<PlayerId>,
    /// Shared conversation, when several users talk in the same dialog.
    pub group_id: Option<String>,
}

impl ParsedEvent {
    /// Wraps an event without routing hints.
    pub fn new(event: impl Into<Event>) -> Self {
        Self {
            event: event.into(),
            locale: None,
            prior_user_id: None,
            group_id: None,
        }
    }

    /// Sets the request locale.
    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = Some(locale);
        self
    }

    /// Sets the prior user id.
    pub fn with_prior_user(mut self, prior: PlayerId) -> Self {
        self.prior_user_id = Some(prior);
        self
    }

    /// Sets the group id.
    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }
}

/// What suggestions are added to.
#[derive(Debug, Clone, PartialEq)]
pub enum SuggestionTarget {
    /// Plain text to wrap.
    Text(String),
    /// An already rendered message.
    Message(ConnectorMessage),
}

/// Context provided to adapters when the runtime starts them.
///
/// Provides access to:
/// - Transport capabilities for outbound calls
/// - The runtime shutdown token
/// - A place to park background tasks until shutdown
pub struct AdapterContext {
    transport: TransportContext,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl AdapterContext {
    /// Creates a new adapter context.
    pub fn new(transport: TransportContext, shutdown: CancellationToken) -> Self {
        Self {
            transport,
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Returns the transport context.
    pub fn transport(&self) -> &TransportContext {
        &self.transport
    }

    /// Returns a token cancelled when the runtime stops.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Keeps a background task until shutdown.
    pub fn add_task(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Number of tracked tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Consumes the context, returning its tasks.
    pub fn into_tasks(self) -> Vec<JoinHandle<()>> {
        self.tasks
    }
}

/// The core adapter trait.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Returns the adapter name used in logs.
    fn name(&self) -> &str;

    /// Returns the configured application id this instance serves.
    fn application_id(&self) -> &str;

    /// Returns the channel type this adapter speaks.
    fn connector_type(&self) -> &ConnectorType;

    /// Wires the adapter's inbound routes to the controller.
    ///
    /// Called once per adapter instance at startup.
    fn register_inbound_endpoint(
        &self,
        controller: Arc<DispatchController>,
        endpoints: &mut EndpointRegistrar,
    );

    /// Called when the runtime starts, before the HTTP server binds.
    async fn on_start(&self, _ctx: &mut AdapterContext) -> AdapterResult<()> {
        Ok(())
    }

    /// Called when the runtime stops.
    async fn on_shutdown(&self) -> AdapterResult<()> {
        Ok(())
    }

    /// Verifies the request signature, if the channel signs requests.
    async fn authenticate(&self, _request: &InboundRequest) -> AuthResult<()> {
        Ok(())
    }

    /// Converts a request into zero or one event.
    ///
    /// `Ok(None)` is a valid no-op (echo, empty payload, unsupported type).
    fn parse(&self, request: &InboundRequest) -> AdapterResult<Option<ParsedEvent>>;

    /// Creates the response sink of one dispatch.
    fn create_callback(
        &self,
        request: &InboundRequest,
        parsed: &ParsedEvent,
        responder: Responder,
    ) -> BoxedCallback;

    /// Hands one action to the channel.
    ///
    /// The default buffers it in the callback, to be delivered at flush.
    async fn send(&self, action: Action, callback: &mut dyn ConnectorCallback, delay: Duration) {
        callback.append(action, delay);
    }

    /// Returns true when `target` renders `feature`.
    fn has_feature(&self, _feature: &str, _target: &ConnectorType, _registry: &AdapterRegistry) -> bool {
        false
    }

    /// Adds quick replies to a text or a message.
    fn add_suggestions(
        &self,
        _on: SuggestionTarget,
        _suggestions: &[String],
        _target: &ConnectorType,
        _registry: &AdapterRegistry,
    ) -> Option<ConnectorMessage> {
        None
    }

    /// Renders a generic message for `target`.
    fn to_connector_message(
        &self,
        _message: &GenericMessage,
        _target: &ConnectorType,
        _registry: &AdapterRegistry,
    ) -> Vec<ConnectorMessage> {
        Vec::new()
    }

    /// Fetches the channel-side profile. Failures yield defaults.
    async fn load_profile(
        &self,
        callback: &dyn ConnectorCallback,
        _user_id: &PlayerId,
    ) -> UserPreferences {
        UserPreferences::with_locale(callback.locale().clone())
    }

    /// Response for a request that failed authentication.
    fn rejection_response(&self, error: &AuthError) -> InboundResponse {
        InboundResponse::text(403, error.to_string())
    }

    /// Response for a request that produced no event.
    fn noop_response(&self) -> InboundResponse {
        InboundResponse::ok()
    }

    /// Response when the dispatch failed before the callback could flush.
    fn error_response(&self, cause: FailureCause) -> InboundResponse {
        InboundResponse::json(500, &serde_json::json!({ "error": cause.as_str() }))
    }
}

/// A shared adapter.
pub type BoxedAdapter = Arc<dyn Adapter>;

/// Trait for adapters that can be created from configuration.
///
/// Kept apart from [`Adapter`] so that `dyn Adapter` stays usable.
pub trait ConfigurableAdapter: Adapter {
    /// The configuration type for this adapter.
    type Config: serde::de::DeserializeOwned + Default;

    /// Key of the adapter's section under `adapters`.
    fn adapter_name() -> &'static str
    where
        Self: Sized;

    /// Creates an adapter from its configuration.
    fn from_config(config: Self::Config) -> AdapterResult<Arc<Self>>
    where
        Self: Sized;
}
