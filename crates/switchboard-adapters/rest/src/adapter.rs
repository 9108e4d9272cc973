//! The REST bridge adapter.
//!
//! A synchronous channel: the HTTP request stays open until the dispatch
//! flushes, and the answers come back in the response body.
//!
//! ```yaml
//! adapters:
//!   rest:
//!     application_id: web
//!     path: /io/web
//! ```
//!
//! The bridge can also render for another channel. When a request names a
//! non-REST `targetConnectorType`, feature queries and rendering are
//! delegated to the adapter registered for that channel. A channel with no
//! adapter gets REST renderings.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use switchboard_core::foundation::{GenericChoice, TEXT_PARAM};
use switchboard_core::{
    Action, Adapter, AdapterRegistry, AdapterResult, AuthError, AuthResult, BoxedAdapter,
    BoxedCallback, ConfigurableAdapter, ConnectorMessage, ConnectorType, DispatchController,
    EndpointRegistrar, FEATURE_CAROUSEL, FEATURE_SUGGESTIONS, FailureCause, GenericMessage,
    InboundRequest, InboundResponse, Locale, ParsedEvent, PlayerId, Responder, SuggestionTarget,
    handler_fn,
};
use tracing::{debug, info, trace};

use crate::callback::RestCallback;
use crate::config::{RestConfig, TOKEN_HEADER};
use crate::model::{MessageRequest, MessageResponse, RestRendering};

/// Name of the adapter's configuration section.
pub const ADAPTER_NAME: &str = "rest";

/// The REST bridge adapter.
pub struct RestAdapter {
    config: RestConfig,
    connector_type: ConnectorType,
}

impl RestAdapter {
    /// Creates an adapter.
    pub fn new(config: RestConfig) -> Self {
        Self {
            config,
            connector_type: ConnectorType::rest(),
        }
    }

    /// Returns the adapter configuration.
    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    /// Route receiving messages.
    pub fn message_route(&self) -> String {
        format!("{}/{{locale}}", self.config.base_path())
    }

    /// Route answering health checks.
    pub fn healthcheck_route(&self) -> String {
        format!("{}/healthcheck", self.config.base_path())
    }

    fn delegate(&self, target: &ConnectorType, registry: &AdapterRegistry) -> Option<BoxedAdapter> {
        let delegate = registry.delegate(&self.connector_type, target);
        if delegate.is_none() {
            debug!(
                target = %target,
                "No adapter renders for the target channel, rendering as REST"
            );
        }
        delegate
    }

    fn empty_response(&self, error: Option<String>) -> MessageResponse {
        MessageResponse {
            messages: Vec::new(),
            application_id: self.config.application_id.clone(),
            request_id: None,
            locale: None,
            is_sentence_request: false,
            error,
        }
    }
}

impl Default for RestAdapter {
    fn default() -> Self {
        Self::new(RestConfig::default())
    }
}

#[async_trait]
impl Adapter for RestAdapter {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    fn application_id(&self) -> &str {
        &self.config.application_id
    }

    fn connector_type(&self) -> &ConnectorType {
        &self.connector_type
    }

    fn register_inbound_endpoint(
        &self,
        controller: Arc<DispatchController>,
        endpoints: &mut EndpointRegistrar,
    ) {
        let route = self.message_route();
        info!(
            application_id = %self.config.application_id,
            path = %route,
            "Deploying REST adapter"
        );

        let application_id = self.config.application_id.clone();
        endpoints.post(
            ADAPTER_NAME,
            &route,
            handler_fn(move |request| {
                let controller = Arc::clone(&controller);
                let application_id = application_id.clone();
                async move { controller.dispatch(&application_id, request).await }
            }),
        );
        endpoints.get(
            ADAPTER_NAME,
            &self.healthcheck_route(),
            handler_fn(|_request| async { InboundResponse::ok() }),
        );
    }

    async fn authenticate(&self, request: &InboundRequest) -> AuthResult<()> {
        let Some(expected) = self.config.token() else {
            return Ok(());
        };
        match request.header(TOKEN_HEADER) {
            None => Err(AuthError::MissingToken),
            Some(token) if token == expected => Ok(()),
            Some(_) => Err(AuthError::SecretMismatch),
        }
    }

    fn parse(&self, request: &InboundRequest) -> AdapterResult<Option<ParsedEvent>> {
        let message: MessageRequest = request.body_json()?;
        let locale = request.path_param("locale").and_then(Locale::parse_tag);

        let mut action = Action::new(
            PlayerId::user(&message.user_id),
            PlayerId::bot(&message.recipient_id),
            self.config.application_id.clone(),
            message.normalized_message(),
        );
        action.state.source_connector_type = Some(message.connector_type);
        action.state.target_connector_type = Some(message.target_connector_type);
        action.state.test_event = message.test;
        action.state.user_locale = locale.clone();
        action.metadata.debug_enabled = message.debug_enabled;
        action.metadata.source_with_content = message.source_with_content;
        trace!(action_id = %action.id, kind = action.kind.label(), "Parsed REST message");

        let parsed = ParsedEvent::new(action);
        Ok(Some(match locale {
            Some(locale) => parsed.with_locale(locale),
            None => parsed,
        }))
    }

    fn create_callback(
        &self,
        _request: &InboundRequest,
        parsed: &ParsedEvent,
        responder: Responder,
    ) -> BoxedCallback {
        let locale = parsed.locale.clone().unwrap_or_default();
        let callback = RestCallback::new(self.config.application_id.clone(), locale, responder);
        Box::new(match parsed.event.as_action() {
            Some(action) => callback.for_request(action),
            None => callback,
        })
    }

    fn has_feature(&self, feature: &str, target: &ConnectorType, registry: &AdapterRegistry) -> bool {
        if target.is_rest() {
            return feature == FEATURE_CAROUSEL || feature == FEATURE_SUGGESTIONS;
        }
        self.delegate(target, registry)
            .is_some_and(|adapter| adapter.has_feature(feature, target, registry))
    }

    fn add_suggestions(
        &self,
        on: SuggestionTarget,
        suggestions: &[String],
        target: &ConnectorType,
        registry: &AdapterRegistry,
    ) -> Option<ConnectorMessage> {
        if !target.is_rest() {
            if let Some(adapter) = self.delegate(target, registry) {
                return adapter.add_suggestions(on, suggestions, target, registry);
            }
        }
        match on {
            SuggestionTarget::Text(text) => {
                let mut texts = BTreeMap::new();
                texts.insert(TEXT_PARAM.to_string(), text);
                let message = GenericMessage {
                    texts,
                    choices: suggestions.iter().map(GenericChoice::from_text).collect(),
                    ..GenericMessage::new()
                };
                Some(RestRendering::single(message).into_message())
            }
            SuggestionTarget::Message(message) => match RestRendering::from_message(&message) {
                Some(mut rendering) => {
                    rendering.suggest(suggestions);
                    Some(rendering.into_message())
                }
                None => Some(message),
            },
        }
    }

    /// Renders for the target channel's adapter, or as REST when no adapter
    /// is registered for it.
    fn to_connector_message(
        &self,
        message: &GenericMessage,
        target: &ConnectorType,
        registry: &AdapterRegistry,
    ) -> Vec<ConnectorMessage> {
        if !target.is_rest() {
            if let Some(adapter) = self.delegate(target, registry) {
                return adapter.to_connector_message(message, target, registry);
            }
        }
        vec![RestRendering::single(message.clone()).into_message()]
    }

    fn rejection_response(&self, error: &AuthError) -> InboundResponse {
        debug!(error = %error, "REST request filtered");
        InboundResponse::empty(403)
    }

    fn noop_response(&self) -> InboundResponse {
        InboundResponse::json(200, &self.empty_response(None))
    }

    fn error_response(&self, cause: FailureCause) -> InboundResponse {
        InboundResponse::json(500, &self.empty_response(Some(cause.as_str().to_string())))
    }
}

impl ConfigurableAdapter for RestAdapter {
    type Config = RestConfig;

    fn adapter_name() -> &'static str {
        ADAPTER_NAME
    }

    fn from_config(config: Self::Config) -> AdapterResult<Arc<Self>> {
        Ok(Arc::new(Self::new(config)))
    }
}
