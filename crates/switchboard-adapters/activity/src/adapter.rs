//! The activity adapter.
//!
//! An asynchronous channel: the channel posts signed activities to the
//! webhook, the request is acknowledged once the dispatch ends, and the
//! answers are pushed back to the conversation API found in the
//! activity's `serviceUrl`.
//!
//! ```yaml
//! adapters:
//!   activity:
//!     application_id: teams
//!     path: /api/messages
//!     audience: ${CHANNEL_APP_ID}
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use serde_json::Value;
use switchboard_core::auth::{KeySetCache, OpenIdKeySetSource};
use switchboard_core::foundation::{Choice, Sentence};
use switchboard_core::{
    Action, ActionKind, Adapter, AdapterContext, AdapterError, AdapterRegistry, AdapterResult,
    AuthError, AuthGuard, AuthResult, BoxedCallback, ConfigurableAdapter, ConnectorMessage,
    ConnectorType, DispatchController, EndpointRegistrar, FEATURE_CAROUSEL, FEATURE_SUGGESTIONS,
    FailureCause, GenericMessage, HttpClientCapability, InboundRequest, InboundResponse, Locale,
    ParsedEvent, PlayerId, Responder, SuggestionTarget, TransportError, handler_fn,
};
use tracing::{debug, info, trace, warn};

use crate::callback::ActivityCallback;
use crate::config::ActivityConfig;
use crate::delivery::{Pusher, ReplyAddress};
use crate::model::{Activity, ServiceUrlOnly};
use crate::render::{from_connector_message, render_generic, to_connector_message};

/// Name of the adapter's configuration section.
pub const ADAPTER_NAME: &str = "activity";

/// What the adapter needs once started.
struct Connection {
    guard: Option<AuthGuard>,
    pusher: Arc<Pusher>,
}

/// The activity adapter.
pub struct ActivityAdapter {
    config: ActivityConfig,
    connector_type: ConnectorType,
    connection: ArcSwapOption<Connection>,
}

impl ActivityAdapter {
    /// Creates an adapter. It verifies and pushes nothing until started.
    pub fn new(config: ActivityConfig) -> Self {
        Self {
            config,
            connector_type: ConnectorType::activity(),
            connection: ArcSwapOption::empty(),
        }
    }

    /// Connects the adapter without starting it.
    ///
    /// `guard` verifies inbound requests; `None` accepts every request.
    pub fn with_connection(
        self,
        client: Arc<dyn HttpClientCapability>,
        guard: Option<AuthGuard>,
    ) -> Self {
        self.connect(client, guard);
        self
    }

    /// Returns the adapter configuration.
    pub fn config(&self) -> &ActivityConfig {
        &self.config
    }

    /// Returns true once the adapter can push answers.
    pub fn is_connected(&self) -> bool {
        self.connection.load().is_some()
    }

    fn connect(&self, client: Arc<dyn HttpClientCapability>, guard: Option<AuthGuard>) {
        let pusher = Pusher::new(
            client,
            self.config.outbound_token().map(str::to_string),
            self.config.push.clone(),
        );
        self.connection.store(Some(Arc::new(Connection {
            guard,
            pusher: Arc::new(pusher),
        })));
    }

    fn action_kind(activity: &Activity) -> Option<ActionKind> {
        if let Some(Value::Object(value)) = &activity.value {
            if let Some(intent) = value.get("intent").and_then(Value::as_str) {
                let parameters: BTreeMap<String, String> = value
                    .iter()
                    .filter(|(key, _)| key.as_str() != "intent")
                    .filter_map(|(key, v)| v.as_str().map(|v| (key.clone(), v.to_string())))
                    .collect();
                return Some(ActionKind::Choice(Choice {
                    intent: intent.to_string(),
                    parameters,
                }));
            }
        }
        let text = activity.text.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        Some(ActionKind::Sentence(Sentence {
            text: Some(text.to_string()),
            messages: Vec::new(),
        }))
    }
}

impl Default for ActivityAdapter {
    fn default() -> Self {
        Self::new(ActivityConfig::default())
    }
}

#[async_trait]
impl Adapter for ActivityAdapter {
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
        info!(
            application_id = %self.config.application_id,
            path = %self.config.path,
            "Deploying activity adapter"
        );

        let application_id = self.config.application_id.clone();
        endpoints.post(
            ADAPTER_NAME,
            &self.config.path,
            handler_fn(move |request| {
                let controller = Arc::clone(&controller);
                let application_id = application_id.clone();
                async move { controller.dispatch(&application_id, request).await }
            }),
        );
    }

    async fn on_start(&self, ctx: &mut AdapterContext) -> AdapterResult<()> {
        if self.is_connected() {
            debug!("Activity adapter already connected");
            return Ok(());
        }
        let client = ctx
            .transport()
            .http_client()
            .cloned()
            .ok_or(AdapterError::Transport(TransportError::NotAvailable {
                transport: "http-client",
            }))?;

        let guard = if self.config.verify_requests {
            if self.config.audience.is_empty() {
                warn!("No audience configured, every inbound token will be rejected");
            }
            let source = OpenIdKeySetSource::new(&self.config.openid_metadata_url, client.clone());
            let keys = Arc::new(
                KeySetCache::new(Arc::new(source))
                    .with_refresh_interval(self.config.key_refresh_interval()),
            );
            ctx.add_task(keys.spawn_refresh(ctx.shutdown_token()));
            Some(
                AuthGuard::new(
                    &self.config.issuer,
                    &self.config.audience,
                    &self.config.binding_claim,
                    keys,
                )
                .with_clock_skew(self.config.clock_skew_secs),
            )
        } else {
            warn!("Inbound request verification is disabled");
            None
        };

        self.connect(client, guard);
        info!(application_id = %self.config.application_id, "Activity adapter started");
        Ok(())
    }

    async fn on_shutdown(&self) -> AdapterResult<()> {
        self.connection.store(None);
        Ok(())
    }

    async fn authenticate(&self, request: &InboundRequest) -> AuthResult<()> {
        let Some(connection) = self.connection.load_full() else {
            return if self.config.verify_requests {
                Err(AuthError::key_set("adapter is not started"))
            } else {
                Ok(())
            };
        };
        let Some(guard) = connection.guard.as_ref() else {
            return Ok(());
        };
        let service_url = request
            .body_json::<ServiceUrlOnly>()
            .unwrap_or_default()
            .service_url;
        guard
            .verify(request.header("authorization"), &service_url)
            .await
            .map(|_| ())
    }

    fn parse(&self, request: &InboundRequest) -> AdapterResult<Option<ParsedEvent>> {
        let activity: Activity = request.body_json()?;
        if !activity.is_message() {
            debug!(activity_type = %activity.activity_type, "Ignoring non-message activity");
            return Ok(None);
        }
        if activity.is_from_bot() {
            debug!("Ignoring activity sent by the bot");
            return Ok(None);
        }
        let (Some(from), Some(recipient)) = (&activity.from, &activity.recipient) else {
            return Err(AdapterError::ParseError {
                reason: "activity has no sender or recipient".to_string(),
            });
        };
        let Some(kind) = Self::action_kind(&activity) else {
            debug!("Ignoring empty message");
            return Ok(None);
        };

        let locale = activity.locale.as_deref().and_then(Locale::parse_tag);
        let mut action = Action::new(
            PlayerId::user(&from.id),
            PlayerId::bot(&recipient.id),
            self.config.application_id.clone(),
            kind,
        );
        action.state.source_connector_type = Some(self.connector_type.clone());
        action.state.target_connector_type = Some(self.connector_type.clone());
        action.state.user_locale = locale.clone();
        trace!(action_id = %action.id, kind = action.kind.label(), "Parsed activity");

        let mut parsed = ParsedEvent::new(action);
        if let Some(locale) = locale {
            parsed = parsed.with_locale(locale);
        }
        if let Some(conversation) = &activity.conversation {
            if conversation.is_group == Some(true) {
                parsed = parsed.with_group(&conversation.id);
            }
        }
        Ok(Some(parsed))
    }

    fn create_callback(
        &self,
        request: &InboundRequest,
        parsed: &ParsedEvent,
        responder: Responder,
    ) -> BoxedCallback {
        let locale = parsed.locale.clone().unwrap_or_default();
        let callback = ActivityCallback::new(self.config.application_id.clone(), locale, responder);

        let address = request
            .body_json::<Activity>()
            .ok()
            .and_then(|activity| ReplyAddress::from_inbound(&activity));
        Box::new(match (self.connection.load_full(), address) {
            (Some(connection), Some(address)) => {
                callback.delivering_to(Arc::clone(&connection.pusher), address)
            }
            (None, _) => {
                warn!("Activity adapter is not started, answers will not be pushed");
                callback
            }
            (_, None) => {
                warn!("Activity has no service URL or conversation, answers will not be pushed");
                callback
            }
        })
    }

    fn has_feature(
        &self,
        feature: &str,
        target: &ConnectorType,
        _registry: &AdapterRegistry,
    ) -> bool {
        *target == self.connector_type
            && (feature == FEATURE_CAROUSEL || feature == FEATURE_SUGGESTIONS)
    }

    fn add_suggestions(
        &self,
        on: SuggestionTarget,
        suggestions: &[String],
        target: &ConnectorType,
        _registry: &AdapterRegistry,
    ) -> Option<ConnectorMessage> {
        if *target != self.connector_type {
            return None;
        }
        match on {
            SuggestionTarget::Text(text) => {
                let activity = Activity::message(text).with_suggestions(suggestions);
                Some(to_connector_message(&activity))
            }
            SuggestionTarget::Message(message) => match from_connector_message(&message) {
                Some(activity) if activity.suggested_actions.is_none() => {
                    Some(to_connector_message(&activity.with_suggestions(suggestions)))
                }
                _ => Some(message),
            },
        }
    }

    fn to_connector_message(
        &self,
        message: &GenericMessage,
        target: &ConnectorType,
        _registry: &AdapterRegistry,
    ) -> Vec<ConnectorMessage> {
        if *target != self.connector_type {
            return Vec::new();
        }
        vec![to_connector_message(&render_generic(message))]
    }

    fn rejection_response(&self, error: &AuthError) -> InboundResponse {
        warn!(error = %error, "Activity request rejected");
        InboundResponse::empty(403)
    }

    fn error_response(&self, _cause: FailureCause) -> InboundResponse {
        InboundResponse::empty(500)
    }
}

impl ConfigurableAdapter for ActivityAdapter {
    type Config = ActivityConfig;

    fn adapter_name() -> &'static str {
        ADAPTER_NAME
    }

    fn from_config(config: Self::Config) -> AdapterResult<Arc<Self>> {
        if config.path.is_empty() {
            return Err(AdapterError::InvalidConfig("activity path is empty".to_string()));
        }
        Ok(Arc::new(Self::new(config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use ring::rand::SystemRandom;
    use ring::signature::{ECDSA_P256_SHA256_FIXED_SIGNING, EcdsaKeyPair, KeyPair};
    use serde_json::json;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use switchboard_core::auth::{Jwk, JwkSet, StaticKeySet, encode_segment};
    use switchboard_core::dispatch::DispatchOutcome;
    use switchboard_core::{
        BotEngine, BotLogic, DispatchSettings, InMemoryStore, InMemoryUserLock, TransportContext,
        TransportResult, Turn,
    };
    use tokio_util::sync::CancellationToken;

    const SERVICE: &str = "https://smba.example/emea/";
    const ISSUER: &str = "https://api.botframework.com";
    const AUDIENCE: &str = "app-123";

    struct Echo;

    #[async_trait]
    impl BotLogic for Echo {
        async fn handle(&self, turn: &mut Turn<'_>) -> anyhow::Result<()> {
            let text = turn.text().unwrap_or_default().to_string();
            turn.send("first").await;
            turn.end(format!("echo {text}")).await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl HttpClientCapability for Recorder {
        async fn post_json(
            &self,
            url: &str,
            body: &Value,
            _: Option<&str>,
        ) -> TransportResult<Value> {
            self.sent.lock().push((url.to_string(), body.clone()));
            Ok(Value::Null)
        }

        async fn get_json(&self, url: &str) -> TransportResult<Value> {
            Err(TransportError::RequestFailed {
                url: url.to_string(),
                reason: "offline".into(),
            })
        }
    }

    impl Recorder {
        async fn wait_for(&self, count: usize) -> Vec<(String, Value)> {
            for _ in 0..200 {
                if self.sent.lock().len() >= count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            self.sent.lock().clone()
        }
    }

    struct Signer {
        pair: EcdsaKeyPair,
        rng: SystemRandom,
    }

    impl Signer {
        fn new() -> Self {
            let rng = SystemRandom::new();
            let pkcs8 =
                EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng).unwrap();
            let pair =
                EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                    .unwrap();
            Self { pair, rng }
        }

        fn guard(&self) -> AuthGuard {
            let public = self.pair.public_key().as_ref();
            let jwk = Jwk {
                kty: "EC".into(),
                kid: Some("k1".into()),
                alg: Some("ES256".into()),
                n: None,
                e: None,
                crv: Some("P-256".into()),
                x: Some(encode_segment(&public[1..33])),
                y: Some(encode_segment(&public[33..65])),
                endorsements: Vec::new(),
            };
            let keys = KeySetCache::new(Arc::new(StaticKeySet(JwkSet { keys: vec![jwk] })));
            AuthGuard::new(ISSUER, AUDIENCE, "serviceurl", Arc::new(keys))
        }

        fn bearer(&self, service_url: &str) -> String {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs() as i64;
            let header = json!({ "alg": "ES256", "kid": "k1", "typ": "JWT" });
            let claims = json!({
                "iss": ISSUER,
                "aud": AUDIENCE,
                "nbf": now - 60,
                "exp": now + 3600,
                "serviceurl": service_url,
            });
            let input = format!(
                "{}.{}",
                encode_segment(header.to_string().as_bytes()),
                encode_segment(claims.to_string().as_bytes())
            );
            let signature = self.pair.sign(&self.rng, input.as_bytes()).unwrap();
            format!("Bearer {input}.{}", encode_segment(signature.as_ref()))
        }
    }

    fn config() -> ActivityConfig {
        ActivityConfig {
            application_id: "teams".into(),
            audience: AUDIENCE.into(),
            ..Default::default()
        }
    }

    fn controller(adapter: ActivityAdapter) -> Arc<DispatchController> {
        let registry = Arc::new(AdapterRegistry::new());
        registry.register(Arc::new(adapter));
        Arc::new(DispatchController::new(
            registry,
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryUserLock::new()),
            BotEngine::new(Arc::new(Echo)),
            DispatchSettings::default(),
        ))
    }

    fn activity(text: &str) -> Value {
        json!({
            "type": "message",
            "id": "a1",
            "serviceUrl": SERVICE,
            "from": { "id": "u1", "name": "Ada" },
            "recipient": { "id": "b1", "name": "Bot" },
            "conversation": { "id": "c1" },
            "text": text,
            "locale": "fr-FR"
        })
    }

    fn parse(value: Value) -> Option<ParsedEvent> {
        ActivityAdapter::new(config())
            .parse(&InboundRequest::json(&value))
            .unwrap()
    }

    #[test]
    fn routes_under_configured_path() {
        let adapter = ActivityAdapter::new(config());
        let mut registrar = EndpointRegistrar::new();
        let controller = controller(ActivityAdapter::new(config()));
        adapter.register_inbound_endpoint(controller, &mut registrar);
        let paths: Vec<_> = registrar.endpoints().iter().map(|e| e.path.clone()).collect();
        assert_eq!(paths, ["/api/messages"]);
    }

    #[test]
    fn parses_message_with_locale() {
        let parsed = parse(activity("hello")).unwrap();
        assert_eq!(parsed.locale, Some(Locale::new("fr", Some("FR"))));
        assert_eq!(parsed.group_id, None);
        let action = parsed.event.as_action().unwrap();
        assert_eq!(action.text(), Some("hello"));
        assert_eq!(action.player_id, PlayerId::user("u1"));
        assert_eq!(action.recipient_id, PlayerId::bot("b1"));
        assert_eq!(action.state.source_connector_type, Some(ConnectorType::activity()));
    }

    #[test]
    fn non_messages_and_echoes_are_noops() {
        let mut update = activity("hi");
        update["type"] = json!("conversationUpdate");
        assert!(parse(update).is_none());

        let mut echo = activity("hi");
        echo["from"] = json!({ "id": "b1" });
        assert!(parse(echo).is_none());

        assert!(parse(activity("   ")).is_none());
    }

    #[test]
    fn button_value_becomes_a_choice() {
        let mut click = activity("");
        click["value"] = json!({ "intent": "book", "city": "Lyon" });
        click["conversation"] = json!({ "id": "c9", "isGroup": true });
        let parsed = parse(click).unwrap();
        assert_eq!(parsed.group_id.as_deref(), Some("c9"));
        match &parsed.event.as_action().unwrap().kind {
            ActionKind::Choice(choice) => {
                assert_eq!(choice.intent, "book");
                assert_eq!(choice.parameters["city"], "Lyon");
            }
            other => panic!("expected a choice, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn signed_request_is_acknowledged_then_answered() {
        let signer = Signer::new();
        let recorder = Arc::new(Recorder::default());
        let adapter =
            ActivityAdapter::new(config()).with_connection(recorder.clone(), Some(signer.guard()));
        let controller = controller(adapter);

        let request = InboundRequest::json(&activity("hi"))
            .with_header("authorization", signer.bearer(SERVICE));
        let (response, outcome) = controller.dispatch_with_outcome("teams", request).await;
        assert_eq!(outcome, DispatchOutcome::Responded);
        assert_eq!(response.status, 202);

        let sent = recorder.wait_for(2).await;
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[0].0,
            "https://smba.example/emea/v3/conversations/c1/activities"
        );
        assert_eq!(sent[0].1["text"], "first");
        assert_eq!(sent[1].1["text"], "echo hi");
        assert_eq!(sent[1].1["from"]["id"], "b1");
        assert_eq!(sent[1].1["recipient"]["id"], "u1");
        assert_eq!(sent[1].1["replyToId"], "a1");
    }

    #[tokio::test]
    async fn unsigned_or_rebound_requests_are_rejected() {
        let signer = Signer::new();
        let recorder = Arc::new(Recorder::default());
        let adapter =
            ActivityAdapter::new(config()).with_connection(recorder.clone(), Some(signer.guard()));
        let controller = controller(adapter);

        let (response, outcome) = controller
            .dispatch_with_outcome("teams", InboundRequest::json(&activity("hi")))
            .await;
        assert_eq!(outcome, DispatchOutcome::Rejected);
        assert_eq!(response.status, 403);

        let request = InboundRequest::json(&activity("hi"))
            .with_header("authorization", signer.bearer("https://attacker.example/"));
        let response = controller.dispatch("teams", request).await;
        assert_eq!(response.status, 403);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(recorder.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn not_started_adapter_rejects_when_verifying() {
        let controller = controller(ActivityAdapter::new(config()));
        let response = controller
            .dispatch("teams", InboundRequest::json(&activity("hi")))
            .await;
        assert_eq!(response.status, 403);
    }

    #[tokio::test]
    async fn conversation_update_is_acknowledged_without_dispatch() {
        let recorder = Arc::new(Recorder::default());
        let adapter = ActivityAdapter::new(config()).with_connection(recorder.clone(), None);
        let controller = controller(adapter);

        let mut update = activity("hi");
        update["type"] = json!("conversationUpdate");
        let (response, outcome) = controller
            .dispatch_with_outcome("teams", InboundRequest::json(&update))
            .await;
        assert_eq!(outcome, DispatchOutcome::NoOp);
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn start_needs_an_http_client_and_spawns_key_refresh() {
        let adapter = ActivityAdapter::new(config());
        let token = CancellationToken::new();

        let mut bare = AdapterContext::new(TransportContext::new(), token.clone());
        assert!(adapter.on_start(&mut bare).await.is_err());
        assert!(!adapter.is_connected());

        let transport = TransportContext::new().with_http_client(Arc::new(Recorder::default()));
        let mut ctx = AdapterContext::new(transport, token.clone());
        tokio_test::assert_ok!(adapter.on_start(&mut ctx).await);
        assert!(adapter.is_connected());
        assert_eq!(ctx.task_count(), 1);

        token.cancel();
        for task in ctx.into_tasks() {
            tokio_test::assert_ok!(task.await);
        }
        tokio_test::assert_ok!(adapter.on_shutdown().await);
        assert!(!adapter.is_connected());
    }

    #[test]
    fn renders_carousel_and_suggestions_for_itself_only() {
        let adapter = ActivityAdapter::new(config());
        let registry = AdapterRegistry::new();
        let activity_type = ConnectorType::activity();

        assert!(adapter.has_feature(FEATURE_CAROUSEL, &activity_type, &registry));
        assert!(adapter.has_feature(FEATURE_SUGGESTIONS, &activity_type, &registry));
        assert!(!adapter.has_feature("voice", &activity_type, &registry));
        assert!(!adapter.has_feature(FEATURE_CAROUSEL, &ConnectorType::rest(), &registry));

        let message = adapter
            .add_suggestions(
                SuggestionTarget::Text("Pick".into()),
                &["A".into(), "B".into()],
                &activity_type,
                &registry,
            )
            .unwrap();
        assert_eq!(message.connector_type, activity_type);
        assert_eq!(message.payload["suggestedActions"]["actions"][1]["title"], "B");

        let kept = adapter
            .add_suggestions(
                SuggestionTarget::Message(message.clone()),
                &["C".into()],
                &activity_type,
                &registry,
            )
            .unwrap();
        assert_eq!(kept, message);

        let rendered =
            adapter.to_connector_message(&GenericMessage::text("hello"), &activity_type, &registry);
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].payload["text"], "hello");
        let rest = ConnectorType::rest();
        let hello = GenericMessage::text("hello");
        let foreign = adapter.to_connector_message(&hello, &rest, &registry);
        assert!(foreign.is_empty());
    }

    #[test]
    fn from_config_rejects_empty_path() {
        let config = ActivityConfig {
            path: String::new(),
            ..config()
        };
        assert!(ActivityAdapter::from_config(config).is_err());
    }
}
