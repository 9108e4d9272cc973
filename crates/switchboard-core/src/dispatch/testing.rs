//! Adapter, callback and bot logic used by the dispatch tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::callback::{BoxedCallback, ConnectorCallback, FlushStatus, Responder, ResponseBuffer};
use super::controller::DispatchController;
use super::engine::{BotLogic, Turn};
use crate::conversation::UserPreferences;
use crate::foundation::{
    Action, AdapterResult, AuthError, AuthResult, ConnectorType, GenericMessage, Locale,
    PlayerId, SUBTITLE_PARAM,
};
use crate::integration::{
    Adapter, EndpointRegistrar, InboundRequest, InboundResponse, ParsedEvent, handler_fn,
};

#[derive(Deserialize)]
struct TestPayload {
    user: String,
    #[serde(default)]
    text: String,
}

/// Builds a request the test adapter understands.
pub fn request(user: &str, text: &str) -> InboundRequest {
    InboundRequest::json(&json!({ "user": user, "text": text }))
}

/// Synchronous adapter answering with `{ "status", "messages" }`.
///
/// Requests carrying `x-deny` fail authentication, empty texts are no-ops.
pub struct TestAdapter {
    application_id: String,
    connector_type: ConnectorType,
    profile_loads: AtomicUsize,
}

impl TestAdapter {
    pub fn new(application_id: &str) -> Self {
        Self {
            application_id: application_id.to_string(),
            connector_type: ConnectorType::new("test"),
            profile_loads: AtomicUsize::new(0),
        }
    }

    pub fn profile_loads(&self) -> usize {
        self.profile_loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for TestAdapter {
    fn name(&self) -> &str {
        "test"
    }

    fn application_id(&self) -> &str {
        &self.application_id
    }

    fn connector_type(&self) -> &ConnectorType {
        &self.connector_type
    }

    fn register_inbound_endpoint(
        &self,
        controller: Arc<DispatchController>,
        endpoints: &mut EndpointRegistrar,
    ) {
        let application_id = self.application_id.clone();
        endpoints.post(
            "test",
            "/test",
            handler_fn(move |request| {
                let controller = Arc::clone(&controller);
                let application_id = application_id.clone();
                async move { controller.dispatch(&application_id, request).await }
            }),
        );
    }

    async fn authenticate(&self, request: &InboundRequest) -> AuthResult<()> {
        match request.header("x-deny") {
            Some(_) => Err(AuthError::MissingToken),
            None => Ok(()),
        }
    }

    fn parse(&self, request: &InboundRequest) -> AdapterResult<Option<ParsedEvent>> {
        let payload: TestPayload = request.body_json()?;
        if payload.text.is_empty() {
            return Ok(None);
        }
        let action = Action::sentence(
            PlayerId::user(payload.user),
            PlayerId::bot("bot"),
            self.application_id.clone(),
            payload.text,
        );
        Ok(Some(ParsedEvent::new(action)))
    }

    fn create_callback(
        &self,
        _request: &InboundRequest,
        parsed: &ParsedEvent,
        responder: Responder,
    ) -> BoxedCallback {
        Box::new(TestCallback {
            application_id: self.application_id.clone(),
            locale: parsed.locale.clone().unwrap_or_default(),
            buffer: ResponseBuffer::new(),
            responder,
        })
    }

    async fn load_profile(
        &self,
        callback: &dyn ConnectorCallback,
        _user_id: &PlayerId,
    ) -> UserPreferences {
        self.profile_loads.fetch_add(1, Ordering::SeqCst);
        let mut profile = UserPreferences::with_locale(callback.locale().clone());
        profile.first_name = Some("Test".into());
        profile
    }
}

pub struct TestCallback {
    application_id: String,
    locale: Locale,
    pub buffer: ResponseBuffer,
    responder: Responder,
}

impl TestCallback {
    /// A callback whose responses go nowhere.
    pub fn detached() -> Self {
        let (responder, _) = Responder::channel();
        Self {
            application_id: "test".into(),
            locale: Locale::english(),
            buffer: ResponseBuffer::new(),
            responder,
        }
    }
}

impl ConnectorCallback for TestCallback {
    fn application_id(&self) -> &str {
        &self.application_id
    }

    fn locale(&self) -> &Locale {
        &self.locale
    }

    fn append(&mut self, action: Action, delay: Duration) {
        self.buffer.push(action, delay);
    }

    fn flush(&mut self, status: FlushStatus) {
        let Some(actions) = self.buffer.take_for_flush() else {
            return;
        };
        let messages: Vec<_> = actions
            .iter()
            .filter_map(|a| a.action.text().map(str::to_string))
            .collect();
        let (code, label) = match status {
            FlushStatus::Answered => (200, "answered".to_string()),
            FlushStatus::Skipped => (200, "skipped".to_string()),
            FlushStatus::Failed(cause) => (500, cause.to_string()),
        };
        self.responder.respond(InboundResponse::json(
            code,
            &json!({ "status": label, "messages": messages }),
        ));
    }

    fn is_flushed(&self) -> bool {
        self.buffer.is_flushed()
    }
}

/// Bot logic driven by the inbound text.
///
/// - `abc`: sends `A`, `B`, `C`
/// - `fail`: sends `partial`, then errors
/// - `panic`: panics
/// - `skip`: skips
/// - `card`: sends a generic message titled `Card`
/// - `hold:<ms>`: waits, then answers
/// - anything else: echoes
#[derive(Default)]
pub struct ScriptedLogic {
    calls: AtomicUsize,
    inside: AtomicUsize,
    max_inside: AtomicUsize,
}

impl ScriptedLogic {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_inside(&self) -> usize {
        self.max_inside.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BotLogic for ScriptedLogic {
    async fn handle(&self, turn: &mut Turn<'_>) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inside.fetch_max(now, Ordering::SeqCst);

        let text = turn.text().unwrap_or_default().to_string();
        let result = match text.as_str() {
            "abc" => {
                turn.send("A").await;
                turn.send("B").await;
                turn.end("C").await;
                Ok(())
            }
            "fail" => {
                turn.send("partial").await;
                Err(anyhow::anyhow!("story failed"))
            }
            "panic" => panic!("story exploded"),
            "skip" => {
                turn.skip();
                Ok(())
            }
            "card" => {
                let mut card = GenericMessage::text("Card");
                card.texts.insert(SUBTITLE_PARAM.into(), "details".into());
                turn.send_generic(&card).await;
                turn.end("done").await;
                Ok(())
            }
            other => {
                if let Some(ms) = other.strip_prefix("hold:").and_then(|ms| ms.parse().ok()) {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
                turn.end(other).await;
                Ok(())
            }
        };

        self.inside.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
