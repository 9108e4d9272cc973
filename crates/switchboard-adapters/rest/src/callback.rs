//! Synchronous callback answering the pending HTTP request.

use std::time::Duration;

use switchboard_core::dispatch::FlushStatus;
use switchboard_core::{
    Action, ActionKind, ConnectorCallback, InboundResponse, Locale, Responder, ResponseBuffer,
};
use tracing::debug;

use crate::model::MessageResponse;

/// Buffers the answers of one dispatch and writes them as one [`MessageResponse`].
///
/// A failed dispatch still returns what was buffered, with status 500 and
/// the failure cause in `error`.
pub struct RestCallback {
    application_id: String,
    locale: Locale,
    request_id: Option<String>,
    is_sentence_request: bool,
    debug_enabled: bool,
    buffer: ResponseBuffer,
    responder: Responder,
}

impl RestCallback {
    /// Creates a callback for one request.
    pub fn new(application_id: impl Into<String>, locale: Locale, responder: Responder) -> Self {
        Self {
            application_id: application_id.into(),
            locale,
            request_id: None,
            is_sentence_request: false,
            debug_enabled: false,
            buffer: ResponseBuffer::new(),
            responder,
        }
    }

    /// Echoes the inbound action in the response.
    pub fn for_request(mut self, action: &Action) -> Self {
        self.request_id = Some(action.id.clone());
        self.is_sentence_request = matches!(action.kind, ActionKind::Sentence(_));
        self.debug_enabled = action.metadata.debug_enabled;
        self
    }

    fn response(&self, messages: Vec<ActionKind>, error: Option<String>) -> MessageResponse {
        MessageResponse {
            messages,
            application_id: self.application_id.clone(),
            request_id: self.request_id.clone(),
            locale: Some(self.locale.clone()),
            is_sentence_request: self.is_sentence_request,
            error,
        }
    }
}

impl ConnectorCallback for RestCallback {
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
        let debug_enabled = self.debug_enabled;
        let messages: Vec<ActionKind> = actions
            .into_iter()
            .map(|buffered| buffered.action.kind)
            .filter(|kind| debug_enabled || !matches!(kind, ActionKind::Debug(_)))
            .collect();

        let (code, error) = match status {
            FlushStatus::Failed(cause) => (500, Some(cause.as_str().to_string())),
            FlushStatus::Answered | FlushStatus::Skipped => (200, None),
        };
        debug!(status = code, messages = messages.len(), "Writing REST response");
        let body = self.response(messages, error);
        self.responder.respond(InboundResponse::json(code, &body));
    }

    fn is_flushed(&self) -> bool {
        self.buffer.is_flushed()
    }
}
