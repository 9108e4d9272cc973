//! Asynchronous callback: acknowledge first, push afterwards.

use std::sync::Arc;
use std::time::Duration;

use switchboard_core::dispatch::FlushStatus;
use switchboard_core::{
    Action, ConnectorCallback, InboundResponse, Locale, Responder, ResponseBuffer,
};
use tracing::{debug, warn};

use crate::delivery::{Pusher, ReplyAddress};
use crate::render::activities_for;

/// Acknowledges the inbound request once the dispatch ends, then pushes
/// the buffered actions to the conversation.
///
/// The acknowledgement is 202, or 500 when the dispatch failed. Buffered
/// actions are pushed in both cases.
pub struct ActivityCallback {
    application_id: String,
    locale: Locale,
    buffer: ResponseBuffer,
    responder: Responder,
    delivery: Option<(Arc<Pusher>, Arc<ReplyAddress>)>,
}

impl ActivityCallback {
    /// Creates a callback without a delivery target; answers are dropped.
    pub fn new(application_id: impl Into<String>, locale: Locale, responder: Responder) -> Self {
        Self {
            application_id: application_id.into(),
            locale,
            buffer: ResponseBuffer::new(),
            responder,
            delivery: None,
        }
    }

    /// Pushes the answers through `pusher` to `address`.
    pub fn delivering_to(mut self, pusher: Arc<Pusher>, address: ReplyAddress) -> Self {
        self.delivery = Some((pusher, Arc::new(address)));
        self
    }
}

impl ConnectorCallback for ActivityCallback {
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
        let code = if status.is_failure() { 500 } else { 202 };
        self.responder.respond(InboundResponse::empty(code));

        if actions.is_empty() {
            return;
        }
        let Some((pusher, address)) = &self.delivery else {
            warn!(count = actions.len(), "No conversation to push answers to, dropping them");
            return;
        };
        let entries = actions
            .into_iter()
            .map(|buffered| (buffered.delay, activities_for(&buffered.action.kind)))
            .collect::<Vec<_>>();
        debug!(
            conversation = %address.conversation.id,
            count = entries.len(),
            "Scheduling pushes"
        );
        pusher.schedule(Arc::clone(address), entries);
    }

    fn is_flushed(&self) -> bool {
        self.buffer.is_flushed()
    }
}
