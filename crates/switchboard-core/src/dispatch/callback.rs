//! Per-dispatch response sink.
//!
//! Each inbound event gets exactly one [`ConnectorCallback`], created by the
//! adapter and owned by the dispatch task. Actions are appended in write
//! order; the terminal flush happens once, whichever of
//! [`event_answered`](ConnectorCallback::event_answered),
//! [`event_skipped`](ConnectorCallback::event_skipped) or
//! [`exception_thrown`](ConnectorCallback::exception_thrown) comes first.

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::foundation::{Action, Event, FailureCause, Locale};
use crate::integration::InboundResponse;

/// How a dispatch ended, as seen by the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Bot logic completed.
    Answered,
    /// Bot logic declined to answer.
    Skipped,
    /// The dispatch failed; the cause takes precedence in the response status.
    Failed(FailureCause),
}

impl FlushStatus {
    /// Returns true for failures.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// An action waiting for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionWithDelay {
    /// The action.
    pub action: Action,
    /// Pause before delivering it, relative to the previous action.
    pub delay: Duration,
}

/// Sink for the actions produced while handling one event.
pub trait ConnectorCallback: Send + Sync {
    /// Application the event arrived for.
    fn application_id(&self) -> &str;

    /// Locale of the request.
    fn locale(&self) -> &Locale;

    /// Buffers an action behind `delay`.
    fn append(&mut self, action: Action, delay: Duration);

    /// Produces the terminal response, or ignores the call when already flushed.
    fn flush(&mut self, status: FlushStatus);

    /// Returns true once the terminal response has been produced.
    fn is_flushed(&self) -> bool;

    /// Bot logic declined to answer.
    fn event_skipped(&mut self, event: &Event) {
        debug!(event = event.label(), "Event skipped");
        self.flush(FlushStatus::Skipped);
    }

    /// Bot logic completed normally.
    fn event_answered(&mut self, event: &Event) {
        debug!(event = event.label(), "Event answered");
        self.flush(FlushStatus::Answered);
    }

    /// The dispatch failed.
    fn exception_thrown(&mut self, event: &Event, cause: FailureCause) {
        debug!(event = event.label(), %cause, "Event failed");
        self.flush(FlushStatus::Failed(cause));
    }
}

/// A boxed callback.
pub type BoxedCallback = Box<dyn ConnectorCallback>;

/// The ordered action buffer every callback embeds.
///
/// [`take_for_flush`](Self::take_for_flush) hands the actions out exactly once.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    actions: Vec<ActionWithDelay>,
    flushed: bool,
}

impl ResponseBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an action.
    pub fn push(&mut self, action: Action, delay: Duration) {
        if self.flushed {
            warn!(action_id = %action.id, "Action appended after flush, dropping it");
            return;
        }
        self.actions.push(ActionWithDelay { action, delay });
    }

    /// Buffered actions, in write order.
    pub fn actions(&self) -> &[ActionWithDelay] {
        &self.actions
    }

    /// Number of buffered actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns true when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns true after the first flush.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Returns the buffered actions on the first call, `None` afterwards.
    pub fn take_for_flush(&mut self) -> Option<Vec<ActionWithDelay>> {
        if self.flushed {
            warn!("Event already answered, ignoring second flush");
            return None;
        }
        self.flushed = true;
        Some(std::mem::take(&mut self.actions))
    }
}

/// One-shot slot carrying the terminal response back to the transport.
#[derive(Debug)]
pub struct Responder {
    tx: Option<oneshot::Sender<InboundResponse>>,
}

/// Receiving side of a [`Responder`].
pub type ResponseReceiver = oneshot::Receiver<InboundResponse>;

impl Responder {
    /// Creates a responder and its receiver.
    pub fn channel() -> (Self, ResponseReceiver) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Sends the response. Returns false when one was already sent.
    pub fn respond(&mut self, response: InboundResponse) -> bool {
        match self.tx.take() {
            Some(tx) => {
                if tx.send(response).is_err() {
                    debug!("Transport stopped waiting for the response");
                }
                true
            }
            None => false,
        }
    }

    /// Returns true once a response has been sent.
    pub fn is_used(&self) -> bool {
        self.tx.is_none()
    }
}
