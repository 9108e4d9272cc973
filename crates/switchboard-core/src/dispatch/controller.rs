//! The dispatch controller.
//!
//! One call to [`DispatchController::dispatch`] walks one inbound request
//! through
//!
//! ```text
//! RECEIVED → AUTHENTICATED → PARSED → LOCKED → LOADED → HANDLED → PERSISTED → RESPONDED
//! ```
//!
//! Every state may exit to `FAILED_RESPONDED`; the transport always gets a
//! well-formed response and the user lock is always released.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::callback::{ConnectorCallback, Responder};
use super::engine::{BotEngine, Completion};
use crate::conversation::{BoxedStore, BoxedUserLock, DEFAULT_NAMESPACE, UserLockGuard};
use crate::foundation::{DispatchError, DispatchResult, Event, FailureCause, Locale, PlayerId};
use crate::integration::{AdapterRegistry, BoxedAdapter, InboundRequest, InboundResponse};

/// Pipeline states, as logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Received,
    Authenticated,
    Parsed,
    Locked,
    Loaded,
    Handled,
    Persisted,
    Responded,
    FailedResponded,
    Unlocked,
}

impl DispatchStage {
    /// Returns the stage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Authenticated => "AUTHENTICATED",
            Self::Parsed => "PARSED",
            Self::Locked => "LOCKED",
            Self::Loaded => "LOADED",
            Self::Handled => "HANDLED",
            Self::Persisted => "PERSISTED",
            Self::Responded => "RESPONDED",
            Self::FailedResponded => "FAILED_RESPONDED",
            Self::Unlocked => "UNLOCKED",
        }
    }
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn stage(stage: DispatchStage) {
    debug!(stage = %stage, "Dispatch stage");
}

/// How a dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The callback flushed an answer (possibly empty when skipped).
    Responded,
    /// The request carried no event.
    NoOp,
    /// Authentication failed.
    Rejected,
    /// The dispatch failed; a failure response was still produced.
    Failed(FailureCause),
}

/// Controller tuning.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Dispatches allowed to run at once. Waiting on a user lock does not count.
    pub worker_limit: usize,
    /// Longest wait for a user lock. `None` waits forever.
    pub lock_timeout: Option<Duration>,
    /// Deadline of the locked part of a dispatch.
    pub dispatch_timeout: Option<Duration>,
    /// Store namespace.
    pub namespace: String,
    /// Locale used when a request has none.
    pub default_locale: Locale,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            worker_limit: 64,
            lock_timeout: None,
            dispatch_timeout: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_locale: Locale::english(),
        }
    }
}

/// Accepts inbound requests and runs them through the pipeline.
pub struct DispatchController {
    registry: Arc<AdapterRegistry>,
    store: BoxedStore,
    lock: BoxedUserLock,
    engine: BotEngine,
    settings: DispatchSettings,
    workers: Arc<Semaphore>,
}

impl DispatchController {
    /// Creates a controller.
    pub fn new(
        registry: Arc<AdapterRegistry>,
        store: BoxedStore,
        lock: BoxedUserLock,
        engine: BotEngine,
        settings: DispatchSettings,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(settings.worker_limit.max(1)));
        Self {
            registry,
            store,
            lock,
            engine,
            settings,
            workers,
        }
    }

    /// The adapter registry.
    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// The conversation store.
    pub fn store(&self) -> &BoxedStore {
        &self.store
    }

    /// The controller settings.
    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Dispatches a request for `application_id` and returns the terminal response.
    pub async fn dispatch(self: &Arc<Self>, application_id: &str, request: InboundRequest) -> InboundResponse {
        self.dispatch_with_outcome(application_id, request).await.0
    }

    /// Like [`dispatch`](Self::dispatch), also reporting how the dispatch ended.
    pub async fn dispatch_with_outcome(
        self: &Arc<Self>,
        application_id: &str,
        request: InboundRequest,
    ) -> (InboundResponse, DispatchOutcome) {
        let Some(adapter) = self.registry.by_application_id(application_id) else {
            let e = DispatchError::UnknownApplication(application_id.to_string());
            error!(error = %e, "Dispatch refused");
            return (
                InboundResponse::text(404, e.to_string()),
                DispatchOutcome::Failed(e.cause()),
            );
        };

        let span = info_span!(
            "dispatch",
            request_id = %uuid::Uuid::new_v4(),
            application_id,
            connector_type = %adapter.connector_type(),
        );
        Arc::clone(self)
            .receive(adapter, request)
            .instrument(span)
            .await
    }

    async fn receive(
        self: Arc<Self>,
        adapter: BoxedAdapter,
        request: InboundRequest,
    ) -> (InboundResponse, DispatchOutcome) {
        stage(DispatchStage::Received);

        if let Err(e) = adapter.authenticate(&request).await {
            warn!(error = %e, outcome = "rejected", "Request rejected");
            return (adapter.rejection_response(&e), DispatchOutcome::Rejected);
        }
        stage(DispatchStage::Authenticated);

        let mut parsed = match adapter.parse(&request) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                info!(outcome = "no_op", "Request carried no event");
                return (adapter.noop_response(), DispatchOutcome::NoOp);
            }
            Err(e) => {
                warn!(error = %e, outcome = "no_op", "Request payload could not be parsed");
                return (adapter.noop_response(), DispatchOutcome::NoOp);
            }
        };
        stage(DispatchStage::Parsed);

        if parsed.locale.is_none() {
            parsed.locale = Some(self.settings.default_locale.clone());
        }
        let (responder, receiver) = Responder::channel();
        let callback = adapter.create_callback(&request, &parsed, responder);

        let task = {
            let controller = Arc::clone(&self);
            let adapter = Arc::clone(&adapter);
            tokio::spawn(
                async move {
                    controller
                        .run(adapter, parsed.event, parsed.prior_user_id, parsed.group_id, callback)
                        .await
                }
                .in_current_span(),
            )
        };

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let cause = if e.is_panic() {
                    FailureCause::Business
                } else {
                    FailureCause::Internal
                };
                let e = DispatchError::WorkerLost(e.to_string());
                error!(error = %e, %cause, outcome = "failed", "Dispatch aborted");
                DispatchOutcome::Failed(cause)
            }
        };

        let response = match receiver.await {
            Ok(response) => response,
            Err(_) => {
                let cause = match outcome {
                    DispatchOutcome::Failed(cause) => cause,
                    _ => FailureCause::Internal,
                };
                warn!(%cause, "Callback dropped without responding");
                adapter.error_response(cause)
            }
        };
        (response, outcome)
    }

    async fn run(
        &self,
        adapter: BoxedAdapter,
        mut event: Event,
        prior_user_id: Option<PlayerId>,
        group_id: Option<String>,
        mut callback: Box<dyn ConnectorCallback>,
    ) -> DispatchOutcome {
        let started = Instant::now();
        let user_id = event.player_id().clone();

        let pass = self.locked_pass(
            &adapter,
            &mut event,
            &user_id,
            prior_user_id.as_ref(),
            group_id.as_deref(),
            callback.as_mut(),
        );
        let result = match self.settings.dispatch_timeout {
            Some(limit) => match tokio::time::timeout(limit, pass).await {
                Ok(result) => result,
                Err(_) => Err(DispatchError::DispatchTimeout {
                    limit_ms: limit.as_millis() as u64,
                }),
            },
            None => pass.await,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(Completion::Answered) => {
                if !callback.is_flushed() {
                    callback.event_answered(&event);
                }
                stage(DispatchStage::Responded);
                info!(user_id = %user_id, elapsed_ms, outcome = "responded", "Dispatch completed");
                DispatchOutcome::Responded
            }
            Ok(Completion::Skipped) => {
                callback.event_skipped(&event);
                stage(DispatchStage::Responded);
                info!(user_id = %user_id, elapsed_ms, outcome = "skipped", "Dispatch completed");
                DispatchOutcome::Responded
            }
            Err(e) => {
                let cause = e.cause();
                match cause {
                    FailureCause::LockTimeout | FailureCause::DispatchTimeout => {
                        warn!(user_id = %user_id, elapsed_ms, error = %e, %cause, outcome = "failed", "Dispatch failed")
                    }
                    _ => {
                        error!(user_id = %user_id, elapsed_ms, error = %e, %cause, outcome = "failed", "Dispatch failed")
                    }
                }
                callback.exception_thrown(&event, cause);
                stage(DispatchStage::FailedResponded);
                DispatchOutcome::Failed(cause)
            }
        }
    }

    async fn locked_pass(
        &self,
        adapter: &BoxedAdapter,
        event: &mut Event,
        user_id: &PlayerId,
        prior_user_id: Option<&PlayerId>,
        group_id: Option<&str>,
        callback: &mut dyn ConnectorCallback,
    ) -> DispatchResult<Completion> {
        let guard = self.acquire(&user_id.id).await?;
        stage(DispatchStage::Locked);
        // Requests queued on a busy user must not hold a worker.
        let permit = self
            .workers
            .acquire()
            .await
            .map_err(|e| DispatchError::WorkerLost(e.to_string()))?;

        let namespace = self.settings.namespace.as_str();
        let mut timeline = self
            .store
            .load_with_last_valid_dialog(namespace, user_id, prior_user_id, group_id)
            .await
            .map_err(DispatchError::Load)?;
        stage(DispatchStage::Loaded);

        let handled = self
            .engine
            .handle(event, &mut timeline, adapter.as_ref(), callback, &self.registry)
            .await;
        stage(DispatchStage::Handled);

        let saved = self.store.save(namespace, &timeline).await;
        let result = match (handled, saved) {
            (Ok(completion), Ok(())) => {
                stage(DispatchStage::Persisted);
                Ok(completion)
            }
            (Ok(_), Err(e)) => Err(DispatchError::Persistence(e)),
            (Err(e), saved) => {
                if let Err(store_error) = saved {
                    error!(error = %store_error, "Timeline of a failed dispatch not saved");
                }
                Err(DispatchError::Business(e))
            }
        };
        drop(permit);
        drop(guard);
        stage(DispatchStage::Unlocked);
        result
    }

    async fn acquire(&self, user_id: &str) -> DispatchResult<UserLockGuard> {
        match self.settings.lock_timeout {
            Some(limit) => tokio::time::timeout(limit, self.lock.lock(user_id))
                .await
                .map_err(|_| DispatchError::LockTimeout {
                    user_id: user_id.to_string(),
                    waited_ms: limit.as_millis() as u64,
                }),
            None => Ok(self.lock.lock(user_id).await),
        }
    }
}
