//! # Switchboard Core
//!
//! The dispatch engine of the Switchboard conversation platform.
//!
//! A single conversational bot is exposed on several messaging channels at
//! once. Every inbound request becomes one dispatch: the channel adapter
//! authenticates and parses it, the user's timeline is loaded under a
//! per-user lock, the bot logic answers, the timeline is persisted, and the
//! channel gets exactly one response.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! Protocol-agnostic vocabulary:
//! - **Identities**: [`PlayerId`], [`ConnectorType`]
//! - **Events and actions**: [`Event`], [`Action`]
//! - **Messages**: the cross-channel [`GenericMessage`] envelope
//! - **Errors**: [`DispatchError`], [`FailureCause`]
//!
//! ### Conversation Layer
//!
//! Durable user state:
//! - **Timelines**: [`UserTimeline`], [`Dialog`], [`Story`], time-boxed flags
//! - **Persistence**: [`ConversationStore`] and [`InMemoryStore`]
//! - **Serialization**: [`UserLock`]
//!
//! ### Integration Layer
//!
//! Channel interfaces:
//! - **Adapters**: [`Adapter`], [`ConfigurableAdapter`]
//! - **Registry**: [`AdapterRegistry`], read lock-free during dispatch
//! - **Transport**: [`EndpointRegistrar`], [`TransportContext`]
//!
//! ### Dispatch Layer
//!
//! - **Controller**: [`DispatchController`], the per-request pipeline
//! - **Engine**: [`BotEngine`] running a [`BotLogic`]
//! - **Callbacks**: [`ConnectorCallback`], flushed exactly once
//!
//! ## Dispatch Pipeline
//!
//! ```text
//! ┌─────────┐   ┌──────────┐   ┌────────┐   ┌────────┐   ┌───────────┐
//! │ Adapter │──▶│ Parse +  │──▶│  Lock  │──▶│ Engine │──▶│ Persist + │
//! │ (HTTP)  │   │   Auth   │   │ + Load │   │        │   │  Respond  │
//! └─────────┘   └──────────┘   └────────┘   └────────┘   └───────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use switchboard_core::prelude::*;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl BotLogic for Echo {
//!     async fn handle(&self, turn: &mut Turn<'_>) -> anyhow::Result<()> {
//!         let text = turn.text().unwrap_or_default().to_string();
//!         turn.end(text).await;
//!         Ok(())
//!     }
//! }
//!
//! let controller = Arc::new(DispatchController::new(
//!     Arc::new(AdapterRegistry::new()),
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(InMemoryUserLock::new()),
//!     BotEngine::new(Arc::new(Echo)),
//!     DispatchSettings::default(),
//! ));
//! ```

// Architectural layers
pub mod auth;
pub mod conversation;
pub mod dispatch;
pub mod foundation;
pub mod integration;
pub mod nlp;

// Re-export foundation types
pub use foundation::{
    Action, ActionKind, AdapterError, AdapterResult, AuthError, AuthResult, ConnectorMessage,
    ConnectorType, DispatchError, DispatchResult, Event, EventHeader, FailureCause, GenericMessage,
    Locale, PlayerId, PlayerType, StoreError, StoreResult, TransportError, TransportResult,
};

// Re-export conversation types
pub use conversation::{
    BoxedStore, BoxedUserLock, ConversationStore, Dialog, InMemoryStore, InMemoryUserLock, Story,
    UserLock, UserPreferences, UserState, UserTimeline,
};

// Re-export integration types
pub use integration::{
    Adapter, AdapterContext, AdapterRegistry, BoxedAdapter, ConfigurableAdapter, Endpoint,
    EndpointRegistrar, FEATURE_CAROUSEL, FEATURE_SUGGESTIONS, HttpClientCapability, HttpMethod,
    HttpServerCapability, InboundHandler, InboundRequest, InboundResponse, ListenerHandle,
    ParsedEvent, SuggestionTarget, TransportContext, handler_fn,
};

// Re-export dispatch types
pub use dispatch::{
    BotEngine, BotLogic, BoxedBotLogic, BoxedCallback, Completion, ConnectorCallback,
    DispatchController, DispatchOutcome, DispatchSettings, Responder, ResponseBuffer, Turn,
};

pub use auth::{AuthGuard, KeySetCache};
pub use nlp::{BoxedClassifier, Classification, Classifier, KeywordClassifier};

/// Prelude for common imports.
pub mod prelude {
    pub use super::conversation::{InMemoryStore, InMemoryUserLock, UserTimeline};
    pub use super::dispatch::{BotEngine, BotLogic, DispatchController, DispatchSettings, Turn};
    pub use super::foundation::*;
    pub use super::integration::{AdapterRegistry, ConfigurableAdapter};
}
