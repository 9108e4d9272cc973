//! # Switchboard
//!
//! One conversational bot, many messaging channels.
//!
//! ## Overview
//!
//! Switchboard receives user messages from heterogeneous channels,
//! normalizes them into a common event model, runs them through a single
//! bot logic against a per-user conversation timeline, and renders the
//! answers back in each channel's format and delivery style.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐     ┌────────────┐     ┌────────────────────────────────────┐
//! │ Channel  │────▶│  Adapter   │────▶│ Controller: lock, load, handle,    │
//! │  (HTTP)  │     │ auth+parse │     │ persist, respond (one per request) │
//! └──────────┘     └────────────┘     └────────────────────────────────────┘
//!                        ▲                             │
//!                        └──────── Callback ◀──────────┘
//! ```
//!
//! - **Runtime**: configuration, logging, adapters and the HTTP server
//! - **Adapters**: channel implementations (REST bridge, signed activities)
//! - **Engine**: runs your [`BotLogic`](prelude::BotLogic) for every event
//! - **Callbacks**: collect the answers and answer the channel exactly once
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchboard::prelude::*;
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl BotLogic for Echo {
//!     async fn handle(&self, turn: &mut Turn<'_>) -> anyhow::Result<()> {
//!         let text = turn.text().unwrap_or_default().to_string();
//!         turn.end(format!("You said: {text}")).await;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = SwitchboardRuntime::new();
//!     runtime.set_bot_logic(Arc::new(Echo)).await;
//!     runtime.register_adapter::<RestAdapter>().await?;
//!     runtime.register_adapter::<ActivityAdapter>().await?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `adapter-rest`: the REST bridge (default)
//! - `adapter-activity`: the signed activity channel (default)
//! - `toml-config` / `yaml-config`: configuration file formats
//! - `http-server` / `http-client`: transport capabilities (default)
//! - `json-log`: JSON log output

pub use switchboard_core as core;
pub use switchboard_runtime as runtime;
pub use switchboard_transport as transport;

#[cfg(feature = "adapter-activity")]
pub use switchboard_adapter_activity as activity;
#[cfg(feature = "adapter-rest")]
pub use switchboard_adapter_rest as rest;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use switchboard::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use switchboard_runtime::{RuntimeBuilder, SwitchboardConfig, SwitchboardRuntime};

    // Bot logic
    pub use switchboard_core::{
        Action, ActionKind, BotLogic, ConnectorMessage, ConnectorType, Event, GenericMessage,
        Locale, PlayerId, SuggestionTarget, Turn, UserTimeline,
    };

    // Custom adapters and storage
    pub use switchboard_core::{
        Adapter, AdapterRegistry, ConfigurableAdapter, ConversationStore, UserLock,
    };

    // Bundled adapters
    #[cfg(feature = "adapter-activity")]
    pub use switchboard_adapter_activity::ActivityAdapter;
    #[cfg(feature = "adapter-rest")]
    pub use switchboard_adapter_rest::RestAdapter;

    pub use std::sync::Arc;
}
