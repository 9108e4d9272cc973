//! # Switchboard REST Adapter
//!
//! A synchronous JSON bridge to the dispatch engine, used to embed a bot in
//! web pages and to drive it from test harnesses.
//!
//! ## Overview
//!
//! - `POST {path}/{locale}` takes a [`MessageRequest`] and answers with a
//!   [`MessageResponse`] once the bot has finished its turn
//! - `GET {path}/healthcheck` answers 200
//! - An optional shared secret filters requests (`X-Switchboard-Token`)
//!
//! The locale accepts `fr-FR` and `fr_FR` forms; anything else falls back to
//! the configured default.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchboard_runtime::SwitchboardRuntime;
//! use switchboard_adapter_rest::RestAdapter;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = SwitchboardRuntime::new();
//!     runtime.set_bot_logic(Arc::new(MyBot)).await;
//!     runtime.register_adapter::<RestAdapter>().await?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Cross-Channel Rendering
//!
//! A request may ask for answers rendered for another channel through
//! `targetConnectorType`. Rendering then goes through the adapter
//! registered for that channel, so a web page can preview what a user of
//! that channel would see.

mod adapter;
pub mod callback;
pub mod config;
pub mod model;

pub use adapter::{ADAPTER_NAME, RestAdapter};
pub use callback::RestCallback;
pub use config::{RestConfig, TOKEN_HEADER};
pub use model::{MessageRequest, MessageResponse, RestRendering};
