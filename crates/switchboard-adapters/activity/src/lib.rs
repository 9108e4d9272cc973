//! # Switchboard Activity Adapter
//!
//! A signed-webhook channel with asynchronous replies.
//!
//! ## Overview
//!
//! The channel posts an [`Activity`] to `POST {path}` with a bearer token.
//! The adapter:
//!
//! - verifies the token against the channel's rotating signing keys, with
//!   the `serviceurl` claim bound to the activity's `serviceUrl`
//! - ignores anything that is not a user `message`
//! - acknowledges the request with 202 once the bot has finished its turn
//! - pushes every answer to `{serviceUrl}/v3/conversations/{id}/activities`,
//!   honouring per-message delays and retrying transient failures
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchboard_runtime::SwitchboardRuntime;
//! use switchboard_adapter_activity::ActivityAdapter;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = SwitchboardRuntime::new();
//!     runtime.set_bot_logic(Arc::new(MyBot)).await;
//!     runtime.register_adapter::<ActivityAdapter>().await?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! The runtime starts the adapter with its HTTP client; the signing keys
//! are then refreshed in the background until shutdown.
//!
//! ## Rendering
//!
//! Generic messages become one activity: cards are hero card attachments
//! laid out as a carousel and choices are `suggestedActions`.

mod adapter;
pub mod callback;
pub mod config;
pub mod delivery;
pub mod model;
pub mod render;

pub use adapter::{ADAPTER_NAME, ActivityAdapter};
pub use callback::ActivityCallback;
pub use config::{ActivityConfig, PushConfig};
pub use delivery::{Pusher, ReplyAddress};
pub use model::{Activity, ActivityAttachment, CardAction, ChannelAccount, ConversationAccount};
