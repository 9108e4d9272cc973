//! Switchboard Runtime - hosts adapters and the dispatch engine.
//!
//! [`SwitchboardRuntime`] loads the layered configuration, installs
//! logging, builds the transport capabilities enabled by cargo features,
//! starts every registered adapter and serves their inbound endpoints
//! until shutdown.
//!
//! - `http-server` (default): one HTTP listener for all adapter endpoints
//! - `http-client` (default): outbound pushes and key-set discovery
//!
//! ```ignore
//! use switchboard_runtime::SwitchboardRuntime;
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
//! Tests and embedders can supply their own capabilities instead:
//!
//! ```ignore
//! let ctx = TransportContext::new().with_http_client(Arc::new(FakeClient::default()));
//! runtime.set_transport_context(ctx).await;
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, DispatchConfig, LoggingConfig, ServerConfig,
    StoreConfig, SwitchboardConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RuntimeBuilder, SwitchboardRuntime};

pub use tracing;
