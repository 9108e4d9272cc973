//! Runtime error types.

use thiserror::Error;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Adapter configuration deserialization failed.
    #[error("Failed to deserialize adapter config: {0}")]
    AdapterConfigDeserialize(String),

    /// Adapter error.
    #[error("Adapter error: {0}")]
    Adapter(#[from] switchboard_core::AdapterError),

    /// Transport error.
    #[error("Transport error: {0}")]
    Transport(#[from] switchboard_core::TransportError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An adapter with this application id is already registered.
    #[error("Application already registered: {0}")]
    ApplicationExists(String),

    /// The runtime needs bot logic before it can start.
    #[error("No bot logic configured")]
    MissingBotLogic,

    /// A required transport capability is not compiled in.
    #[error("Transport capability not available: {0}")]
    CapabilityMissing(&'static str),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
