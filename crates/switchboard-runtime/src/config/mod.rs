//! Configuration module for the Switchboard runtime.
//!
//! This module provides layered configuration loading and validation for
//! logging, the HTTP server, dispatch limits, the store and adapters.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    DispatchConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, ServerConfig, SpanEventConfig,
    StoreConfig, SwitchboardConfig,
};
pub use validation::validate_config;
