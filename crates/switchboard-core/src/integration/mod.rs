//! Integration layer - External system interfaces.
//!
//! This module contains interfaces for integrating with external systems:
//! - The channel adapter contract
//! - The copy-on-write adapter registry
//! - Capability-based transport system

pub mod adapter;
pub mod registry;
pub mod transport;

pub use adapter::{
    Adapter, AdapterContext, BoxedAdapter, ConfigurableAdapter, FEATURE_CAROUSEL,
    FEATURE_SUGGESTIONS, ParsedEvent, SuggestionTarget,
};
pub use registry::{AdapterRegistry, RegistrySnapshot};
pub use transport::{
    BoxedInboundHandler, Endpoint, EndpointRegistrar, HttpClientCapability, HttpMethod,
    HttpServerCapability, InboundHandler, InboundRequest, InboundResponse, ListenerHandle,
    TransportContext, handler_fn,
};
