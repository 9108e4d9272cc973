//! # Switchboard Transport
//!
//! HTTP capability implementations for the Switchboard dispatch engine.
//!
//! This crate provides concrete implementations of the transport capabilities
//! defined in `switchboard-core`. Each transport is behind a feature flag.
//!
//! ## Features
//!
//! - `http-client`: outbound HTTP client capability (reqwest)
//! - `http-server`: inbound HTTP server capability (axum)
//! - `full`: All capabilities
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────┐
//! │  Adapter Layer        │  (REST, Activity)
//! │  (declares endpoints) │
//! ├───────────────────────┤
//! │  switchboard-core     │  (capability traits)
//! ├───────────────────────┤
//! │  switchboard-transport│  <- This crate (implementations)
//! ├───────────────────────┤
//! │  Network (TCP/HTTP)   │
//! └───────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchboard_transport::HttpServerCapabilityImpl;
//! use switchboard_core::{EndpointRegistrar, HttpServerCapability};
//!
//! let mut endpoints = EndpointRegistrar::new();
//! adapter.register_inbound_endpoint(controller.clone(), &mut endpoints);
//!
//! let handle = HttpServerCapabilityImpl::new()
//!     .serve("0.0.0.0:8080", endpoints.into_endpoints())
//!     .await?;
//! ```

// Transport implementations (feature-gated)
#[cfg(any(feature = "http-client", feature = "http-server"))]
pub mod http;

// Capability re-exports
#[cfg(feature = "http-server")]
pub use http::{HttpServerCapabilityImpl, router};

#[cfg(feature = "http-client")]
pub use http::HttpClientCapabilityImpl;
