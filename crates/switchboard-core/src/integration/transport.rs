//! Transport capability system.
//!
//! Adapters never open sockets themselves. They describe the inbound
//! endpoints they need through an [`EndpointRegistrar`] and use the
//! capabilities found in a [`TransportContext`] for outbound calls:
//!
//! ```rust,ignore
//! fn register_inbound_endpoint(&self, controller: ControllerHandle, endpoints: &mut EndpointRegistrar) {
//!     let application_id = self.application_id().to_string();
//!     endpoints.post(
//!         self.name(),
//!         "/webhook",
//!         handler_fn(move |request| {
//!             let controller = controller.clone();
//!             let application_id = application_id.clone();
//!             async move { controller.dispatch(&application_id, request).await }
//!         }),
//!     );
//! }
//! ```
//!
//! Concrete capabilities live in `switchboard-transport`.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::foundation::TransportResult;

// =============================================================================
// Inbound Requests and Responses
// =============================================================================

/// HTTP method of an inbound endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST.
    Post,
}

/// A raw inbound transport request.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// Matched route path.
    pub path: String,
    /// Values captured by `{name}` route segments.
    pub path_params: HashMap<String, String>,
    /// Headers with lowercase names.
    pub headers: HashMap<String, String>,
    /// Raw body.
    pub body: Vec<u8>,
    /// Peer address, when known.
    pub remote_addr: Option<String>,
}

impl InboundRequest {
    /// Creates a request carrying a body.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    /// Creates a request with a JSON body.
    pub fn json<T: Serialize>(value: &T) -> Self {
        let mut request = Self::new(serde_json::to_vec(value).unwrap_or_default());
        request
            .headers
            .insert("content-type".into(), "application/json".into());
        request
    }

    /// Adds a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Adds a path parameter.
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    /// Returns a header value, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns a path parameter.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// Decodes the body as JSON.
    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// The terminal reply to an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundResponse {
    /// HTTP status.
    pub status: u16,
    /// Content type of the body.
    pub content_type: Option<&'static str>,
    /// Body.
    pub body: Vec<u8>,
}

impl InboundResponse {
    /// A response with no body.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: Vec::new(),
        }
    }

    /// A `200 OK` with no body.
    pub fn ok() -> Self {
        Self::empty(200)
    }

    /// A plain-text response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some("text/plain; charset=utf-8"),
            body: body.into().into_bytes(),
        }
    }

    /// A JSON response.
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: Some("application/json"),
                body,
            },
            Err(e) => {
                warn!(error = %e, "Failed to encode response body");
                Self::text(500, "response encoding failed")
            }
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body as JSON.
    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Handles requests for one endpoint.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Produces the terminal response for a request.
    async fn handle(&self, request: InboundRequest) -> InboundResponse;
}

/// A shared inbound handler.
pub type BoxedInboundHandler = Arc<dyn InboundHandler>;

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> InboundHandler for FnHandler<F>
where
    F: Fn(InboundRequest) -> Fut + Send + Sync,
    Fut: Future<Output = InboundResponse> + Send,
{
    async fn handle(&self, request: InboundRequest) -> InboundResponse {
        (self.0)(request).await
    }
}

/// Wraps an async closure as an inbound handler.
pub fn handler_fn<F, Fut>(f: F) -> BoxedInboundHandler
where
    F: Fn(InboundRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = InboundResponse> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

// =============================================================================
// Endpoints
// =============================================================================

/// One inbound route.
#[derive(Clone)]
pub struct Endpoint {
    /// Adapter that registered the route.
    pub owner: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Route path; `{name}` segments are captured.
    pub path: String,
    /// Request handler.
    pub handler: BoxedInboundHandler,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("owner", &self.owner)
            .field("method", &self.method)
            .field("path", &self.path)
            .finish()
    }
}

/// Collects the inbound routes adapters ask for.
///
/// Registering the same method and path twice keeps the latest handler.
#[derive(Debug, Default)]
pub struct EndpointRegistrar {
    endpoints: Vec<Endpoint>,
}

impl EndpointRegistrar {
    /// Creates an empty registrar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route.
    pub fn add(
        &mut self,
        owner: &str,
        method: HttpMethod,
        path: &str,
        handler: BoxedInboundHandler,
    ) {
        let path = normalize_path(path);
        if let Some(existing) = self
            .endpoints
            .iter_mut()
            .find(|e| e.method == method && e.path == path)
        {
            warn!(
                path = %path,
                previous = %existing.owner,
                owner,
                "Endpoint registered twice, keeping the latest handler"
            );
            existing.owner = owner.to_string();
            existing.handler = handler;
            return;
        }
        self.endpoints.push(Endpoint {
            owner: owner.to_string(),
            method,
            path,
            handler,
        });
    }

    /// Registers a POST route.
    pub fn post(&mut self, owner: &str, path: &str, handler: BoxedInboundHandler) {
        self.add(owner, HttpMethod::Post, path, handler);
    }

    /// Registers a GET route.
    pub fn get(&mut self, owner: &str, path: &str, handler: BoxedInboundHandler) {
        self.add(owner, HttpMethod::Get, path, handler);
    }

    /// Returns the registered routes.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Consumes the registrar.
    pub fn into_endpoints(self) -> Vec<Endpoint> {
        self.endpoints
    }

    /// Finds the handler of an exact route.
    pub fn find(&self, method: HttpMethod, path: &str) -> Option<&BoxedInboundHandler> {
        let path = normalize_path(path);
        self.endpoints
            .iter()
            .find(|e| e.method == method && e.path == path)
            .map(|e| &e.handler)
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

// =============================================================================
// Transport Capabilities
// =============================================================================

/// HTTP server capability.
#[async_trait]
pub trait HttpServerCapability: Send + Sync {
    /// Serves every endpoint on `addr`.
    async fn serve(&self, addr: &str, endpoints: Vec<Endpoint>) -> TransportResult<ListenerHandle>;
}

/// HTTP client capability.
#[async_trait]
pub trait HttpClientCapability: Send + Sync {
    /// Sends a JSON POST and decodes the JSON answer (`null` when empty).
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        bearer_token: Option<&str>,
    ) -> TransportResult<serde_json::Value>;

    /// Sends a GET and decodes the JSON answer.
    async fn get_json(&self, url: &str) -> TransportResult<serde_json::Value>;
}

/// Handle to a listener.
///
/// Dropping this handle stops the listener.
#[derive(Debug)]
pub struct ListenerHandle {
    /// Unique identifier for this listener.
    pub id: String,
    /// Bound address.
    pub local_addr: Option<SocketAddr>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl ListenerHandle {
    /// Creates a new listener handle.
    pub fn new(
        id: impl Into<String>,
        local_addr: Option<SocketAddr>,
        shutdown_tx: tokio::sync::oneshot::Sender<()>,
    ) -> Self {
        Self {
            id: id.into(),
            local_addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Stops the listener.
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Transport capabilities available to adapters.
#[derive(Clone, Default)]
pub struct TransportContext {
    http_server: Option<Arc<dyn HttpServerCapability>>,
    http_client: Option<Arc<dyn HttpClientCapability>>,
}

impl TransportContext {
    /// Creates a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the HTTP server capability.
    pub fn with_http_server(mut self, cap: Arc<dyn HttpServerCapability>) -> Self {
        self.http_server = Some(cap);
        self
    }

    /// Registers the HTTP client capability.
    pub fn with_http_client(mut self, cap: Arc<dyn HttpClientCapability>) -> Self {
        self.http_client = Some(cap);
        self
    }

    /// Gets the HTTP server capability if available.
    pub fn http_server(&self) -> Option<&Arc<dyn HttpServerCapability>> {
        self.http_server.as_ref()
    }

    /// Gets the HTTP client capability if available.
    pub fn http_client(&self) -> Option<&Arc<dyn HttpClientCapability>> {
        self.http_client.as_ref()
    }
}
