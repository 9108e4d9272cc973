//! HTTP server capability implementation.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{ConnectInfo, Path, Request},
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{MethodRouter, get, post},
};
use switchboard_core::{
    Endpoint, HttpMethod, HttpServerCapability, InboundRequest, InboundResponse, ListenerHandle,
    TransportError, TransportResult, integration::BoxedInboundHandler,
};
use tracing::{debug, error, info, trace};

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// HTTP server capability implementation.
pub struct HttpServerCapabilityImpl;

impl HttpServerCapabilityImpl {
    /// Creates a new HTTP server capability.
    pub fn new() -> Self {
        Self
    }
}

impl Default for HttpServerCapabilityImpl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpServerCapability for HttpServerCapabilityImpl {
    async fn serve(&self, addr: &str, endpoints: Vec<Endpoint>) -> TransportResult<ListenerHandle> {
        let count = endpoints.len();
        let router = router(endpoints);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        let actual_addr = listener.local_addr()?;

        info!(addr = %actual_addr, endpoints = count, "HTTP server listening");

        // Create shutdown channel
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();

        // Spawn the server
        tokio::spawn(async move {
            let server = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            );

            tokio::select! {
                result = server => {
                    if let Err(e) = result {
                        error!(error = %e, "HTTP server error");
                    }
                }
                _ = &mut shutdown_rx => {
                    info!("HTTP server shutting down");
                }
            }
        });

        Ok(ListenerHandle::new(
            format!("http-server-{actual_addr}"),
            Some(actual_addr),
            shutdown_tx,
        ))
    }
}

/// Builds the router serving `endpoints`.
///
/// Endpoints sharing a path are merged into one method router.
pub fn router(endpoints: Vec<Endpoint>) -> Router {
    let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();
    for endpoint in endpoints {
        debug!(
            owner = %endpoint.owner,
            method = ?endpoint.method,
            path = %endpoint.path,
            "Mounting endpoint"
        );
        let handler = endpoint.handler;
        let path = endpoint.path.clone();
        let route = move |params: Path<HashMap<String, String>>, request: Request| {
            forward(handler.clone(), path.clone(), params, request)
        };
        let entry = by_path.remove(&endpoint.path).unwrap_or_default();
        let merged = match endpoint.method {
            HttpMethod::Get => entry.merge(get(route)),
            HttpMethod::Post => entry.merge(post(route)),
        };
        by_path.insert(endpoint.path, merged);
    }

    by_path
        .into_iter()
        .fold(Router::new(), |router, (path, methods)| {
            router.route(&path, methods)
        })
}

async fn forward(
    handler: BoxedInboundHandler,
    path: String,
    Path(path_params): Path<HashMap<String, String>>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            debug!(error = %e, path = %path, "Rejected request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();
    let remote_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());

    trace!(path = %path, len = body.len(), "Received HTTP request");

    let inbound = InboundRequest {
        path,
        path_params,
        headers,
        body: body.to_vec(),
        remote_addr,
    };
    into_response(handler.handle(inbound).await)
}

fn into_response(response: InboundResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = (status, Body::from(response.body)).into_response();
    if let Some(content_type) = response.content_type {
        out.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;
    use switchboard_core::{EndpointRegistrar, handler_fn};
    use tower::ServiceExt;

    fn endpoints() -> Vec<Endpoint> {
        let mut registrar = EndpointRegistrar::new();
        registrar.post(
            "rest",
            "/io/app/{locale}",
            handler_fn(|req: InboundRequest| async move {
                InboundResponse::json(
                    200,
                    &serde_json::json!({
                        "locale": req.path_param("locale"),
                        "token": req.header("X-Token"),
                        "body": String::from_utf8_lossy(&req.body),
                        "peer": req.remote_addr,
                    }),
                )
            }),
        );
        registrar.get(
            "rest",
            "/io/app/{locale}",
            handler_fn(|_req| async { InboundResponse::text(200, "get") }),
        );
        registrar.get(
            "rest",
            "/healthcheck",
            handler_fn(|_req| async { InboundResponse::empty(204) }),
        );
        registrar.into_endpoints()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), MAX_BODY_BYTES).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn forwards_params_headers_and_body() {
        let response = router(endpoints())
            .oneshot(
                HttpRequest::post("/io/app/fr")
                    .header("x-token", "secret")
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["locale"], "fr");
        assert_eq!(body["token"], "secret");
        assert_eq!(body["body"], "hello");
    }

    #[tokio::test]
    async fn forwards_peer_address() {
        let peer = SocketAddr::from(([10, 0, 0, 7], 4242));
        let response = router(endpoints())
            .oneshot(
                HttpRequest::post("/io/app/en")
                    .extension(ConnectInfo(peer))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["peer"], "10.0.0.7:4242");

        let response = router(endpoints())
            .oneshot(HttpRequest::post("/io/app/en").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(body["peer"].is_null());
    }

    #[tokio::test]
    async fn same_path_serves_both_methods() {
        let response = router(endpoints())
            .oneshot(HttpRequest::get("/io/app/en").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_string(response).await, "get");
    }

    #[tokio::test]
    async fn route_without_params_and_unknown_route() {
        let app = router(endpoints());
        let response = app
            .clone()
            .oneshot(HttpRequest::get("/healthcheck").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(HttpRequest::get("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serve_binds_and_stops() {
        let handle = HttpServerCapabilityImpl::new()
            .serve("127.0.0.1:0", endpoints())
            .await
            .unwrap();
        let addr = handle.local_addr.unwrap();
        assert_ne!(addr.port(), 0);
        handle.stop();
    }
}
