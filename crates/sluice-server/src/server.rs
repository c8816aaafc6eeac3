//! The HTTP server.
//!
//! [`Server`] owns the mounted routes, the shared module registry and the
//! probes. Requests reach it either over HTTP/1.1 through [`Server::serve`]
//! or in memory through [`Server::handle`]; both paths produce identical
//! responses.
//!
//! # Example
//!
//! ```rust,no_run
//! use sluice_core::ModuleRegistry;
//! use sluice_route::{Invocation, Reply, RouteContract};
//! use sluice_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ping = RouteContract::new("ping")
//!         .get(|_inv: Invocation| async { Ok(Reply::new(serde_json::json!({ "pong": true }))) })
//!         .build()?;
//!
//!     Server::builder()
//!         .config(ServerConfig::builder().http_addr("127.0.0.1:8080").build())
//!         .modules(ModuleRegistry::empty())
//!         .mount("/ping", ping)
//!         .build()
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use sluice_core::{ErrorEnvelope, ModuleRegistry, Modules, RequestContext, RequestId, SluiceError};
use sluice_route::{CompiledRoute, RawRequest};
use sluice_telemetry::metrics::{self, InFlightGuard};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use crate::config::ServerConfig;
use crate::health::{HealthCheck, ReadinessCheck};
use crate::router::Router;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Header carrying the request ID in both directions.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Route name used in metrics for paths that matched nothing.
const UNMATCHED_ROUTE: &str = "unmatched";

/// Response type produced by the server.
pub type HttpResponse = Response<Full<Bytes>>;

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address does not parse.
    #[error("invalid address '{addr}': {source}")]
    InvalidAddress {
        /// The configured address.
        addr: String,
        /// Parse failure.
        #[source]
        source: std::net::AddrParseError,
    },

    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address.
        addr: SocketAddr,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Other listener I/O failure.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

/// An HTTP server for compiled routes.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    router: Router,
    modules: Arc<ModuleRegistry>,
    health: HealthCheck,
    readiness: ReadinessCheck,
}

impl Server {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the router.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Returns the shared module registry.
    #[must_use]
    pub fn modules(&self) -> &Arc<ModuleRegistry> {
        &self.modules
    }

    /// Returns the readiness probe.
    #[must_use]
    pub fn readiness(&self) -> &ReadinessCheck {
        &self.readiness
    }

    /// Binds the configured address and serves until `SIGINT` or `SIGTERM`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Binds the configured address and serves until `shutdown` triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self
            .config
            .socket_addr()
            .map_err(|source| ServerError::InvalidAddress {
                addr: self.config.http_addr().to_string(),
                source,
            })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener until `shutdown`
    /// triggers, then waits up to the shutdown timeout for open
    /// connections to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            routes = self.router.len(),
            modules = self.modules.len(),
            "server listening"
        );

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let server = Arc::clone(&server);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(err) = server.handle_connection(stream, shutdown).await {
                                tracing::debug!(remote = %remote, error = %err, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(err) => tracing::error!(error = %err, "failed to accept connection"),
                },
                () = shutdown.recv() => {
                    tracing::info!("shutdown requested; no longer accepting connections");
                    break;
                }
            }
        }

        server.readiness.set_ready(false);
        let timeout = server.config.shutdown_timeout();
        tracing::info!(
            active = tracker.active_connections(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "draining connections"
        );
        if tokio::time::timeout(timeout, tracker.drained()).await.is_err() {
            tracing::warn!(
                active = tracker.active_connections(),
                "shutdown timeout reached with open connections"
            );
        }
        tracing::info!("server stopped");
        Ok(())
    }

    async fn handle_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let server = Arc::clone(self);
        let service = service_fn(move |request: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle_incoming(request).await) }
        });

        let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
        tokio::pin!(connection);

        tokio::select! {
            result = connection.as_mut() => result,
            () = shutdown.recv() => {
                connection.as_mut().graceful_shutdown();
                connection.await
            }
        }
    }

    async fn handle_incoming(&self, request: Request<Incoming>) -> HttpResponse {
        let (parts, body) = request.into_parts();
        let limited = Limited::new(body, self.config.max_body_bytes());

        let collected = tokio::time::timeout(self.config.request_timeout(), limited.collect()).await;
        let body = match collected {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(err)) if err.downcast_ref::<LengthLimitError>().is_some() => {
                tracing::info!(path = parts.uri.path(), "request body too large");
                return transport_error(StatusCode::PAYLOAD_TOO_LARGE);
            }
            Ok(Err(err)) => {
                tracing::info!(path = parts.uri.path(), error = %err, "failed to read request body");
                return transport_error(StatusCode::BAD_REQUEST);
            }
            Err(_) => {
                tracing::info!(path = parts.uri.path(), "timed out reading request body");
                return transport_error(StatusCode::REQUEST_TIMEOUT);
            }
        };

        self.handle(Request::from_parts(parts, body)).await
    }

    /// Handles a fully buffered request.
    ///
    /// The request ID is taken from the `x-request-id` header when it holds
    /// a UUID, otherwise generated, and echoed on the response.
    pub async fn handle(&self, request: Request<Bytes>) -> HttpResponse {
        let _in_flight = InFlightGuard::new();
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(RequestId::parse)
            .unwrap_or_default();

        let is_get = request.method() == Method::GET;
        let path = request.uri().path().to_string();
        let mut response = match (is_get, path.as_str()) {
            (true, "/health") => json_response(StatusCode::OK, &self.health.status()),
            (true, "/ready") => self.ready_response(),
            (true, "/metrics") => metrics_response(),
            _ => self.route_with_timeout(request_id, request).await,
        };

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        response
    }

    async fn route_with_timeout(&self, request_id: RequestId, request: Request<Bytes>) -> HttpResponse {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let ctx = RequestContext::with_request_id(request_id, method.as_str(), path.as_str());

        match tokio::time::timeout(self.config.request_timeout(), self.route(ctx, request)).await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(request_id = %request_id, method = %method, path = %path, "request timed out");
                error_response(&SluiceError::timeout("Request timed out"))
            }
        }
    }

    async fn route(&self, ctx: RequestContext, request: Request<Bytes>) -> HttpResponse {
        let Some(matched) = self.router.match_path(request.uri().path()) else {
            tracing::debug!(request_id = %ctx.request_id(), path = ctx.path(), "no route matched");
            metrics::record_request(
                UNMATCHED_ROUTE,
                ctx.method(),
                StatusCode::NOT_FOUND.as_u16(),
                ctx.elapsed(),
            );
            return error_response(&SluiceError::NotFound);
        };

        let (route, params) = matched.into_parts();
        let raw = RawRequest::from_http(request, params);
        let request_id = ctx.request_id();

        match route.dispatch(ctx, raw, Modules::new(Arc::clone(&self.modules))).await {
            Ok(response) => {
                let (status, body, headers) = response.into_parts();
                let mut http = json_response(status, &body);
                merge_headers(http.headers_mut(), headers);
                http
            }
            Err(err) => {
                tracing::error!(request_id = %request_id, error = %err, details = ?err, "unhandled route error");
                plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }

    fn ready_response(&self) -> HttpResponse {
        let status = self.readiness.status();
        let code = if status.ready {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        json_response(code, &status)
    }
}

/// Builder for [`Server`].
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: Option<ServerConfig>,
    router: Router,
    modules: Option<Arc<ModuleRegistry>>,
    readiness: Option<ReadinessCheck>,
}

impl ServerBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the module registry shared by every route.
    #[must_use]
    pub fn modules(self, modules: ModuleRegistry) -> Self {
        self.shared_modules(Arc::new(modules))
    }

    /// Sets an already shared module registry.
    #[must_use]
    pub fn shared_modules(mut self, modules: Arc<ModuleRegistry>) -> Self {
        self.modules = Some(modules);
        self
    }

    /// Mounts a compiled route at a path template such as `/users/{id}`.
    #[must_use]
    pub fn mount(mut self, template: impl Into<String>, route: CompiledRoute) -> Self {
        self.router.mount(template, Arc::new(route));
        self
    }

    /// Replaces the readiness probe.
    #[must_use]
    pub fn readiness(mut self, readiness: ReadinessCheck) -> Self {
        self.readiness = Some(readiness);
        self
    }

    /// Builds the server.
    #[must_use]
    pub fn build(self) -> Server {
        let config = self.config.unwrap_or_default();
        let health = HealthCheck::new(config.service_name(), config.service_version());
        Server {
            health,
            router: self.router,
            modules: self.modules.unwrap_or_else(|| Arc::new(ModuleRegistry::empty())),
            readiness: self.readiness.unwrap_or_default(),
            config,
        }
    }
}

fn body_response(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => body_response(status, "application/json", bytes),
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize response body");
            plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn plain_response(status: StatusCode, text: &'static str) -> HttpResponse {
    body_response(status, "text/plain; charset=utf-8", text)
}

fn error_response(error: &SluiceError) -> HttpResponse {
    json_response(error.status_code(), &error.to_envelope())
}

fn transport_error(status: StatusCode) -> HttpResponse {
    let envelope = ErrorEnvelope {
        success: false,
        error: status.canonical_reason().unwrap_or("Bad Request").to_string(),
        errors: Vec::new(),
    };
    json_response(status, &envelope)
}

fn metrics_response() -> HttpResponse {
    match metrics::render_metrics() {
        Some(text) => body_response(StatusCode::OK, "text/plain; version=0.0.4", text),
        None => error_response(&SluiceError::NotFound),
    }
}

fn merge_headers(target: &mut HeaderMap, extra: HeaderMap) {
    let mut current = None;
    for (name, value) in extra {
        if let Some(name) = name {
            current = Some(name);
        }
        if let Some(name) = &current {
            if name != CONTENT_TYPE {
                target.append(name.clone(), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use sluice_core::{FieldSchema, RequestSchemas, ResponseSchemas, SchemaMap};
    use sluice_route::{HandlerError, Invocation, Reply, RouteContract};
    use std::time::Duration;

    async fn body_json(response: HttpResponse) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(method: Method, uri: &str, body: &str) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::from(body.to_string()))
            .unwrap()
    }

    fn server() -> Server {
        let users = RouteContract::new("users")
            .post_validated(
                RequestSchemas::new()
                    .body(SchemaMap::new().field("name", FieldSchema::string().required().min(3))),
                ResponseSchemas::new(),
                |inv: Invocation| async move {
                    let body = inv.validated().body().cloned().unwrap_or_default();
                    Ok(Reply::created(Value::Object(body)))
                },
            )
            .build()
            .unwrap();
        let slow = RouteContract::new("slow")
            .get(|_inv: Invocation| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Reply::empty())
            })
            .build()
            .unwrap();
        let unsafe_route = RouteContract::new("unsafe")
            .get_validated_unsafe(RequestSchemas::new(), |_inv: Invocation| async {
                Err(HandlerError::new("secret detail"))
            })
            .build()
            .unwrap();

        Server::builder()
            .config(
                ServerConfig::builder()
                    .request_timeout(Duration::from_millis(50))
                    .service("test", "0.0.1")
                    .build(),
            )
            .mount("/users", users)
            .mount("/slow", slow)
            .mount("/unsafe", unsafe_route)
            .build()
    }

    #[tokio::test]
    async fn test_validated_post() {
        let response = server()
            .handle(request(Method::POST, "/users", r#"{"name":"Alice"}"#))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(body_json(response).await, json!({ "name": "Alice" }));
    }

    #[tokio::test]
    async fn test_unknown_path_is_404_envelope() {
        let response = server().handle(request(Method::GET, "/nope", "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            json!({ "success": false, "error": "Not Found" })
        );
    }

    #[tokio::test]
    async fn test_timeout_is_504() {
        let response = server().handle(request(Method::GET, "/slow", "")).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            body_json(response).await,
            json!({ "success": false, "error": "Request timed out" })
        );
    }

    #[tokio::test]
    async fn test_unsafe_error_is_bare_500() {
        let response = server().handle(request(Method::GET, "/unsafe", "")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"Internal Server Error");
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let id = "0191b1e4-8f5a-7cc3-9a53-2b6f0c0f3d11";
        let mut req = request(Method::GET, "/health", "");
        req.headers_mut()
            .insert(REQUEST_ID_HEADER, HeaderValue::from_static(id));
        let response = server().handle(req).await;
        assert_eq!(response.headers()[REQUEST_ID_HEADER], id);
    }

    #[tokio::test]
    async fn test_probes() {
        let server = server();
        let health = body_json(server.handle(request(Method::GET, "/health", "")).await).await;
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["service"], "test");

        server.readiness().set_ready(false);
        let response = server.handle(request(Method::GET, "/ready", "")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_merge_headers_keeps_content_type() {
        let mut target = HeaderMap::new();
        target.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut extra = HeaderMap::new();
        extra.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        extra.append("set-cookie", HeaderValue::from_static("a=1"));
        extra.append("set-cookie", HeaderValue::from_static("b=2"));

        merge_headers(&mut target, extra);
        assert_eq!(target[CONTENT_TYPE], "application/json");
        assert_eq!(target.get_all("set-cookie").iter().count(), 2);
    }
}
