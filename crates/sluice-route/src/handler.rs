//! Handler types.
//!
//! A handler is any `Fn(Invocation) -> impl Future<Output = HandlerResult>`.
//! It receives the request context, the raw request, the validated input and
//! a view onto the shared module registry.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use sluice_route::{HandlerResult, Invocation, Reply};
//!
//! async fn get_user(inv: Invocation) -> HandlerResult {
//!     let id = inv.param("id").unwrap_or_default().to_string();
//!     Ok(Reply::new(json!({ "id": id })))
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;
use serde::de::DeserializeOwned;
use sluice_core::{Modules, RegistryError, RequestContext};
use thiserror::Error;

use crate::reply::Reply;
use crate::request::{RawRequest, ValidatedRequest};

const INTERNAL_MESSAGE: &str = "Internal Server Error";

/// Result returned by handlers.
pub type HandlerResult = Result<Reply, HandlerError>;

/// Boxed future returned by a type-erased handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// A type-erased handler.
pub type BoxedHandler = Arc<dyn Handler>;

/// Object-safe handler interface.
///
/// Implemented for every `Fn(Invocation) -> Fut` where `Fut` resolves to a
/// [`HandlerResult`].
pub trait Handler: Send + Sync + 'static {
    /// Invokes the handler.
    fn call(&self, invocation: Invocation) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, invocation: Invocation) -> HandlerFuture {
        Box::pin(self(invocation))
    }
}

/// Boxes a handler function.
pub fn boxed<F, Fut>(handler: F) -> BoxedHandler
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(handler)
}

/// An error raised by handler code.
///
/// The `message` is sent to the client inside `{ "success": false, "error": … }`.
/// The optional source is logged but never sent.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    status: StatusCode,
    #[source]
    source: Option<anyhow::Error>,
}

impl HandlerError {
    /// A `500` error with a client-facing message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            source: None,
        }
    }

    /// A `500` error carrying an internal cause.
    #[must_use]
    pub fn with_source(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            source: Some(source.into()),
        }
    }

    /// Overrides the response status (e.g. `409 Conflict`).
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Returns the client-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the response status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the internal cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::with_source(INTERNAL_MESSAGE, err)
    }
}

impl From<RegistryError> for HandlerError {
    fn from(err: RegistryError) -> Self {
        Self::with_source(INTERNAL_MESSAGE, err)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(INTERNAL_MESSAGE, err)
    }
}

/// Everything a handler receives for one request.
#[derive(Debug)]
pub struct Invocation {
    context: RequestContext,
    request: RawRequest,
    validated: ValidatedRequest,
    modules: Modules,
}

impl Invocation {
    /// Assembles an invocation.
    #[must_use]
    pub fn new(
        context: RequestContext,
        request: RawRequest,
        validated: ValidatedRequest,
        modules: Modules,
    ) -> Self {
        Self {
            context,
            request,
            validated,
            modules,
        }
    }

    /// Returns the request context.
    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Returns the raw request.
    #[must_use]
    pub fn request(&self) -> &RawRequest {
        &self.request
    }

    /// Returns the validated input.
    #[must_use]
    pub fn validated(&self) -> &ValidatedRequest {
        &self.validated
    }

    /// Returns the injected modules.
    #[must_use]
    pub fn modules(&self) -> &Modules {
        &self.modules
    }

    /// Resolves a module by name.
    pub async fn module<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, HandlerError> {
        Ok(self.modules.resolve::<T>(name).await?)
    }

    /// Returns a raw path parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.param(name)
    }

    /// Deserializes the validated query.
    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        self.validated.query_as()
    }

    /// Deserializes the validated body.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        self.validated.body_as()
    }

    /// Deserializes the validated path parameters.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        self.validated.params_as()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use serde_json::json;
    use sluice_core::ModuleRegistry;

    fn invocation(modules: Modules) -> Invocation {
        Invocation::new(
            RequestContext::mock(),
            RawRequest::new(Method::GET, "/users/9".parse().unwrap()).with_param("id", "9"),
            ValidatedRequest::new(),
            modules,
        )
    }

    #[tokio::test]
    async fn test_closure_is_a_handler() {
        let handler = boxed(|inv: Invocation| async move {
            Ok(Reply::new(json!({ "id": inv.param("id") })))
        });
        let reply = handler.call(invocation(Modules::empty())).await.unwrap();
        assert_eq!(reply.payload(), &json!({ "id": "9" }));
    }

    #[tokio::test]
    async fn test_module_resolution_error_is_generic() {
        let err = invocation(Modules::empty())
            .module::<String>("db")
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Internal Server Error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.cause().unwrap().to_string().contains("db"));
    }

    #[tokio::test]
    async fn test_module_resolution() {
        let registry = ModuleRegistry::builder()
            .instance("greeting", "hi".to_string())
            .build();
        let inv = invocation(Modules::new(Arc::new(registry)));
        assert_eq!(inv.module::<String>("greeting").await.unwrap().as_str(), "hi");
    }

    #[test]
    fn test_handler_error_from_anyhow() {
        let err: HandlerError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.to_string(), "Internal Server Error");
        assert_eq!(err.cause().unwrap().to_string(), "disk full");
    }

    #[test]
    fn test_handler_error_status() {
        let err = HandlerError::new("email already registered").with_status(StatusCode::CONFLICT);
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.message(), "email already registered");
    }
}
