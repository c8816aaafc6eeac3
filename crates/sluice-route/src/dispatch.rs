//! Dispatch Wrapper.
//!
//! One call to [`CompiledRoute::dispatch`] drives a request through
//! `Received → Validating → Invoking → Shaping → Responded`. Any of the
//! first three stages can end in `Errored`, which still produces a response
//! except for `ValidatedUnsafe` handler failures.

use std::fmt;
use std::time::Duration;

use http::{HeaderMap, Method, StatusCode};
use serde_json::Value;
use sluice_core::{
    shape, validate, FieldError, Modules, RequestContext, RequestSchemas, SluiceError,
};
use sluice_telemetry::metrics;
use thiserror::Error;
use tracing::Instrument;

use crate::contract::{Registration, RegistrationKind};
use crate::handler::{BoxedHandler, HandlerError, Invocation};
use crate::request::{RawRequest, ValidatedRequest};

/// Stage of a request inside the dispatch wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchStage {
    /// Handed over by the server.
    Received,
    /// Running the Schema Validator on declared surfaces.
    Validating,
    /// Running the handler.
    Invoking,
    /// Running the Response Shaper.
    Shaping,
    /// Response produced.
    Responded,
    /// Failed before a successful response.
    Errored,
}

impl DispatchStage {
    /// Returns the name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validating => "validating",
            Self::Invoking => "invoking",
            Self::Shaping => "shaping",
            Self::Responded => "responded",
            Self::Errored => "errored",
        }
    }
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures that escape the wrapper and must be handled by the server.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A `ValidatedUnsafe` handler failed; its error was not converted.
    #[error("unhandled error in route '{route}': {source}")]
    Unhandled {
        /// Route name.
        route: String,
        /// The handler's error.
        #[source]
        source: HandlerError,
    },
}

/// A finished JSON response.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResponse {
    status: StatusCode,
    body: Value,
    headers: HeaderMap,
}

impl RouteResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body,
            headers: HeaderMap::new(),
        }
    }

    /// Renders an error as its wire envelope.
    #[must_use]
    pub fn from_error(error: &SluiceError) -> Self {
        let body = serde_json::to_value(error.to_envelope()).unwrap_or(Value::Null);
        Self::new(error.status_code(), body)
    }

    /// Returns the status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the JSON body.
    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Returns extra headers set by the handler.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Splits into status, body and headers.
    #[must_use]
    pub fn into_parts(self) -> (StatusCode, Value, HeaderMap) {
        (self.status, self.body, self.headers)
    }
}

/// A compiled, immutable route ready to be mounted.
pub struct CompiledRoute {
    name: String,
    methods: Vec<(Method, Registration)>,
    not_found: Option<BoxedHandler>,
}

impl fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRoute")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("not_found", &self.not_found.is_some())
            .finish()
    }
}

impl CompiledRoute {
    pub(crate) fn new(
        name: String,
        methods: Vec<(Method, Registration)>,
        not_found: Option<BoxedHandler>,
    ) -> Self {
        Self {
            name,
            methods,
            not_found,
        }
    }

    /// Returns the route name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the verbs with an active registration.
    #[must_use]
    pub fn methods(&self) -> Vec<&Method> {
        self.methods.iter().map(|(method, _)| method).collect()
    }

    /// Returns the style of the active registration for `method`.
    #[must_use]
    pub fn kind(&self, method: &Method) -> Option<RegistrationKind> {
        self.registration(method).map(Registration::kind)
    }

    /// Returns `true` if a not-found handler was registered.
    #[must_use]
    pub fn has_not_found(&self) -> bool {
        self.not_found.is_some()
    }

    fn registration(&self, method: &Method) -> Option<&Registration> {
        self.methods
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, registration)| registration)
    }

    /// Dispatches one request.
    ///
    /// Every outcome except a failing `ValidatedUnsafe` handler is rendered
    /// into a [`RouteResponse`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unhandled`] when a `ValidatedUnsafe` handler
    /// fails.
    pub async fn dispatch(
        &self,
        mut ctx: RequestContext,
        request: RawRequest,
        modules: Modules,
    ) -> Result<RouteResponse, DispatchError> {
        ctx.set_route(self.name.clone());
        let method = request.method().clone();
        let span = tracing::info_span!(
            "dispatch",
            route = %self.name,
            method = %method,
            request_id = %ctx.request_id(),
        );

        async move {
            tracing::debug!(stage = %DispatchStage::Received, path = request.path(), "request received");

            let result = match self.registration(&method) {
                Some(registration) => self.run(registration, ctx.clone(), request, modules).await,
                None => Ok(self.run_not_found(ctx.clone(), request, modules).await),
            };

            let status = match &result {
                Ok(response) => response.status(),
                Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let elapsed = ctx.elapsed();
            metrics::record_request(&self.name, method.as_str(), status.as_u16(), elapsed);
            tracing::info!(
                stage = %DispatchStage::Responded,
                status = status.as_u16(),
                duration_ms = duration_ms(elapsed),
                "request dispatched"
            );
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        registration: &Registration,
        ctx: RequestContext,
        request: RawRequest,
        modules: Modules,
    ) -> Result<RouteResponse, DispatchError> {
        let validated = match registration.schemas() {
            None => ValidatedRequest::new(),
            Some(schemas) => {
                tracing::debug!(stage = %DispatchStage::Validating, "validating input");
                match self.validate_surfaces(registration, schemas, &request) {
                    Ok(validated) => validated,
                    Err(errors) => {
                        tracing::info!(
                            stage = %DispatchStage::Errored,
                            errors = errors.len(),
                            "request rejected by validation"
                        );
                        return Ok(RouteResponse::from_error(&SluiceError::validation(errors)));
                    }
                }
            }
        };

        tracing::debug!(stage = %DispatchStage::Invoking, kind = %registration.kind(), "invoking handler");
        let invocation = Invocation::new(ctx, request, validated, modules);
        let reply = match registration.handler().call(invocation).await {
            Ok(reply) => reply,
            Err(error) if registration.kind() == RegistrationKind::ValidatedUnsafe => {
                tracing::error!(
                    stage = %DispatchStage::Errored,
                    error = %error,
                    cause = ?error.cause(),
                    "unsafe handler failed, propagating"
                );
                return Err(DispatchError::Unhandled {
                    route: self.name.clone(),
                    source: error,
                });
            }
            Err(error) => return Ok(handler_error_response(&error)),
        };

        let (status, payload, headers) = reply.into_parts();
        let body = match registration.responses() {
            None => payload,
            Some(responses) => {
                tracing::debug!(stage = %DispatchStage::Shaping, status = status.as_u16(), "shaping response");
                match shape(status, payload, responses) {
                    Ok(body) => body,
                    Err(violation) => {
                        tracing::error!(
                            stage = %DispatchStage::Errored,
                            route = %self.name,
                            error = %violation,
                            "handler response violates its declared schema"
                        );
                        return Ok(RouteResponse::from_error(&SluiceError::from(violation)));
                    }
                }
            }
        };

        Ok(RouteResponse {
            status,
            body,
            headers,
        })
    }

    /// Runs each declared surface independently and collects every error.
    fn validate_surfaces(
        &self,
        registration: &Registration,
        schemas: &RequestSchemas,
        request: &RawRequest,
    ) -> Result<ValidatedRequest, Vec<FieldError>> {
        let mut validated = ValidatedRequest::new();
        let mut errors = Vec::new();

        if let Some(schema) = schemas.query_schema() {
            match request.query_map().map_err(|e| vec![e]).and_then(|q| validate(&q, schema)) {
                Ok(query) => validated = validated.with_query(query),
                Err(found) => {
                    metrics::record_validation_failure(&self.name, "query");
                    errors.extend(found);
                }
            }
        }

        if let Some(schema) = schemas.body_schema() {
            match request.body_map().map_err(|e| vec![e]).and_then(|b| validate(&b, schema)) {
                Ok(body) => validated = validated.with_body(body),
                Err(found) => {
                    metrics::record_validation_failure(&self.name, "body");
                    errors.extend(found);
                }
            }
        }

        if let Some(schema) = schemas.params_schema() {
            let params = request.params_map(registration.param_names());
            match validate(&params, schema) {
                Ok(params) => validated = validated.with_params(params),
                Err(found) => {
                    metrics::record_validation_failure(&self.name, "params");
                    errors.extend(found);
                }
            }
        }

        if errors.is_empty() {
            Ok(validated)
        } else {
            Err(errors)
        }
    }

    async fn run_not_found(
        &self,
        ctx: RequestContext,
        request: RawRequest,
        modules: Modules,
    ) -> RouteResponse {
        let Some(handler) = &self.not_found else {
            return RouteResponse::from_error(&SluiceError::NotFound);
        };

        let invocation = Invocation::new(ctx, request, ValidatedRequest::new(), modules);
        match handler.call(invocation).await {
            Ok(reply) => {
                let status = reply.status().unwrap_or(StatusCode::NOT_FOUND);
                let (_, body, headers) = reply.into_parts();
                RouteResponse {
                    status,
                    body,
                    headers,
                }
            }
            Err(error) => handler_error_response(&error),
        }
    }
}

fn handler_error_response(error: &HandlerError) -> RouteResponse {
    if error.status().is_server_error() {
        tracing::error!(
            stage = %DispatchStage::Errored,
            error = %error,
            cause = ?error.cause(),
            "handler failed"
        );
    } else {
        tracing::info!(
            stage = %DispatchStage::Errored,
            status = error.status().as_u16(),
            error = %error,
            "handler rejected request"
        );
    }
    let envelope = SluiceError::handler(error.message(), None).to_envelope();
    let body = serde_json::to_value(envelope).unwrap_or(Value::Null);
    RouteResponse::new(error.status(), body)
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
