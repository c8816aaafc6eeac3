//! Route contracts.
//!
//! A [`RouteContract`] accumulates registrations for each HTTP verb and is
//! compiled once, at startup, into a [`CompiledRoute`]. There are four
//! registration styles:
//!
//! | Style | Validation | Shaping | Handler errors |
//! |-------|------------|---------|----------------|
//! | Plain | none | none | 500 envelope |
//! | Validated | query, body | per status | 500 envelope |
//! | ValidatedWithParams | query, body, listed params | per status | 500 envelope |
//! | ValidatedUnsafe | query, body | none | propagated unshaped |
//!
//! # Example
//!
//! ```rust
//! use http::StatusCode;
//! use serde_json::json;
//! use sluice_core::{FieldSchema, RequestSchemas, ResponseSchemas, SchemaMap};
//! use sluice_route::{Invocation, Reply, RouteContract};
//!
//! let route = RouteContract::new("users")
//!     .get(|_inv: Invocation| async { Ok(Reply::new(json!([]))) })
//!     .post_validated(
//!         RequestSchemas::new().body(
//!             SchemaMap::new().field("name", FieldSchema::string().required().min(2)),
//!         ),
//!         ResponseSchemas::new().status(
//!             StatusCode::CREATED,
//!             SchemaMap::new().field("name", FieldSchema::string().required()),
//!         ),
//!         |inv: Invocation| async move {
//!             let body = inv.validated().body().cloned().unwrap_or_default();
//!             Ok(Reply::created(body.into()))
//!         },
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(route.name(), "users");
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use http::Method;
use sluice_core::{RequestSchemas, ResponseSchemas, SchemaError};
use thiserror::Error;

use crate::dispatch::CompiledRoute;
use crate::handler::{BoxedHandler, HandlerResult, Invocation};

/// Errors detected while compiling a contract.
#[derive(Debug, Error)]
pub enum RouteError {
    /// A declared schema violates its own invariants.
    #[error("route '{route}' {method}: {source}")]
    Schema {
        /// Route name.
        route: String,
        /// Verb of the offending registration.
        method: Method,
        /// The schema problem.
        #[source]
        source: SchemaError,
    },

    /// A `params` schema names a field that is not a listed path parameter.
    #[error("route '{route}' {method}: params schema field '{param}' is not a listed path parameter")]
    UndeclaredParam {
        /// Route name.
        route: String,
        /// Verb of the offending registration.
        method: Method,
        /// The unlisted field.
        param: String,
    },

    /// A `params` schema was supplied to a style that does not validate params.
    #[error("route '{route}' {method}: params schema requires a validated-with-params registration")]
    ParamsWithoutNames {
        /// Route name.
        route: String,
        /// Verb of the offending registration.
        method: Method,
    },
}

/// Registration style tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationKind {
    /// No validation, no shaping.
    Plain,
    /// Query/body validation and response shaping.
    Validated,
    /// As `Validated`, plus listed path parameters.
    ValidatedWithParams,
    /// Validation only; handler errors propagate unshaped.
    ValidatedUnsafe,
}

impl RegistrationKind {
    /// Returns the name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Validated => "validated",
            Self::ValidatedWithParams => "validated_with_params",
            Self::ValidatedUnsafe => "validated_unsafe",
        }
    }
}

impl fmt::Display for RegistrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registration for one verb.
#[derive(Clone)]
pub enum Registration {
    /// Handler only.
    Plain {
        /// The handler.
        handler: BoxedHandler,
    },
    /// Validated query/body with per-status response schemas.
    Validated {
        /// Input schemas.
        schemas: RequestSchemas,
        /// Response schemas.
        responses: ResponseSchemas,
        /// The handler.
        handler: BoxedHandler,
    },
    /// As `Validated`, plus the listed path parameters.
    ValidatedWithParams {
        /// Path parameters that take part in `params` validation.
        param_names: Vec<String>,
        /// Input schemas.
        schemas: RequestSchemas,
        /// Response schemas.
        responses: ResponseSchemas,
        /// The handler.
        handler: BoxedHandler,
    },
    /// Validated input; handler errors bypass the error envelope.
    ValidatedUnsafe {
        /// Input schemas.
        schemas: RequestSchemas,
        /// The handler.
        handler: BoxedHandler,
    },
}

impl Registration {
    /// Returns the style tag.
    #[must_use]
    pub const fn kind(&self) -> RegistrationKind {
        match self {
            Self::Plain { .. } => RegistrationKind::Plain,
            Self::Validated { .. } => RegistrationKind::Validated,
            Self::ValidatedWithParams { .. } => RegistrationKind::ValidatedWithParams,
            Self::ValidatedUnsafe { .. } => RegistrationKind::ValidatedUnsafe,
        }
    }

    /// Returns the handler.
    #[must_use]
    pub fn handler(&self) -> &BoxedHandler {
        match self {
            Self::Plain { handler }
            | Self::Validated { handler, .. }
            | Self::ValidatedWithParams { handler, .. }
            | Self::ValidatedUnsafe { handler, .. } => handler,
        }
    }

    /// Returns the input schemas, if this style validates.
    #[must_use]
    pub fn schemas(&self) -> Option<&RequestSchemas> {
        match self {
            Self::Plain { .. } => None,
            Self::Validated { schemas, .. }
            | Self::ValidatedWithParams { schemas, .. }
            | Self::ValidatedUnsafe { schemas, .. } => Some(schemas),
        }
    }

    /// Returns the response schemas, if this style shapes.
    #[must_use]
    pub fn responses(&self) -> Option<&ResponseSchemas> {
        match self {
            Self::Validated { responses, .. } | Self::ValidatedWithParams { responses, .. } => {
                Some(responses)
            }
            Self::Plain { .. } | Self::ValidatedUnsafe { .. } => None,
        }
    }

    /// Returns the listed path parameters (empty unless `ValidatedWithParams`).
    #[must_use]
    pub fn param_names(&self) -> &[String] {
        match self {
            Self::ValidatedWithParams { param_names, .. } => param_names,
            _ => &[],
        }
    }

    fn check(&self, route: &str, method: &Method) -> Result<(), RouteError> {
        let schema_error = |source| RouteError::Schema {
            route: route.to_string(),
            method: method.clone(),
            source,
        };

        if let Some(schemas) = self.schemas() {
            schemas.check().map_err(schema_error)?;
        }
        if let Some(responses) = self.responses() {
            responses.check().map_err(schema_error)?;
        }

        let Some(params) = self.schemas().and_then(RequestSchemas::params_schema) else {
            return Ok(());
        };
        if self.kind() != RegistrationKind::ValidatedWithParams {
            return Err(RouteError::ParamsWithoutNames {
                route: route.to_string(),
                method: method.clone(),
            });
        }
        let names = self.param_names();
        match params.names().find(|field| !names.iter().any(|n| n == field)) {
            Some(param) => Err(RouteError::UndeclaredParam {
                route: route.to_string(),
                method: method.clone(),
                param: param.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("kind", &self.kind())
            .field("param_names", &self.param_names())
            .finish_non_exhaustive()
    }
}

/// Per-route registrations, grouped by verb.
pub struct RouteContract {
    name: String,
    methods: Vec<(Method, Vec<Registration>)>,
    not_found: Option<BoxedHandler>,
}

impl fmt::Debug for RouteContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteContract")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("not_found", &self.not_found.is_some())
            .finish()
    }
}

macro_rules! verb_registrations {
    ($(
        $method:expr => $plain:ident, $validated:ident, $with_params:ident, $unsafe_:ident;
    )*) => {
        $(
            #[doc = concat!("Registers a plain `", stringify!($plain), "` handler.")]
            pub fn $plain<F, Fut>(self, handler: F) -> Self
            where
                F: Fn(Invocation) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = HandlerResult> + Send + 'static,
            {
                self.on($method, handler)
            }

            #[doc = concat!("Registers a validated `", stringify!($plain), "` handler.")]
            pub fn $validated<F, Fut>(
                self,
                schemas: RequestSchemas,
                responses: ResponseSchemas,
                handler: F,
            ) -> Self
            where
                F: Fn(Invocation) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = HandlerResult> + Send + 'static,
            {
                self.on_validated($method, schemas, responses, handler)
            }

            #[doc = concat!("Registers a validated `", stringify!($plain), "` handler with path parameters.")]
            pub fn $with_params<I, S, F, Fut>(
                self,
                param_names: I,
                schemas: RequestSchemas,
                responses: ResponseSchemas,
                handler: F,
            ) -> Self
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
                F: Fn(Invocation) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = HandlerResult> + Send + 'static,
            {
                self.on_validated_with_params($method, param_names, schemas, responses, handler)
            }

            #[doc = concat!("Registers a validated `", stringify!($plain), "` handler whose errors propagate unshaped.")]
            pub fn $unsafe_<F, Fut>(self, schemas: RequestSchemas, handler: F) -> Self
            where
                F: Fn(Invocation) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = HandlerResult> + Send + 'static,
            {
                self.on_validated_unsafe($method, schemas, handler)
            }
        )*
    };
}

impl RouteContract {
    /// Starts an empty contract. `name` identifies the route in logs and
    /// metrics.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            not_found: None,
        }
    }

    /// Returns the route name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a registration for `method`.
    pub fn register(mut self, method: Method, registration: Registration) -> Self {
        match self.methods.iter_mut().find(|(m, _)| *m == method) {
            Some((_, registrations)) => registrations.push(registration),
            None => self.methods.push((method, vec![registration])),
        }
        self
    }

    /// Registers a plain handler for any verb.
    pub fn on<F, Fut>(self, method: Method, handler: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(
            method,
            Registration::Plain {
                handler: Arc::new(handler),
            },
        )
    }

    /// Registers a validated handler for any verb.
    pub fn on_validated<F, Fut>(
        self,
        method: Method,
        schemas: RequestSchemas,
        responses: ResponseSchemas,
        handler: F,
    ) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(
            method,
            Registration::Validated {
                schemas,
                responses,
                handler: Arc::new(handler),
            },
        )
    }

    /// Registers a validated handler with path parameters for any verb.
    pub fn on_validated_with_params<I, S, F, Fut>(
        self,
        method: Method,
        param_names: I,
        schemas: RequestSchemas,
        responses: ResponseSchemas,
        handler: F,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(
            method,
            Registration::ValidatedWithParams {
                param_names: param_names.into_iter().map(Into::into).collect(),
                schemas,
                responses,
                handler: Arc::new(handler),
            },
        )
    }

    /// Registers a validated, unshaped handler for any verb.
    pub fn on_validated_unsafe<F, Fut>(self, method: Method, schemas: RequestSchemas, handler: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(
            method,
            Registration::ValidatedUnsafe {
                schemas,
                handler: Arc::new(handler),
            },
        )
    }

    verb_registrations! {
        Method::GET => get, get_validated, get_validated_with_params, get_validated_unsafe;
        Method::POST => post, post_validated, post_validated_with_params, post_validated_unsafe;
        Method::PUT => put, put_validated, put_validated_with_params, put_validated_unsafe;
        Method::PATCH => patch, patch_validated, patch_validated_with_params, patch_validated_unsafe;
        Method::DELETE => delete, delete_validated, delete_validated_with_params, delete_validated_unsafe;
    }

    /// Registers the catch-all for verbs with no registration.
    ///
    /// Its reply defaults to `404 Not Found` and is never shaped.
    pub fn not_found<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        if self.not_found.is_some() {
            tracing::warn!(route = %self.name, "not-found handler registered twice, keeping the last one");
        }
        self.not_found = Some(Arc::new(handler));
        self
    }

    /// Compiles the contract.
    ///
    /// Every schema is checked. For each verb the first registration is the
    /// active one; later registrations for the same verb are reported as
    /// shadowed.
    ///
    /// # Errors
    ///
    /// Returns the first [`RouteError`] found.
    pub fn build(self) -> Result<CompiledRoute, RouteError> {
        let mut active = Vec::with_capacity(self.methods.len());

        for (method, registrations) in self.methods {
            for registration in &registrations {
                registration.check(&self.name, &method)?;
            }

            let mut registrations = registrations.into_iter();
            let Some(first) = registrations.next() else {
                continue;
            };
            for shadowed in registrations {
                tracing::warn!(
                    route = %self.name,
                    method = %method,
                    kind = %shadowed.kind(),
                    "registration shadowed by an earlier one for the same verb"
                );
            }

            tracing::debug!(route = %self.name, method = %method, kind = %first.kind(), "registration compiled");
            active.push((method, first));
        }

        Ok(CompiledRoute::new(self.name, active, self.not_found))
    }
}
