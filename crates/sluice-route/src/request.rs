//! Request types seen by the dispatch wrapper and by handlers.
//!
//! [`RawRequest`] is what the server hands over: method, URI, headers, body
//! bytes and matched path parameters. [`ValidatedRequest`] holds the coerced
//! output of each declared input surface.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sluice_core::{Constraint, FieldError, Input};

use crate::handler::HandlerError;

/// Pseudo-field reported when the body cannot be read as a JSON object.
pub const BODY_FIELD: &str = "body";

/// Pseudo-field reported when the query string cannot be decoded.
pub const QUERY_FIELD: &str = "query";

/// An unvalidated request as delivered by the server.
///
/// # Example
///
/// ```rust
/// use http::Method;
/// use sluice_route::RawRequest;
///
/// let request = RawRequest::new(Method::GET, "/users/42?verbose=true".parse().unwrap())
///     .with_param("id", "42");
///
/// assert_eq!(request.path(), "/users/42");
/// assert_eq!(request.param("id"), Some("42"));
/// assert_eq!(request.query_map().unwrap()["verbose"], "true");
/// ```
#[derive(Debug, Clone)]
pub struct RawRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: Vec<(String, String)>,
}

impl RawRequest {
    /// Creates a request with no headers, body or path parameters.
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: Vec::new(),
        }
    }

    /// Splits an `http::Request` and attaches matched path parameters.
    #[must_use]
    pub fn from_http(request: http::Request<Bytes>, params: Vec<(String, String)>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params,
        }
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and the matching content type.
    #[must_use]
    pub fn with_json(mut self, value: &Value) -> Self {
        self.body = Bytes::from(value.to_string());
        self.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Adds a matched path parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the path portion of the URI.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the raw query string, if any.
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the raw body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns a matched path parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns all matched path parameters.
    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Decodes the query string into string values. Repeated keys keep the
    /// last value.
    ///
    /// # Errors
    ///
    /// Returns a `type` error on the `query` pseudo-field if the query string
    /// is not valid `application/x-www-form-urlencoded`.
    pub fn query_map(&self) -> Result<Input, FieldError> {
        let Some(query) = self.uri.query() else {
            return Ok(Map::new());
        };
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).map_err(|_| {
            FieldError::new(QUERY_FIELD, Constraint::Type, Value::String(query.to_string()))
        })?;
        Ok(pairs
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect())
    }

    /// Parses the body as a JSON object. An empty body is an empty object.
    ///
    /// # Errors
    ///
    /// Returns a `type` error on the `body` pseudo-field if the body is not
    /// JSON or not an object.
    pub fn body_map(&self) -> Result<Input, FieldError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        match serde_json::from_slice::<Value>(&self.body) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(FieldError::new(BODY_FIELD, Constraint::Type, other)),
            Err(_) => Err(FieldError::new(
                BODY_FIELD,
                Constraint::Type,
                Value::String(String::from_utf8_lossy(&self.body).into_owned()),
            )),
        }
    }

    /// Returns the path parameters whose names are listed, as string values.
    #[must_use]
    pub fn params_map(&self, names: &[String]) -> Input {
        self.params
            .iter()
            .filter(|(key, _)| names.contains(key))
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect()
    }
}

/// Coerced request input.
///
/// A surface is present only if its schema was declared on the route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedRequest {
    query: Option<Input>,
    body: Option<Input>,
    params: Option<Input>,
}

impl ValidatedRequest {
    /// Creates a request with no validated surfaces.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the validated query.
    #[must_use]
    pub fn with_query(mut self, query: Input) -> Self {
        self.query = Some(query);
        self
    }

    /// Sets the validated body.
    #[must_use]
    pub fn with_body(mut self, body: Input) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the validated path parameters.
    #[must_use]
    pub fn with_params(mut self, params: Input) -> Self {
        self.params = Some(params);
        self
    }

    /// Returns the validated query.
    #[must_use]
    pub fn query(&self) -> Option<&Input> {
        self.query.as_ref()
    }

    /// Returns the validated body.
    #[must_use]
    pub fn body(&self) -> Option<&Input> {
        self.body.as_ref()
    }

    /// Returns the validated path parameters.
    #[must_use]
    pub fn params(&self) -> Option<&Input> {
        self.params.as_ref()
    }

    /// Deserializes the validated query into `T`.
    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        surface_as(self.query.as_ref())
    }

    /// Deserializes the validated body into `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        surface_as(self.body.as_ref())
    }

    /// Deserializes the validated path parameters into `T`.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        surface_as(self.params.as_ref())
    }
}

fn surface_as<T: DeserializeOwned>(surface: Option<&Input>) -> Result<T, HandlerError> {
    let value = Value::Object(surface.cloned().unwrap_or_default());
    Ok(serde_json::from_value(value)?)
}
