//! Handler replies.

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::handler::HandlerError;

/// What a handler returns on success: a JSON payload and an optional status.
///
/// Without an explicit status the dispatch wrapper uses `200 OK`. The status
/// stays mutable until the handler returns; shaping runs against whatever
/// status the reply carries at that point.
///
/// # Example
///
/// ```rust
/// use http::StatusCode;
/// use serde_json::json;
/// use sluice_route::Reply;
///
/// let reply = Reply::created(json!({ "id": "u1" }));
/// assert_eq!(reply.status(), Some(StatusCode::CREATED));
///
/// let reply = Reply::new(json!([])).with_status(StatusCode::ACCEPTED);
/// assert_eq!(reply.status_or_default(), StatusCode::ACCEPTED);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    status: Option<StatusCode>,
    payload: Value,
    headers: HeaderMap,
}

impl Reply {
    /// A reply with no explicit status.
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self {
            status: None,
            payload,
            headers: HeaderMap::new(),
        }
    }

    /// Serializes `payload` into a reply with no explicit status.
    pub fn json<T: Serialize>(payload: &T) -> Result<Self, HandlerError> {
        Ok(Self::new(serde_json::to_value(payload)?))
    }

    /// A `201 Created` reply.
    #[must_use]
    pub fn created(payload: Value) -> Self {
        Self::new(payload).with_status(StatusCode::CREATED)
    }

    /// An empty-object reply.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Value::Object(serde_json::Map::new()))
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the status in place.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Adds a response header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns the explicit status, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Returns the explicit status or `200 OK`.
    #[must_use]
    pub fn status_or_default(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the extra headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Splits the reply into status, payload and headers.
    #[must_use]
    pub fn into_parts(self) -> (StatusCode, Value, HeaderMap) {
        let status = self.status_or_default();
        (status, self.payload, self.headers)
    }
}

impl From<Value> for Reply {
    fn from(payload: Value) -> Self {
        Self::new(payload)
    }
}
