//! # Sluice Route
//!
//! Route contracts and the per-request dispatch wrapper.
//!
//! A [`RouteContract`] is assembled at startup from registrations in one of
//! four styles, compiled once with [`RouteContract::build`], and mounted by
//! the server as a [`CompiledRoute`]. Each request then flows through
//! validation, module injection, the handler and response shaping in that
//! fixed order.

#![doc(html_root_url = "https://docs.rs/sluice-route/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod contract;
mod dispatch;
mod handler;
mod reply;
mod request;

pub use contract::{Registration, RegistrationKind, RouteContract, RouteError};
pub use dispatch::{CompiledRoute, DispatchError, DispatchStage, RouteResponse};
pub use handler::{
    boxed, BoxedHandler, Handler, HandlerError, HandlerFuture, HandlerResult, Invocation,
};
pub use reply::Reply;
pub use request::{RawRequest, ValidatedRequest, BODY_FIELD, QUERY_FIELD};
