//! Requests
//!
//! Typed request/response exchanges, the queue that correlates them with
//! inbound stanzas, and a small catalog of built-in requests.

pub mod catalog;
mod dispatcher;
mod lifecycle;

pub use catalog::{ping, server_properties, ServerProperties};
pub use dispatcher::RequestDispatcher;
pub use lifecycle::{CancelDisposition, OutstandingRequest, ReadyState, Request};
