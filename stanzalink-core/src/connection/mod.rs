//! Connection Lifecycle
//!
//! State machine, reconnect backoff and state-reached callbacks.

mod backoff;
mod machine;
mod state;

pub use backoff::{Backoff, BackoffConfig};
pub use machine::{ConnectionMachine, ReconnectStep, Transition};
pub use state::ConnectionStateCell;
