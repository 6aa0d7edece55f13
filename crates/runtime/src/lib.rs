//! Session controller for debugging workflow programs on a remote
//! workflow server.
//!
//! # Architecture
//!
//! A [`Runtime`] owns one session. It drives a [`transport::Client`]
//! for the wire protocol and keeps all session state (breakpoints, the
//! current source file, variables, the stack) in an internal state
//! machine behind a mutex. A background dispatch task feeds decoded
//! server messages into that state machine; everything the session has
//! to say back to its user arrives as an [`Event`] on the single
//! [`EventReceiver`] subscriber, strictly in the order it was raised.
//!
//! # Scope
//!
//! This crate stops at the session boundary. Front-end protocol
//! adapters (DAP or otherwise) layer on top of [`Runtime`] and its
//! event stream.

mod breakpoints;
mod events;
mod internals;
pub mod paths;
mod runtime;
mod types;

pub use events::{Event, EventReceiver, OutputCategory};
pub use runtime::Runtime;
pub use types::{Breakpoint, BreakpointId, BreakpointSpec, StackEntry, TransportKind, Variable};
