//! Wire transport for the workflow debug server.
//!
//! The server speaks a newline-terminated, pipe-delimited text protocol.
//! Large inbound messages are wrapped in a length-prefixed binary
//! envelope whose reassembly is sensitive to socket read boundaries.
//!
//! # Architecture
//!
//! - [`FrameAssembler`] reassembles length-prefixed frames, one `feed`
//!   per socket read
//! - [`decode_message`] turns a complete payload into a typed
//!   [`ServerMessage`]
//! - [`Client`] owns the socket: outbound command composition, the
//!   queue of commands issued before the channel is ready, and the
//!   background reader task that delivers [`Inbound`] values
//!
//! # Scope
//!
//! This crate intentionally handles only transport concerns. Path
//! translation, breakpoint bookkeeping, and the decision of which debug
//! event an inbound message produces belong to the `runtime` crate.

mod client;
mod decode;
mod error;
mod framing;

pub use client::{Client, Inbound, encode_command};
pub use decode::{RawFrame, ServerMessage, VarRecord, decode_message};
pub use error::TransportError;
pub use framing::FrameAssembler;
