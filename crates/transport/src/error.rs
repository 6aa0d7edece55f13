//! Error types for the wire transport.

use std::io;
use std::time::Duration;

/// Errors raised while establishing or writing to the server connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred while connecting or writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The connect attempt did not complete within the allowed time.
    #[error("connecting to {addr} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Address the connect attempt targeted.
        addr: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },
}
