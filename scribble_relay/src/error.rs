// Error types for the relay server and client.
//
// Library calls return `RelayError`; the binary logs it and exits. Record
// decoding failures never surface here: the relay drops malformed records
// where it reads them and keeps the connection.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the relay's library API.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listening socket could not be bound. Fatal at startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error on an established socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for `RelayConfig`.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    /// A config or history file could not be read.
    #[error("failed to read {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The peer or the relay loop is gone.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type alias using `RelayError`.
pub type Result<T> = std::result::Result<T, RelayError>;
