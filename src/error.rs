//! Error types for ftpsync.

use std::time::Duration;

/// Errors surfaced by transport, hashing, and manifest operations.
///
/// Orchestration code wraps these in `anyhow` for context; the typed
/// variants exist so retry and fallback logic can branch on them.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The control connection is gone (never opened, EOF, or a fatal
    /// I/O error left the socket in an unknown state).
    #[error("connection closed")]
    ConnectionClosed,

    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The server said something we could not parse.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server understood us and refused.
    #[error("server error {code}: {message}")]
    Remote { code: u16, message: String },

    #[error("tls error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether this error suggests the control connection died, as opposed
    /// to the server rejecting a command on a healthy session.
    pub fn indicates_closed(&self) -> bool {
        match self {
            SyncError::ConnectionClosed => true,
            SyncError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            other => other.to_string().to_ascii_lowercase().contains("closed"),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
