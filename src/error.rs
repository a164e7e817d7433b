//! Error types for the tournament session client.

use thiserror::Error;

/// Errors that can occur when using the tournament session client.
///
/// Only foreground actions (submitting an answer, toggling ready, starting a
/// match, creating or joining a tournament) return these to the caller.
/// Transport drops, malformed push frames and background refresh failures are
/// handled inside the client and only show up in the logs.
#[derive(Debug, Error)]
pub enum TournamentError {
    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The REST service answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code returned by the service.
        status: u16,
        /// Response body or `detail` field, if any.
        message: String,
    },

    /// The REST request could not be completed (DNS, connect, body decode).
    #[error("request failed: {0}")]
    Request(String),

    /// A base URL or tournament id did not form a valid endpoint URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The client's background loop has stopped.
    #[error("client is not running")]
    NotConnected,

    /// An action that needs an open tournament was called with none open.
    #[error("no tournament session is open")]
    NoActiveSession,

    /// The session already reached a terminal state.
    #[error("tournament session has ended")]
    SessionEnded,

    /// Only the tournament host may start the match.
    #[error("only the host can start the tournament")]
    NotHost,

    /// A submitted answer was empty after trimming.
    #[error("message is empty")]
    EmptyMessage,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TournamentError {
    /// Returns `true` for a 401 from the REST service, which means the bearer
    /// token is missing or expired.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Http { status: 401, .. })
    }
}

/// A specialized [`Result`] type for tournament client operations.
pub type Result<T> = std::result::Result<T, TournamentError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display_includes_status() {
        let err = TournamentError::Http {
            status: 403,
            message: "Only host can start tournament".into(),
        };
        assert_eq!(err.to_string(), "HTTP 403: Only host can start tournament");
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn unauthorized_is_detected() {
        let err = TournamentError::Http {
            status: 401,
            message: String::new(),
        };
        assert!(err.is_unauthorized());
    }

    #[test]
    fn serde_errors_convert() {
        let err: TournamentError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, TournamentError::Serialization(_)));
    }
}
