use pipeline_core::DecodeError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("graphql errors: {0}")]
    Graphql(String),
    #[error("websocket error: {0}")]
    WebSocket(String),
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
    #[error("http request failed: {0}")]
    Http(reqwest::Error),
}

/// Coarse failure classes reported for the control, push and poll channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Refused,
    Timeout,
    Malformed,
    Other,
}

impl FailureCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureCategory::Refused => "refused",
            FailureCategory::Timeout => "timeout",
            FailureCategory::Malformed => "malformed",
            FailureCategory::Other => "other",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TransportError {
    pub fn category(&self) -> FailureCategory {
        match self {
            TransportError::Refused(_) => FailureCategory::Refused,
            TransportError::Timeout(_) => FailureCategory::Timeout,
            TransportError::Malformed(_) | TransportError::Graphql(_) => {
                FailureCategory::Malformed
            }
            TransportError::UnexpectedStatus { .. }
            | TransportError::WebSocket(_)
            | TransportError::Endpoint(_) => FailureCategory::Other,
            TransportError::Http(err) => {
                if err.is_timeout() {
                    FailureCategory::Timeout
                } else if err.is_connect() {
                    FailureCategory::Refused
                } else if err.is_decode() {
                    FailureCategory::Malformed
                } else {
                    FailureCategory::Other
                }
            }
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            TransportError::Refused(err.to_string())
        } else if err.is_decode() {
            TransportError::Malformed(err.to_string())
        } else {
            TransportError::Http(err)
        }
    }
}

impl From<DecodeError> for TransportError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Graphql(message) => TransportError::Graphql(message),
            other => TransportError::Malformed(other.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::Io(io_err) if io_err.kind() == std::io::ErrorKind::ConnectionRefused => {
                TransportError::Refused(io_err.to_string())
            }
            other => TransportError::WebSocket(other.to_string()),
        }
    }
}
