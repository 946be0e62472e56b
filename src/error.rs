//! Error type shared by the backend, socket, and store layers.
//!
//! ERROR HANDLING
//! ==============
//! Network-facing code returns `ClientError` and propagates with `?`. The
//! store and session layers convert these into user-facing strings at their
//! boundary, so nothing above them has to match on transport details.

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Session cookie missing, invalid, or expired (HTTP 401).
    #[error("session missing or expired")]
    Unauthorized,
    /// HTTP 404 from a lookup endpoint.
    #[error("resource not found")]
    NotFound,
    /// Any other non-success status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("websocket failed: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),
    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("operation cancelled")]
    Cancelled,
    #[error("no open socket for chat {0}")]
    NoSocket(String),
}

impl ClientError {
    /// Classify a non-success HTTP status.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized,
            StatusCode::NOT_FOUND => Self::NotFound,
            other => Self::Status(other.as_u16()),
        }
    }

    /// True when the request never produced a usable HTTP response.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::WebSocket(_) | Self::Decode(_) | Self::InvalidHeader(_) | Self::Timeout(_)
        )
    }

    /// HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::NotFound => Some(404),
            Self::Status(code) => Some(*code),
            _ => None,
        }
    }
}

pub(crate) fn ws_error(error: tokio_tungstenite::tungstenite::Error) -> ClientError {
    ClientError::WebSocket(Box::new(error))
}
