//! # Error Handling
//!
//! Typed error taxonomy for the connection handshake. Remote failures keep the
//! structured payload the service returns (`status`, `message`, `requestId`,
//! `type`, `details`) instead of flattening it into a string.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ConnectedAccountId, ConnectionStatus};

/// Maximum number of characters of an upstream body kept in errors.
const BODY_SNIPPET_CHARS: usize = 200;

/// Structured error payload returned by the connected-accounts service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteError {
    /// HTTP-like status code reported by the service
    #[serde(default)]
    pub status: u16,
    /// Human-readable error message
    pub message: String,
    /// Service-side request identifier for support correlation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Error category as named by the service
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Additional error details (opaque)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl RemoteError {
    /// Build an error from a non-success response body.
    ///
    /// Bodies in the service's error shape are kept verbatim. Anything else is
    /// wrapped with the HTTP status and a truncated snippet of the body.
    pub fn from_response(http_status: u16, body: &str) -> Self {
        match serde_json::from_str::<RemoteError>(body) {
            Ok(mut payload) => {
                if payload.status == 0 {
                    payload.status = http_status;
                }
                payload
            }
            Err(_) => {
                let message = if body.trim().is_empty() {
                    format!("remote returned status {}", http_status)
                } else {
                    body_snippet(body)
                };
                Self {
                    status: http_status,
                    message,
                    request_id: None,
                    error_type: None,
                    details: None,
                }
            }
        }
    }

    /// Whether the same call could succeed later (rate limiting or server side failure).
    pub fn is_retryable(&self) -> bool {
        self.status == 429 || self.status >= 500
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote error {}", self.status)?;
        if let Some(kind) = &self.error_type {
            write!(f, " ({})", kind)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(request_id) = &self.request_id {
            write!(f, " [request {}]", request_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteError {}

/// Failures talking to the remote API during initiate, poll or reinitiate.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error(transparent)]
    Remote(RemoteError),
    #[error("malformed response: {details}")]
    Decode {
        details: String,
        body_snippet: Option<String>,
    },
    #[error("unexpected connection status '{value}'")]
    UnexpectedStatus { value: String },
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl TransportError {
    pub fn decode<S: Into<String>>(details: S, body: Option<&str>) -> Self {
        Self::Decode {
            details: details.into(),
            body_snippet: body.map(body_snippet),
        }
    }
}

/// Errors surfaced by the handshake client. None of them are retried internally.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The integration cannot run the expected flow (e.g. no redirect URL for an OAuth connect)
    #[error("configuration error: {message}")]
    Configuration { message: String },
    /// Activation was not observed before the deadline
    #[error(
        "connected account {connected_account_id} did not become active within {waited:?} ({polls} status polls)"
    )]
    Timeout {
        connected_account_id: ConnectedAccountId,
        waited: Duration,
        polls: u32,
    },
    /// The remote reported a terminal failure state
    #[error("connected account {connected_account_id} activation ended with status {status}")]
    Activation {
        connected_account_id: ConnectedAccountId,
        status: ConnectionStatus,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The caller cancelled the wait
    #[error("wait for connected account {connected_account_id} was cancelled")]
    Cancelled {
        connected_account_id: ConnectedAccountId,
    },
    #[error("invalid {field}: {message}")]
    InvalidArgument { field: &'static str, message: String },
}

impl HandshakeError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Structured remote payload, when the failure came from the service.
    pub fn remote_error(&self) -> Option<&RemoteError> {
        match self {
            Self::Transport(TransportError::Remote(remote)) => Some(remote),
            _ => None,
        }
    }

    /// Informational hint for callers deciding whether to re-initiate. The client never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(TransportError::Network(err)) => err.is_timeout() || err.is_connect(),
            Self::Transport(TransportError::Remote(remote)) => remote.is_retryable(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for HandshakeError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(TransportError::Network(error))
    }
}

impl From<RemoteError> for HandshakeError {
    fn from(error: RemoteError) -> Self {
        Self::Transport(TransportError::Remote(error))
    }
}

/// Truncate an upstream body to a bounded number of characters (not bytes).
pub fn body_snippet(body: &str) -> String {
    if body.chars().count() > BODY_SNIPPET_CHARS {
        let truncated: String = body.chars().take(BODY_SNIPPET_CHARS).collect();
        format!("{}...", truncated)
    } else {
        body.to_string()
    }
}
