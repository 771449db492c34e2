//! Relay error taxonomy.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that terminate a single relay.
///
/// Every variant is local to the request it occurred on; none of them is
/// retried and none of them affects other relays.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The inbound request could not be turned into a forwarding target.
    #[error("invalid forwarding target: {0}")]
    InvalidTarget(String),

    /// The upstream could not be reached (refused, DNS, TLS handshake).
    #[error("upstream connect failed: {0}")]
    Connect(String),

    /// The upstream call failed after the connection was established.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// Upstream went quiet for too long before sending response headers,
    /// either mid-upload or after the request was fully sent.
    #[error("upstream made no progress towards response headers within {0:?}")]
    HeadersTimeout(Duration),

    /// Reading the upstream body failed mid-transfer.
    #[error("upstream body stream failed: {0}")]
    BodyStream(String),

    /// Upstream body went silent for longer than the idle limit.
    #[error("upstream body idle for more than {0:?}")]
    IdleTimeout(Duration),
}

impl RelayError {
    /// Status reported to the caller when the failure happens before the
    /// response head has been written.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            RelayError::HeadersTimeout(_) | RelayError::IdleTimeout(_) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            RelayError::Connect(_) | RelayError::Upstream(_) | RelayError::BodyStream(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Short label used as a structured log field.
    pub fn category(&self) -> &'static str {
        match self {
            RelayError::InvalidTarget(_) => "translation",
            RelayError::Connect(_) | RelayError::Upstream(_) | RelayError::HeadersTimeout(_) => {
                "upstream"
            }
            RelayError::BodyStream(_) | RelayError::IdleTimeout(_) => "stream",
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest hides the source chain in Display; keep it for the logs.
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = std::error::Error::source(inner);
        }

        if err.is_connect() {
            RelayError::Connect(message)
        } else if err.is_body() || err.is_decode() {
            RelayError::BodyStream(message)
        } else {
            RelayError::Upstream(message)
        }
    }
}
