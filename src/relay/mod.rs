//! The request relay pipeline.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → target.rs   (absolute URL, listening port removed)
//!     → headers.rs  (copy headers, drop transport-managed ones)
//!     → upstream.rs (one outbound call, returns on response head)
//!     → headers.rs  (merge response + content headers, drop Content-Length)
//!     → stream.rs   (body streamed back chunk by chunk)
//!     → downstream response
//!
//! Per request:
//!     Accepted → HeadersTranslated → UpstreamDispatched
//!              → HeadersRelayed → BodyStreaming → Closed
//!     any non-terminal state → Failed (logged, never retried)
//! ```

pub mod error;
pub mod headers;
pub mod stream;
pub mod target;
pub mod upstream;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{Scheme, TimeoutConfig};

pub use error::RelayError;
pub use target::ForwardTarget;
pub use upstream::{BodyStream, OutboundRequest, ReqwestUpstream, Upstream, UpstreamResponse};

/// Forwards inbound requests to the URL they address, minus the listening port.
///
/// One `Relay` serves every connection; per-request state lives only in
/// [`Relay::handle`].
pub struct Relay {
    upstream: Arc<dyn Upstream>,
    scheme: Scheme,
    listen_port: u16,
    headers_timeout: Option<Duration>,
    idle_timeout: Option<Duration>,
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

impl Relay {
    /// Create a relay without timeouts.
    pub fn new(upstream: Arc<dyn Upstream>, scheme: Scheme, listen_port: u16) -> Self {
        Self {
            upstream,
            scheme,
            listen_port,
            headers_timeout: None,
            idle_timeout: None,
        }
    }

    /// Apply the response-header and body-idle limits from config.
    pub fn with_timeouts(self, timeouts: &TimeoutConfig) -> Self {
        self.with_headers_timeout(secs(timeouts.response_headers_secs))
            .with_idle_timeout(secs(timeouts.idle_body_secs))
    }

    pub fn with_headers_timeout(mut self, limit: Option<Duration>) -> Self {
        self.headers_timeout = limit;
        self
    }

    pub fn with_idle_timeout(mut self, limit: Option<Duration>) -> Self {
        self.idle_timeout = limit;
        self
    }

    /// Port removed from forwarded URLs.
    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    /// Relay one request. Never fails: errors are logged and, when the
    /// response head has not been written yet, answered with a bare status.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let span = tracing::info_span!(
            "relay",
            request_id = %Uuid::new_v4(),
            method = %request.method(),
        );

        async move {
            match self.forward(request).await {
                Ok(response) => response,
                Err(err) => {
                    match &err {
                        RelayError::InvalidTarget(_) => {
                            tracing::warn!(category = err.category(), error = %err, "Request dropped")
                        }
                        _ => {
                            tracing::error!(category = err.category(), error = %err, "Request dropped")
                        }
                    }
                    err.status_code().into_response()
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run the pipeline up to the response head. The body is streamed by the
    /// returned response.
    pub async fn forward(&self, request: Request<Body>) -> Result<Response, RelayError> {
        let (parts, body) = request.into_parts();

        let target = target::resolve_target(&parts.uri, &parts.headers, self.scheme, self.listen_port)?;
        tracing::debug!(
            method = %parts.method,
            original_url = %target.original,
            forward_url = %target.url,
            headers = ?parts.headers,
            "Relaying request"
        );

        let outbound_headers = headers::outbound_request_headers(&parts.headers);
        let (body, progress) = if headers::has_entity_body(&parts.headers, &body) {
            let (tx, rx) = watch::channel(());
            (Some(Body::from_stream(stream::upload_body(body, tx))), Some(rx))
        } else {
            (None, None)
        };
        let target_url = target.url.to_string();

        let call = self.upstream.send(OutboundRequest {
            method: parts.method,
            url: target.url,
            headers: outbound_headers,
            body,
        });
        let upstream = match self.headers_timeout {
            Some(limit) => tokio::select! {
                result = call => result?,
                _ = stream::response_deadline(limit, progress) => {
                    return Err(RelayError::HeadersTimeout(limit));
                }
            },
            None => call.await?,
        };

        let response_headers =
            headers::downstream_response_headers(&upstream.headers, &upstream.content_headers);
        tracing::debug!(
            status = upstream.status.as_u16(),
            headers = ?response_headers,
            "Upstream responded"
        );

        let body = stream::relay_body(upstream.body, self.idle_timeout, target_url);
        let mut response = Response::new(Body::from_stream(body));
        *response.status_mut() = upstream.status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}
