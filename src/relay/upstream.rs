//! Outbound transport seam.
//!
//! The relay talks to upstreams through the [`Upstream`] trait so the shared
//! HTTP client is an explicit, injected dependency. [`ReqwestUpstream`] is
//! the production implementation; tests substitute fakes.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use url::Url;

use crate::config::{TimeoutConfig, UpstreamConfig};
use crate::relay::error::RelayError;
use crate::relay::headers::split_content_headers;

/// Lazily read upstream response body.
pub type BodyStream = BoxStream<'static, Result<Bytes, RelayError>>;

/// Request issued to the upstream, derived 1:1 from the inbound request.
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// `None` when the inbound request carried no entity body.
    pub body: Option<Body>,
}

/// Upstream answer, available as soon as its head has arrived.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Headers describing the body (type, length, encoding).
    pub content_headers: HeaderMap,
    pub body: BodyStream,
}

/// Capability to execute one outbound request.
///
/// Implementations must be safe to share across all in-flight relays.
pub trait Upstream: Send + Sync + 'static {
    fn send(&self, request: OutboundRequest) -> BoxFuture<'_, Result<UpstreamResponse, RelayError>>;
}

/// [`Upstream`] backed by a single pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestUpstream {
    client: reqwest::Client,
}

impl ReqwestUpstream {
    /// Build the shared client.
    ///
    /// Redirects are returned to the caller untouched and environment proxy
    /// settings are ignored, otherwise the relay would rewrite traffic.
    pub fn new(config: &UpstreamConfig, timeouts: &TimeoutConfig) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host);

        if timeouts.connect_secs > 0 {
            builder = builder.connect_timeout(Duration::from_secs(timeouts.connect_secs));
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl Upstream for ReqwestUpstream {
    fn send(&self, request: OutboundRequest) -> BoxFuture<'_, Result<UpstreamResponse, RelayError>> {
        Box::pin(async move {
            let mut outbound = reqwest::Request::new(request.method, request.url);
            *outbound.headers_mut() = request.headers;
            if let Some(body) = request.body {
                *outbound.body_mut() = Some(reqwest::Body::wrap_stream(body.into_data_stream()));
            }

            // Resolves once the response head is in; the body stays on the wire.
            let mut response = self.client.execute(outbound).await?;

            let status = response.status();
            let (headers, content_headers) =
                split_content_headers(std::mem::take(response.headers_mut()));
            let body = response.bytes_stream().map_err(RelayError::from).boxed();

            Ok(UpstreamResponse {
                status,
                headers,
                content_headers,
                body,
            })
        })
    }
}
