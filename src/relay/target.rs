//! Forwarding target resolution.
//!
//! The relay forwards to the URL the caller addressed, minus the proxy's own
//! listening port. The port is removed from the parsed authority only, so a
//! port number that also appears in the path or query survives untouched.

use axum::http::{header, HeaderMap, Uri};
use url::Url;

use crate::config::Scheme;
use crate::relay::error::RelayError;

/// The inbound URL and the URL it is forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    /// Absolute form of the URL the caller addressed.
    pub original: String,
    /// Where the request is forwarded.
    pub url: Url,
}

/// Resolve the forwarding target for an inbound request.
///
/// Absolute-form request targets are used as they are. Origin-form targets
/// are completed from the listener scheme and the `Host` header.
pub fn resolve_target(
    uri: &Uri,
    headers: &HeaderMap,
    scheme: Scheme,
    listen_port: u16,
) -> Result<ForwardTarget, RelayError> {
    let url_scheme = uri.scheme_str().unwrap_or(scheme.as_str());

    let authority = match uri.authority() {
        Some(authority) => authority.as_str().to_string(),
        None => headers
            .get(header::HOST)
            .ok_or_else(|| RelayError::InvalidTarget("request has no Host header".into()))?
            .to_str()
            .map_err(|_| RelayError::InvalidTarget("Host header is not valid ASCII".into()))?
            .to_string(),
    };
    if authority.trim().is_empty() {
        return Err(RelayError::InvalidTarget("request has an empty Host".into()));
    }

    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let original = format!("{}://{}{}", url_scheme, authority, path);

    let url = strip_listen_port(&original, listen_port)?;
    Ok(ForwardTarget { original, url })
}

/// Parse `raw` and drop its authority port if it is the listening port.
pub fn strip_listen_port(raw: &str, listen_port: u16) -> Result<Url, RelayError> {
    let mut url =
        Url::parse(raw).map_err(|e| RelayError::InvalidTarget(format!("{}: {}", raw, e)))?;

    if url.host_str().map_or(true, str::is_empty) {
        return Err(RelayError::InvalidTarget(format!("{}: missing host", raw)));
    }

    if url.port() == Some(listen_port) {
        url.set_port(None)
            .map_err(|()| RelayError::InvalidTarget(format!("{}: cannot clear port", raw)))?;
    }

    Ok(url)
}
