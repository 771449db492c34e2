//! Header translation between the two legs of a relay.
//!
//! Values are copied without validation or re-encoding. Multiple values for
//! one name stay separate entries in their original order.

use axum::body::{Body, HttpBody};
use axum::http::header::{self, HeaderMap, HeaderName};

/// Connection-scoped headers (RFC 9110 §7.6.1). Each leg's transport
/// manages its own.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Header names that describe the body rather than the message.
const CONTENT_HEADERS: &[&str] = &["allow", "expires", "last-modified"];

/// Extra hop-by-hop names declared in `Connection`.
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

fn is_hop_by_hop(name: &HeaderName, declared: &[String]) -> bool {
    let name = name.as_str();
    HOP_BY_HOP.contains(&name) || declared.iter().any(|token| token == name)
}

/// Whether a header describes the body (type, length, encoding, ...).
pub fn is_content_header(name: &HeaderName) -> bool {
    let name = name.as_str();
    name.starts_with("content-") || CONTENT_HEADERS.contains(&name)
}

/// Headers sent upstream: every inbound pair except the ones the outbound
/// transport computes itself (`Host`, `Content-Length`, hop-by-hop).
pub fn outbound_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let declared = connection_tokens(inbound);
    let mut outbound = HeaderMap::with_capacity(inbound.len());

    for (name, value) in inbound {
        if name == header::HOST || name == header::CONTENT_LENGTH || is_hop_by_hop(name, &declared) {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }

    outbound
}

/// Whether the inbound request explicitly carries an entity body.
///
/// A verb that merely allows a body does not count. The request must declare
/// chunked framing or a non-zero length, or its body stream must still have
/// data to yield. HTTP/2 uploads of unknown length carry neither header and
/// are only visible through the stream.
pub fn has_entity_body(headers: &HeaderMap, body: &Body) -> bool {
    if headers.contains_key(header::TRANSFER_ENCODING) || !body.is_end_stream() {
        return true;
    }

    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .is_some_and(|length| length > 0)
}

/// Split upstream headers into general response headers and content headers.
pub fn split_content_headers(headers: HeaderMap) -> (HeaderMap, HeaderMap) {
    let mut general = HeaderMap::with_capacity(headers.len());
    let mut content = HeaderMap::new();

    // `HeaderMap::into_iter` yields `None` for repeated values of the
    // previous name.
    let mut current: Option<HeaderName> = None;
    for (name, value) in headers {
        if let Some(name) = name {
            current = Some(name);
        }
        let Some(name) = current.clone() else {
            continue;
        };
        if is_content_header(&name) {
            content.append(name, value);
        } else {
            general.append(name, value);
        }
    }

    (general, content)
}

/// Headers written downstream: the union of upstream response and content
/// headers, minus `Content-Length` and hop-by-hop headers. Framing is derived
/// from the bytes actually streamed, never from a copied length.
pub fn downstream_response_headers(response: &HeaderMap, content: &HeaderMap) -> HeaderMap {
    let mut declared = connection_tokens(response);
    declared.extend(connection_tokens(content));

    let mut merged = HeaderMap::with_capacity(response.len() + content.len());
    for (name, value) in response.iter().chain(content.iter()) {
        if is_hop_by_hop(name, &declared) {
            continue;
        }
        merged.append(name.clone(), value.clone());
    }

    merged.remove(header::CONTENT_LENGTH);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn values<'a>(headers: &'a HeaderMap, name: &str) -> Vec<&'a str> {
        headers
            .get_all(name)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect()
    }

    #[test]
    fn repeated_names_keep_count_and_order() {
        let mut inbound = HeaderMap::new();
        inbound.append("x-multi", HeaderValue::from_static("one"));
        inbound.append("accept", HeaderValue::from_static("text/html"));
        inbound.append("x-multi", HeaderValue::from_static("two"));
        inbound.append("x-multi", HeaderValue::from_static("three"));

        let outbound = outbound_request_headers(&inbound);
        assert_eq!(values(&outbound, "x-multi"), vec!["one", "two", "three"]);
        assert_eq!(values(&outbound, "accept"), vec!["text/html"]);
    }

    #[test]
    fn transport_managed_headers_not_forwarded() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("host:8080"));
        inbound.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, X-Secret"));
        inbound.insert("x-secret", HeaderValue::from_static("hop"));
        inbound.insert("proxy-connection", HeaderValue::from_static("keep-alive"));
        inbound.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let outbound = outbound_request_headers(&inbound);
        assert_eq!(outbound.len(), 1);
        assert_eq!(values(&outbound, "content-type"), vec!["text/plain"]);
    }

    #[test]
    fn unusual_values_pass_through_unchanged() {
        let mut inbound = HeaderMap::new();
        let raw = HeaderValue::from_bytes(b"=?utf-8?q?caf=C3=A9?=  ;; weird").unwrap();
        inbound.insert("x-encoded", raw.clone());

        let outbound = outbound_request_headers(&inbound);
        assert_eq!(outbound.get("x-encoded"), Some(&raw));
    }

    #[test]
    fn entity_body_detection() {
        let mut headers = HeaderMap::new();
        assert!(!has_entity_body(&headers, &Body::empty()));

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        assert!(!has_entity_body(&headers, &Body::empty()));

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        assert!(has_entity_body(&headers, &Body::empty()));

        let mut chunked = HeaderMap::new();
        chunked.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        assert!(has_entity_body(&chunked, &Body::empty()));
    }

    #[test]
    fn undeclared_streamed_body_counts() {
        let chunks = futures_util::stream::iter(vec![Ok::<_, std::io::Error>("upload")]);
        assert!(has_entity_body(&HeaderMap::new(), &Body::from_stream(chunks)));
        assert!(has_entity_body(&HeaderMap::new(), &Body::from("payload")));
    }

    #[test]
    fn split_separates_content_headers() {
        let mut upstream = HeaderMap::new();
        upstream.append(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        upstream.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        upstream.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
        upstream.append(header::CONTENT_LENGTH, HeaderValue::from_static("5"));
        upstream.append(header::EXPIRES, HeaderValue::from_static("0"));

        let (general, content) = split_content_headers(upstream);
        assert_eq!(values(&general, "set-cookie"), vec!["a=1", "b=2"]);
        assert_eq!(general.len(), 2);
        assert_eq!(content.len(), 3);
        assert!(content.contains_key(header::CONTENT_LENGTH));
    }

    #[test]
    fn downstream_merge_drops_length_and_hop_headers() {
        let mut general = HeaderMap::new();
        general.append("x-test", HeaderValue::from_static("abc"));
        general.append(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        general.append(header::CONNECTION, HeaderValue::from_static("close"));
        let mut content = HeaderMap::new();
        content.append(header::CONTENT_LENGTH, HeaderValue::from_static("5"));
        content.append(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let merged = downstream_response_headers(&general, &content);
        assert_eq!(values(&merged, "x-test"), vec!["abc"]);
        assert_eq!(values(&merged, "content-type"), vec!["text/plain"]);
        assert!(!merged.contains_key(header::CONTENT_LENGTH));
        assert!(!merged.contains_key(header::TRANSFER_ENCODING));
        assert!(!merged.contains_key(header::CONNECTION));
    }
}
