//! Shared utilities for integration tests: mock upstreams and a running relay.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::IntoResponse,
    Router,
};
use forward_relay::config::ProxyConfig;
use forward_relay::{Listener, ProxyServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

async fn bind_local() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Read until the end of the request head. False if the peer went away.
async fn read_head(socket: &mut TcpStream) -> bool {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return false,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    true
}

/// Start a backend that answers every connection with the given raw HTTP
/// response after reading the request head.
pub async fn start_raw_backend(response: &'static str) -> SocketAddr {
    let (listener, addr) = bind_local().await;

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if !read_head(&mut socket).await {
                    return;
                }
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a backend that answers with a chunked body whose first chunk is
/// `first`.
///
/// With `release`, the rest of the body (`second`) is held back until the
/// notification arrives. Without it, the connection is dropped mid-body.
pub async fn start_chunked_backend(release: Option<Arc<Notify>>) -> SocketAddr {
    let (listener, addr) = bind_local().await;

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let release = release.clone();
            tokio::spawn(async move {
                if !read_head(&mut socket).await {
                    return;
                }
                let head = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n5\r\nfirst\r\n";
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;

                match release {
                    Some(release) => {
                        release.notified().await;
                        let _ = socket.write_all(b"6\r\nsecond\r\n0\r\n\r\n").await;
                        let _ = socket.shutdown().await;
                    }
                    None => drop(socket),
                }
            });
        }
    });

    addr
}

/// Echo backend.
///
/// Reports what arrived: `x-echo-method`, `x-echo-uri`, `x-echo-has-body`
/// and `x-echo-host`, repeats every `x-multi` value, and returns the
/// request body as the response body.
pub async fn start_echo_backend() -> SocketAddr {
    async fn echo(method: axum::http::Method, uri: Uri, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
        let has_body = headers.contains_key(header::TRANSFER_ENCODING)
            || headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .is_some_and(|n| n > 0);

        let mut out = HeaderMap::new();
        out.insert("x-echo-method", HeaderValue::from_str(method.as_str()).unwrap());
        out.insert("x-echo-uri", HeaderValue::from_str(&uri.to_string()).unwrap());
        out.insert("x-echo-has-body", HeaderValue::from_static(if has_body { "true" } else { "false" }));
        if let Some(host) = headers.get(header::HOST) {
            out.insert("x-echo-host", host.clone());
        }
        for value in headers.get_all("x-multi") {
            out.append("x-multi", value.clone());
        }

        (StatusCode::OK, out, body)
    }

    serve(Router::new().fallback(echo)).await
}

/// Backend that waits `delay` and then answers with `tag`.
pub async fn start_delayed_backend(delay: Duration, tag: &'static str) -> SocketAddr {
    let app = Router::new().fallback(move || async move {
        tokio::time::sleep(delay).await;
        tag
    });
    serve(app).await
}

async fn serve(app: Router) -> SocketAddr {
    let (listener, addr) = bind_local().await;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let (listener, addr) = bind_local().await;
    drop(listener);
    addr
}

/// Start the relay on an ephemeral local port.
pub async fn start_proxy() -> (SocketAddr, Shutdown) {
    let mut config = ProxyConfig::default();
    config.listener.bind_host = "127.0.0.1".into();
    config.listener.port = 0;
    config.timeouts.response_headers_secs = 5;

    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ProxyServer::new(config).unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

/// HTTP client that sends every request through the relay.
pub fn client_via(proxy: SocketAddr) -> reqwest::Client {
    reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(format!("http://{}", proxy)).unwrap())
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
