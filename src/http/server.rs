//! HTTP server setup and the accept loop.
//!
//! # Responsibilities
//! - Build the Axum router that hands every request to the relay
//! - Accept connections and spawn one task per connection immediately
//! - Serve HTTP/1.1 and HTTP/2 on each connection via hyper-util
//! - Perform the TLS handshake for the secured scheme inside that task
//! - Stop accepting on shutdown and drain open connections

use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, extract::State, http::Request, response::Response, Router};
use axum_server::accept::Accept;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::relay::{Relay, ReqwestUpstream, Upstream};

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion)
/// does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Errors that stop the server as a whole.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// The forwarding proxy server.
pub struct ProxyServer {
    config: ProxyConfig,
    upstream: Arc<dyn Upstream>,
}

impl ProxyServer {
    /// Create a server with the shared reqwest-backed upstream client.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let upstream = ReqwestUpstream::new(&config.upstream, &config.timeouts)?;
        Ok(Self::with_upstream(config, Arc::new(upstream)))
    }

    /// Create a server that sends outbound requests through `upstream`.
    pub fn with_upstream(config: ProxyConfig, upstream: Arc<dyn Upstream>) -> Self {
        Self { config, upstream }
    }

    /// Build the Axum router: every method and path goes to the relay.
    pub fn build_router(relay: Arc<Relay>) -> Router {
        Router::new()
            .fallback(relay_handler)
            .with_state(relay)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the accept loop until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
        let relay = Relay::new(self.upstream.clone(), listener.scheme(), local_addr.port())
            .with_timeouts(&self.config.timeouts);
        let app = Self::build_router(Arc::new(relay));
        let tls = listener.tls_acceptor();
        let tracker = ConnectionTracker::new();

        tracing::info!(
            scheme = %listener.scheme(),
            address = %local_addr,
            "Relay server accepting connections"
        );

        loop {
            let (stream, peer, permit) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                },
                _ = shutdown.recv() => break,
            };

            // Hand off and go straight back to accepting.
            let guard = tracker.track();
            let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);
            let app = app.clone();
            let tls = tls.clone();
            let conn_shutdown = shutdown.resubscribe();

            tokio::spawn(
                async move {
                    let _permit = permit;
                    let _guard = guard;
                    match tls {
                        None => serve_connection(stream, app, conn_shutdown).await,
                        Some(acceptor) => match acceptor.accept(stream, ()).await {
                            Ok((tls_stream, ())) => {
                                serve_connection(tls_stream, app, conn_shutdown).await
                            }
                            Err(e) => tracing::debug!(error = %e, "TLS handshake failed"),
                        },
                    }
                }
                .instrument(span),
            );
        }

        let open = tracker.open_connections();
        tracing::info!(open_connections = open, "Stopped accepting; draining connections");
        if open > 0 {
            let limit = Duration::from_secs(self.config.timeouts.drain_secs);
            if !tracker.drain(limit).await {
                tracing::warn!(
                    open_connections = tracker.open_connections(),
                    "Drain deadline passed; abandoning open connections"
                );
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Serve every request on one connection until it closes or shutdown asks
/// it to finish.
async fn serve_connection<I>(io: I, app: Router, mut shutdown: broadcast::Receiver<()>)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(io), TowerToHyperService::new(app));
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(err) = result {
                    let incomplete = err
                        .downcast_ref::<hyper::Error>()
                        .is_some_and(|e| e.is_incomplete_message());
                    if incomplete {
                        tracing::debug!(error = %err, "Client closed connection mid-message");
                    } else {
                        tracing::warn!(error = %err, "Connection error");
                    }
                }
                break;
            }
            _ = shutdown.recv(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

async fn relay_handler(State(relay): State<Arc<Relay>>, request: Request<Body>) -> Response {
    relay.handle(request).await
}
