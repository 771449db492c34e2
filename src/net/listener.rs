//! TCP listener with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured port under the configured scheme
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore
//! - Hand out the TLS acceptor for the secured scheme

use std::net::SocketAddr;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsAcceptor;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::config::{ListenerConfig, Scheme};
use crate::net::tls;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address. Fatal at startup.
    Bind(std::io::Error),
    /// Failed to load TLS material for the secured scheme.
    Tls(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Tls(e) => write!(f, "Failed to load TLS material: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind(e) | ListenerError::Tls(e) | ListenerError::Accept(e) => Some(e),
        }
    }
}

/// A bound listener that limits concurrent connections.
///
/// When the limit is reached, accepting waits until a slot becomes available.
pub struct Listener {
    inner: TcpListener,
    scheme: Scheme,
    tls: Option<RustlsAcceptor>,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Bind to the configured address with connection limits.
    ///
    /// Port 0 binds an ephemeral port; [`Listener::local_addr`] reports the
    /// one actually used.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr = config.socket_addr().map_err(|e| {
            ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let tls = match (config.scheme, &config.tls) {
            (Scheme::Secured, Some(tls_config)) => {
                Some(tls::build_acceptor(tls_config).await.map_err(ListenerError::Tls)?)
            }
            (Scheme::Secured, None) => {
                return Err(ListenerError::Tls(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "secured scheme configured without certificate material",
                )))
            }
            (Scheme::Plain, _) => None,
        };

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            scheme = %config.scheme,
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            scheme: config.scheme,
            tls,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| {
                ListenerError::Accept(std::io::Error::new(std::io::ErrorKind::Other, e))
            })?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Scheme this listener serves.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// TLS acceptor, present for the secured scheme.
    pub fn tls_acceptor(&self) -> Option<RustlsAcceptor> {
        self.tls.clone()
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A permit representing a connection slot.
///
/// Dropping it releases the slot, even if the connection task panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
