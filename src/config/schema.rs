//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use std::net::{AddrParseError, SocketAddr};

use serde::{Deserialize, Serialize};

/// Root configuration for the forwarding proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (port, scheme, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration for relays.
    pub timeouts: TimeoutConfig,

    /// Shared upstream client settings.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Scheme the listener accepts traffic under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain HTTP.
    #[default]
    #[serde(alias = "http")]
    Plain,
    /// HTTP over TLS.
    #[serde(alias = "https")]
    Secured,
}

impl Scheme {
    /// URL scheme name for this listener scheme.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Plain => "http",
            Scheme::Secured => "https",
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "http" => Ok(Scheme::Plain),
            "secured" | "https" => Ok(Scheme::Secured),
            other => Err(format!("unknown scheme '{}' (expected plain or secured)", other)),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub bind_host: String,

    /// Listening port. This is also the port stripped from forwarded URLs.
    pub port: u16,

    /// Plain or TLS-secured listener.
    pub scheme: Scheme,

    /// Certificate material, required for the secured scheme.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8080,
            scheme: Scheme::Plain,
            tls: None,
            max_connections: 10_000,
        }
    }
}

impl ListenerConfig {
    /// Socket address to bind.
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        Ok(SocketAddr::new(self.bind_host.parse()?, self.port))
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Timeout configuration for a single relay. Zero disables a timeout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for the upstream to produce response headers once the
    /// request body is sent. While the body uploads, this is the longest
    /// pause allowed between two chunks.
    pub response_headers_secs: u64,

    /// Maximum silence between two response body chunks.
    pub idle_body_secs: u64,

    /// How long shutdown waits for open connections to finish.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            response_headers_secs: 60,
            idle_body_secs: 120,
            drain_secs: 30,
        }
    }
}

/// Settings for the shared upstream HTTP client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Idle pooled connections are closed after this many seconds.
    pub pool_idle_secs: u64,

    /// Maximum idle pooled connections per upstream host.
    pub pool_max_idle_per_host: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            pool_idle_secs: 90,
            pool_max_idle_per_host: 32,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
