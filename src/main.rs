//! Forwarding HTTP(S) relay
//!
//! ```text
//!  client ──▶ listener ──▶ relay ──────────────▶ upstream
//!  (host:8080/path)        │ strip :8080          (host/path)
//!                          │ copy headers
//!  client ◀── streamed ◀───┘ merge headers, drop Content-Length
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use forward_relay::config::{load_config, validate_config, ConfigError, ProxyConfig, Scheme, TlsConfig};
use forward_relay::lifecycle::{signals, Shutdown};
use forward_relay::observability::init_logging;
use forward_relay::{Listener, ProxyServer};

#[derive(Parser, Debug)]
#[command(name = "forward-relay")]
#[command(about = "Forwards HTTP(S) requests to the addressed host with the listening port removed", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listening port (also the port stripped from forwarded URLs)
    #[arg(short, long)]
    port: Option<u16>,

    /// Listener scheme: plain or secured
    #[arg(short, long)]
    scheme: Option<Scheme>,

    /// Interface to bind
    #[arg(long)]
    bind_host: Option<String>,

    /// Certificate (PEM) for the secured scheme
    #[arg(long, requires = "key")]
    cert: Option<String>,

    /// Private key (PEM) for the secured scheme
    #[arg(long, requires = "cert")]
    key: Option<String>,

    /// Log filter level (RUST_LOG takes precedence)
    #[arg(long)]
    log_level: Option<String>,
}

/// File (or defaults) first, then CLI overrides, then validation.
fn build_config(cli: &Cli) -> Result<ProxyConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if let Some(scheme) = cli.scheme {
        config.listener.scheme = scheme;
    }
    if let Some(host) = &cli.bind_host {
        config.listener.bind_host = host.clone();
    }
    if let (Some(cert), Some(key)) = (&cli.cert, &cli.key) {
        config.listener.tls = Some(TlsConfig {
            cert_path: cert.clone(),
            key_path: key.clone(),
        });
    }
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            init_logging("info");
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.observability.log_level);

    tracing::info!(
        scheme = %config.listener.scheme,
        port = config.listener.port,
        "forward-relay v{} launching",
        env!("CARGO_PKG_VERSION")
    );

    let listener = match Listener::bind(&config.listener).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    let server = match ProxyServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    match server.run(listener, server_shutdown).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}
