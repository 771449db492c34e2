//! TLS material for the secured scheme.
//!
//! Certificates are provisioned outside the relay; this module only loads
//! the PEM pair and builds the acceptor used per connection.

use std::path::Path;

use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};

use crate::config::TlsConfig;

/// Load TLS configuration from certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, std::io::Error> {
    if !cert_path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Certificate file not found: {:?}", cert_path),
        ));
    }
    if !key_path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Private key file not found: {:?}", key_path),
        ));
    }

    // The server and the upstream client link different rustls providers;
    // pin one process-wide before any config is built. Fails only if a
    // provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    RustlsConfig::from_pem_file(cert_path, key_path).await
}

/// Build the handshake acceptor for a listener's TLS settings.
pub async fn build_acceptor(tls: &TlsConfig) -> Result<RustlsAcceptor, std::io::Error> {
    let config = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
    Ok(RustlsAcceptor::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_certificate_is_not_found() {
        let tls = TlsConfig {
            cert_path: "/nonexistent/cert.pem".into(),
            key_path: "/nonexistent/key.pem".into(),
        };
        let err = build_acceptor(&tls).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
