//! Configuration validation.
//!
//! Serde handles the syntax; this module checks that the values make sense
//! together. All problems are reported, not just the first.

use std::net::IpAddr;

use thiserror::Error;

use crate::config::schema::{ProxyConfig, Scheme};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_host '{0}' is not an IP address")]
    BindHost(String),

    #[error("listener.max_connections must be greater than zero")]
    ZeroConnections,

    #[error("secured scheme requires [listener.tls] with cert_path and key_path")]
    MissingTls,

    #[error("listener.tls.{0} is empty")]
    EmptyTlsPath(&'static str),
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let listener = &config.listener;

    if listener.bind_host.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::BindHost(listener.bind_host.clone()));
    }

    if listener.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }

    match (&listener.scheme, &listener.tls) {
        (Scheme::Secured, None) => errors.push(ValidationError::MissingTls),
        (_, Some(tls)) => {
            if tls.cert_path.trim().is_empty() {
                errors.push(ValidationError::EmptyTlsPath("cert_path"));
            }
            if tls.key_path.trim().is_empty() {
                errors.push(ValidationError::EmptyTlsPath("key_path"));
            }
        }
        (Scheme::Plain, None) => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
