//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)          CLI flags
//!     → loader.rs (parse)         │
//!     → validation.rs  ◀──────────┘ (overrides re-validated)
//!     → ProxyConfig (validated, immutable)
//!     → consumed by net (listener) and relay (timeouts, client)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults so an empty file is a valid config
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::ProxyConfig;
pub use schema::Scheme;
pub use schema::TimeoutConfig;
pub use schema::TlsConfig;
pub use schema::UpstreamConfig;
pub use validation::{validate_config, ValidationError};
