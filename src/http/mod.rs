//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (hyper-util auto builder, HTTP/1.1 + HTTP/2)
//!     → Axum router (fallback: every method, every path)
//!     → relay::Relay::handle
//!     → streamed response back to the client
//! ```

pub mod server;

pub use server::{ProxyServer, ServerError};
