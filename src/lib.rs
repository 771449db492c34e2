//! Forwarding HTTP(S) relay.
//!
//! Accepts requests on a configured port and re-issues each one to the URL
//! it addresses with the listening port removed, streaming the upstream
//! response back to the caller.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;

pub use config::schema::ProxyConfig;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
pub use net::Listener;
pub use relay::Relay;
