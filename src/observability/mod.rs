//! Observability subsystem.
//!
//! All diagnostics go through `tracing`. Each connection and each relay gets
//! its own span so interleaved log lines from concurrent requests can be
//! told apart.

pub mod logging;

pub use logging::init_logging;
