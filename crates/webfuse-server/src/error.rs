//! Server error types.

use thiserror::Error;

/// Errors surfaced while configuring or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configuration lacks a mountpoint factory.
    #[error("a mountpoint factory is required")]
    MissingMountpointFactory,
    /// Socket-level failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// TLS material could not be loaded.
    #[error("invalid TLS configuration: {0}")]
    Tls(String),
}
