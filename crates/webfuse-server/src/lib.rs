//! # webfuse-server
//!
//! The adapter server: accepts provider connections over WebSocket,
//! maintains one session per connection and exposes the provider-facing
//! JSON-RPC methods (`add_filesystem`, `authenticate`). Every filesystem a
//! provider adds is mounted locally and served on demand through the
//! connection's JSON-RPC proxy.
//!
//! All state is in memory and per connection; local mount directories are
//! transient and removed on teardown.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

pub mod authenticator;
pub mod config;
pub mod error;
pub mod mountpoint;
pub mod protocol;
pub mod server;
mod session;

pub use authenticator::{Authenticator, AuthenticatorRegistry, Principal};
pub use config::{DEFAULT_PORT, DEFAULT_VHOST_NAME, ServerConfig, ServerConfigBuilder, TlsConfig};
pub use error::ServerError;
pub use mountpoint::{FuseMountpointFactory, Mountpoint, MountpointFactory};
pub use protocol::{ADAPTER_SERVER_PROTOCOL, PROVIDER_CLIENT_PROTOCOL};
pub use server::Server;
