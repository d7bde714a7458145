//! # webfuse-jsonrpc
//!
//! JSON-RPC plumbing for the webfuse adapter. The dialect is deliberately
//! small: UTF-8 text frames, one JSON-RPC object per frame, numeric ids,
//! no version member.
//!
//! Two halves live here:
//!
//! - [`Proxy`] — the client side. Serializes requests onto a per-connection
//!   frame queue, correlates responses by id and enforces a per-call
//!   deadline.
//! - [`Dispatcher`] — the server side. Parses inbound requests and routes
//!   them to registered [`Method`] handlers.
//!
//! Both halves share the [`RpcError`] wire error and the [`ErrorCode`]
//! status taxonomy.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

pub mod dispatcher;
pub mod error;
pub mod proxy;
pub mod response;

pub use dispatcher::{Dispatcher, Method};
pub use error::{ErrorCode, RpcError, RpcResult};
pub use proxy::{DEFAULT_TIMEOUT, Proxy};
pub use response::Response;
