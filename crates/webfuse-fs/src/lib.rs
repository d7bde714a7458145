//! # webfuse-fs
//!
//! The kernel-facing half of the webfuse adapter. [`FilesystemBridge`]
//! implements the FUSE low-level callbacks (`lookup`, `getattr`, `readdir`,
//! `open`, `read`, `release`) by issuing one JSON-RPC call per kernel
//! request through the owning session's proxy and marshaling the reply
//! into the kernel's reply format.
//!
//! Nothing is cached: attribute TTLs are zero, directory listings are
//! re-fetched on every kernel `readdir` sequence, and file contents flow
//! straight from the remote reply into the kernel buffer.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

mod attr;
pub mod bridge;
mod data;
mod dir;

pub use attr::ROOT_INODE;
pub use bridge::FilesystemBridge;
