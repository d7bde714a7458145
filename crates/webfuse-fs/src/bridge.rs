//! The kernel-facing bridge.
//!
//! Each implemented callback issues exactly one JSON-RPC call (or, for
//! `release`, one notification) and completes the kernel reply handle from
//! the response. Callbacks arrive on the FUSE session thread and hop onto
//! the tokio runtime; the reply is issued from the completion task.
//! Operations on the same inode may overlap; the remote is responsible for
//! semantic coherence.

use std::ffi::OsStr;
use std::fmt;
use std::sync::Arc;

use fuser::{
    Errno, FileHandle, FileType, Filesystem, FopenFlags, Generation, INodeNo, LockOwner,
    OpenFlags, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, Request,
};
use serde_json::{Value, json};
use tokio::runtime::Handle;
use tracing::debug;

use webfuse_jsonrpc::Proxy;

use crate::attr::{self, ATTR_TTL, ROOT_INODE};
use crate::data::decode_read_payload;
use crate::dir::parse_dir_entries;

/// Routes kernel filesystem callbacks to a remote provider.
///
/// One bridge per mounted filesystem, sharing the owning session's proxy.
/// Callbacks the provider protocol does not know (`write`, `mkdir`, …)
/// keep their ENOSYS defaults.
pub struct FilesystemBridge {
    filesystem: String,
    proxy: Arc<Proxy>,
    runtime: Handle,
}

impl FilesystemBridge {
    /// Create a bridge for `filesystem`, issuing calls through `proxy` and
    /// spawning completions onto `runtime`.
    #[must_use]
    pub fn new(filesystem: impl Into<String>, proxy: Arc<Proxy>, runtime: Handle) -> Self {
        Self {
            filesystem: filesystem.into(),
            proxy,
            runtime,
        }
    }

    /// The remote filesystem name this bridge serves.
    #[must_use]
    pub fn filesystem(&self) -> &str {
        &self.filesystem
    }
}

impl fmt::Debug for FilesystemBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilesystemBridge")
            .field("filesystem", &self.filesystem)
            .finish_non_exhaustive()
    }
}

impl Filesystem for FilesystemBridge {
    fn lookup(&self, _req: &Request, parent: INodeNo, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str().map(str::to_owned) else {
            reply.error(Errno::ENOENT);
            return;
        };
        let parent: u64 = parent.into();
        let proxy = Arc::clone(&self.proxy);
        let filesystem = self.filesystem.clone();
        self.runtime.spawn(async move {
            let outcome = proxy
                .invoke("lookup", vec![json!(filesystem), json!(parent), json!(name)])
                .await
                .and_then(|result| attr::parse_entry(&result));
            match outcome {
                Ok(attributes) => reply.entry(&ATTR_TTL, &attributes, Generation(0)),
                Err(err) => {
                    debug!(%filesystem, parent, %name, %err, "lookup failed");
                    reply.error(Errno::ENOENT);
                }
            }
        });
    }

    fn getattr(&self, _req: &Request, ino: INodeNo, _fh: Option<FileHandle>, reply: ReplyAttr) {
        let ino: u64 = ino.into();
        if ino == ROOT_INODE {
            // The root exists by virtue of the mountpoint; no RPC.
            reply.attr(&ATTR_TTL, &attr::root_attr());
            return;
        }
        let proxy = Arc::clone(&self.proxy);
        let filesystem = self.filesystem.clone();
        self.runtime.spawn(async move {
            let outcome = proxy
                .invoke("getattr", vec![json!(filesystem), json!(ino)])
                .await
                .and_then(|result| attr::parse_attr(&result, ino));
            match outcome {
                Ok(attributes) => reply.attr(&ATTR_TTL, &attributes),
                Err(err) => {
                    debug!(%filesystem, ino, %err, "getattr failed");
                    reply.error(Errno::ENOENT);
                }
            }
        });
    }

    fn readdir(
        &self,
        _req: &Request,
        ino: INodeNo,
        _fh: FileHandle,
        offset: u64,
        mut reply: ReplyDirectory,
    ) {
        let ino: u64 = ino.into();
        let proxy = Arc::clone(&self.proxy);
        let filesystem = self.filesystem.clone();
        self.runtime.spawn(async move {
            let outcome = proxy
                .invoke("readdir", vec![json!(filesystem), json!(ino)])
                .await
                .and_then(|result| parse_dir_entries(&result));
            match outcome {
                Ok(entries) => {
                    // Offsets are resume cookies: a follow-up call continues
                    // after the last delivered entry. The listing carries no
                    // type, so entries surface as DT_UNKNOWN-equivalents and
                    // the kernel resolves real types on lookup.
                    for (index, entry) in entries.iter().enumerate().skip(offset as usize) {
                        let full = reply.add(
                            INodeNo(entry.inode),
                            (index + 1) as u64,
                            FileType::RegularFile,
                            &entry.name,
                        );
                        if full {
                            break;
                        }
                    }
                    reply.ok();
                }
                Err(err) => {
                    debug!(%filesystem, ino, %err, "readdir failed");
                    reply.error(Errno::ENOENT);
                }
            }
        });
    }

    fn open(&self, _req: &Request, ino: INodeNo, flags: OpenFlags, reply: ReplyOpen) {
        let ino: u64 = ino.into();
        let flags = flags.0;
        let proxy = Arc::clone(&self.proxy);
        let filesystem = self.filesystem.clone();
        self.runtime.spawn(async move {
            match proxy
                .invoke("open", vec![json!(filesystem), json!(ino), json!(flags)])
                .await
            {
                Ok(result) => match result.get("handle").and_then(Value::as_u64) {
                    Some(handle) => reply.opened(FileHandle(handle), FopenFlags::empty()),
                    None => {
                        debug!(%filesystem, ino, "open reply carries no handle");
                        reply.error(Errno::EIO);
                    }
                },
                Err(err) => {
                    debug!(%filesystem, ino, %err, "open failed");
                    reply.error(Errno::EIO);
                }
            }
        });
    }

    fn read(
        &self,
        _req: &Request,
        ino: INodeNo,
        fh: FileHandle,
        offset: u64,
        size: u32,
        _flags: OpenFlags,
        _lock_owner: Option<LockOwner>,
        reply: ReplyData,
    ) {
        let ino: u64 = ino.into();
        let fh: u64 = fh.into();
        let proxy = Arc::clone(&self.proxy);
        let filesystem = self.filesystem.clone();
        self.runtime.spawn(async move {
            let outcome = proxy
                .invoke(
                    "read",
                    vec![
                        json!(filesystem),
                        json!(ino),
                        json!(fh),
                        json!(offset),
                        json!(size),
                    ],
                )
                .await
                .and_then(|result| decode_read_payload(&result));
            match outcome {
                Ok(bytes) => reply.data(&bytes),
                Err(err) => {
                    debug!(%filesystem, ino, fh, offset, %err, "read failed");
                    reply.error(Errno::EIO);
                }
            }
        });
    }

    fn release(
        &self,
        _req: &Request,
        ino: INodeNo,
        fh: FileHandle,
        _flags: OpenFlags,
        _lock_owner: Option<LockOwner>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let ino: u64 = ino.into();
        let fh: u64 = fh.into();
        let proxy = Arc::clone(&self.proxy);
        let filesystem = self.filesystem.clone();
        self.runtime.spawn(async move {
            // Fire and forget; the kernel is not kept waiting on the remote.
            if let Err(err) = proxy
                .notify("close", vec![json!(filesystem), json!(ino), json!(fh)])
                .await
            {
                debug!(%filesystem, ino, fh, %err, "close notification dropped");
            }
        });
        reply.ok();
    }
}
