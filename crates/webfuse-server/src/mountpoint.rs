//! Mountpoint lifecycle.
//!
//! A mountpoint is the local directory where one remote filesystem is
//! exposed. The factory decides where that directory lives and performs
//! the kernel mount; returning `None` rejects the `add_filesystem` call.

use std::fmt;
use std::path::{Path, PathBuf};

use fuser::MountOption;
use tracing::{debug, warn};

use webfuse_fs::FilesystemBridge;

/// Creates and mounts the local directory for one filesystem.
pub trait MountpointFactory: Send + Sync {
    /// Create the mountpoint for `filesystem` and attach `bridge` to it.
    ///
    /// Returning `None` rejects the `add_filesystem` call.
    fn create_mountpoint(&self, filesystem: &str, bridge: FilesystemBridge) -> Option<Mountpoint>;
}

/// A mounted local directory backing one remote filesystem.
///
/// Dropping a mountpoint detaches the kernel filesystem (if one is
/// attached) and removes the directory it created.
pub struct Mountpoint {
    path: PathBuf,
    remove_on_drop: bool,
    kernel: Option<fuser::BackgroundSession>,
}

impl Mountpoint {
    /// Wrap an existing directory without a kernel attachment.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            remove_on_drop: false,
            kernel: None,
        }
    }

    /// Remove the directory when the mountpoint is dropped.
    #[must_use]
    pub fn remove_on_drop(mut self) -> Self {
        self.remove_on_drop = true;
        self
    }

    /// Attach the kernel session keeping this mountpoint served.
    #[must_use]
    pub fn with_kernel(mut self, kernel: fuser::BackgroundSession) -> Self {
        self.kernel = Some(kernel);
        self
    }

    /// The local directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Mountpoint {
    fn drop(&mut self) {
        // Unmount before removing the directory underneath the mount.
        if let Some(kernel) = self.kernel.take() {
            debug!(path = %self.path.display(), "unmounting");
            drop(kernel);
        }
        if self.remove_on_drop
            && let Err(err) = std::fs::remove_dir(&self.path)
        {
            warn!(path = %self.path.display(), %err, "failed to remove mountpoint directory");
        }
    }
}

impl fmt::Debug for Mountpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mountpoint")
            .field("path", &self.path)
            .field("mounted", &self.kernel.is_some())
            .finish()
    }
}

/// The shipped factory: creates `<base>/<name>` and mounts the bridge
/// there through the kernel. Filesystems are exposed read-only, matching
/// the provider protocol.
#[derive(Debug, Clone)]
pub struct FuseMountpointFactory {
    base_dir: PathBuf,
}

impl FuseMountpointFactory {
    /// Create a factory rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// The directory mountpoints are created under.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl MountpointFactory for FuseMountpointFactory {
    fn create_mountpoint(&self, filesystem: &str, bridge: FilesystemBridge) -> Option<Mountpoint> {
        let path = self.base_dir.join(filesystem);
        if let Err(err) = std::fs::create_dir_all(&path) {
            warn!(path = %path.display(), %err, "cannot create mountpoint directory");
            return None;
        }
        let mut options = fuser::Config::default();
        options.mount_options = vec![
            MountOption::FSName(format!("webfuse:{filesystem}")),
            MountOption::RO,
            MountOption::AutoUnmount,
        ];
        match fuser::spawn_mount2(bridge, &path, &options) {
            Ok(kernel) => Some(Mountpoint::new(path).remove_on_drop().with_kernel(kernel)),
            Err(err) => {
                warn!(filesystem, %err, "mount failed");
                let _ = std::fs::remove_dir(&path);
                None
            }
        }
    }
}
