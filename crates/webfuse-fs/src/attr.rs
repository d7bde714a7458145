//! Attribute marshaling between remote replies and kernel stat structures.

use std::time::{Duration, SystemTime};

use fuser::{FileAttr, FileType, INodeNo};
use serde_json::Value;

use webfuse_jsonrpc::RpcError;

/// The root inode of every mounted filesystem.
pub const ROOT_INODE: u64 = 1;

/// TTL handed to the kernel with every entry and attribute reply. Zero
/// keeps each operation remote.
pub(crate) const ATTR_TTL: Duration = Duration::ZERO;

const BLOCK_SIZE: u64 = 512;

pub(crate) fn parse_kind(kind: &str) -> Option<FileType> {
    match kind {
        "file" => Some(FileType::RegularFile),
        "dir" => Some(FileType::Directory),
        "link" => Some(FileType::Symlink),
        _ => None,
    }
}

pub(crate) fn file_attr(inode: u64, kind: FileType, mode: u32, size: u64) -> FileAttr {
    FileAttr {
        ino: INodeNo(inode),
        size,
        blocks: size.div_ceil(BLOCK_SIZE),
        atime: SystemTime::UNIX_EPOCH,
        mtime: SystemTime::UNIX_EPOCH,
        ctime: SystemTime::UNIX_EPOCH,
        crtime: SystemTime::UNIX_EPOCH,
        kind,
        perm: (mode & 0o7777) as u16,
        nlink: if kind == FileType::Directory { 2 } else { 1 },
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: BLOCK_SIZE as u32,
        flags: 0,
    }
}

/// Attributes of the synthesized root directory. The root exists by virtue
/// of the mountpoint and never goes over the wire.
pub(crate) fn root_attr() -> FileAttr {
    file_attr(ROOT_INODE, FileType::Directory, 0o755, 0)
}

/// Parse a `getattr` reply (`{mode, type, size?}`) into attributes for
/// `inode`.
pub(crate) fn parse_attr(value: &Value, inode: u64) -> Result<FileAttr, RpcError> {
    let mode = value
        .get("mode")
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcError::bad_format("mode is missing or not an integer"))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .and_then(parse_kind)
        .ok_or_else(|| RpcError::bad_format("type is missing or unknown"))?;
    let size = value.get("size").and_then(Value::as_u64).unwrap_or(0);
    Ok(file_attr(inode, kind, mode as u32, size))
}

/// Parse a `lookup` reply (`{inode, mode, type, size?}`).
pub(crate) fn parse_entry(value: &Value) -> Result<FileAttr, RpcError> {
    let inode = value
        .get("inode")
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcError::bad_format("inode is missing or not an integer"))?;
    parse_attr(value, inode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_file_entry() {
        let attr = parse_entry(&json!({
            "inode": 2, "mode": 420, "type": "file", "size": 1
        }))
        .unwrap();
        assert_eq!(attr.ino, INodeNo(2));
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o644);
        assert_eq!(attr.size, 1);
        assert_eq!(attr.nlink, 1);
    }

    #[test]
    fn parses_directory_and_link_kinds() {
        let dir = parse_attr(&json!({"mode": 493, "type": "dir"}), 5).unwrap();
        assert_eq!(dir.kind, FileType::Directory);
        assert_eq!(dir.perm, 0o755);
        assert_eq!(dir.nlink, 2);

        let link = parse_attr(&json!({"mode": 511, "type": "link"}), 6).unwrap();
        assert_eq!(link.kind, FileType::Symlink);
    }

    #[test]
    fn size_defaults_to_zero() {
        let attr = parse_attr(&json!({"mode": 420, "type": "file"}), 2).unwrap();
        assert_eq!(attr.size, 0);
        assert_eq!(attr.blocks, 0);
    }

    #[test]
    fn rejects_missing_or_unknown_fields() {
        assert!(parse_attr(&json!({"type": "file"}), 2).is_err());
        assert!(parse_attr(&json!({"mode": 420}), 2).is_err());
        assert!(parse_attr(&json!({"mode": 420, "type": "socket"}), 2).is_err());
        assert!(parse_entry(&json!({"mode": 420, "type": "file"})).is_err());
        assert!(parse_entry(&json!("not an object")).is_err());
    }

    #[test]
    fn root_is_a_directory_with_0755() {
        let root = root_attr();
        assert_eq!(root.ino, INodeNo(ROOT_INODE));
        assert_eq!(root.kind, FileType::Directory);
        assert_eq!(root.perm, 0o755);
    }
}
