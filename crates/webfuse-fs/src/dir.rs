//! Directory listing marshaling.

use serde_json::Value;

use webfuse_jsonrpc::RpcError;

/// One remote directory entry.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct DirEntry {
    pub(crate) name: String,
    pub(crate) inode: u64,
}

/// Parse a `readdir` reply: an array of `{name, inode}` objects.
pub(crate) fn parse_dir_entries(value: &Value) -> Result<Vec<DirEntry>, RpcError> {
    let items = value
        .as_array()
        .ok_or_else(|| RpcError::bad_format("readdir reply is not an array"))?;
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let name = item
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::bad_format("entry name is missing or not a string"))?;
        let inode = item
            .get("inode")
            .and_then(Value::as_u64)
            .ok_or_else(|| RpcError::bad_format("entry inode is missing or not an integer"))?;
        entries.push(DirEntry {
            name: name.to_owned(),
            inode,
        });
    }
    Ok(entries)
}
