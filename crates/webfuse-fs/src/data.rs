//! Read-payload decoding.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;

use webfuse_jsonrpc::RpcError;

/// Decode a `read` reply (`{data, format, count}`) into raw bytes.
///
/// `format` selects the byte encoding of `data`: `"identity"` takes the
/// JSON string's bytes as they are, `"base64"` decodes them. `count` caps
/// the result and must not exceed the decoded length.
pub(crate) fn decode_read_payload(value: &Value) -> Result<Vec<u8>, RpcError> {
    let data = value
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::bad_format("data is missing or not a string"))?;
    let format = value
        .get("format")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::bad_format("format is missing or not a string"))?;
    let count = value
        .get("count")
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcError::bad_format("count is missing or not an integer"))?
        as usize;

    let mut bytes = match format {
        "identity" => data.as_bytes().to_vec(),
        "base64" => BASE64
            .decode(data)
            .map_err(|err| RpcError::bad_format(format!("invalid base64 payload: {err}")))?,
        other => {
            return Err(RpcError::bad_format(format!(
                "unknown payload format: {other}"
            )));
        }
    };
    if count > bytes.len() {
        return Err(RpcError::bad_format("count exceeds payload length"));
    }
    bytes.truncate(count);
    Ok(bytes)
}
