//! Response parsing and serialization.
//!
//! A reply is well-formed when the top-level value is an object, `id` is an
//! integer, and exactly one of `result`/`error` is present. Replies whose id
//! cannot be recovered are unparseable (the proxy discards them); replies
//! with a usable id but a broken body complete the matching request with
//! [`ErrorCode::BadFormat`](crate::ErrorCode::BadFormat).

use serde_json::{Value, json};

use crate::error::RpcError;

/// A parsed JSON-RPC response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// The id of the request this reply answers.
    pub id: u64,
    /// The remote outcome: `result` on success, the error object otherwise.
    pub outcome: Result<Value, RpcError>,
}

impl Response {
    /// Parse a response from a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] with `BAD_FORMAT` when no integer `id` can be
    /// recovered; such frames correlate with nothing and must be dropped.
    pub fn parse(payload: &str) -> Result<Self, RpcError> {
        let message: Value = serde_json::from_str(payload)
            .map_err(|err| RpcError::bad_format(format!("response is not valid JSON: {err}")))?;
        Self::from_value(&message)
    }

    /// Parse a response from an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Same contract as [`Response::parse`].
    pub fn from_value(message: &Value) -> Result<Self, RpcError> {
        let object = message
            .as_object()
            .ok_or_else(|| RpcError::bad_format("response is not an object"))?;
        let id = object
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| RpcError::bad_format("response id is missing or not an integer"))?;

        let outcome = match (object.get("result"), object.get("error")) {
            (Some(result), None) => Ok(result.clone()),
            (None, Some(error)) => Err(error_from_value(error)),
            (Some(_), Some(_)) => Err(RpcError::bad_format(
                "response carries both result and error",
            )),
            (None, None) => Err(RpcError::bad_format(
                "response carries neither result nor error",
            )),
        };

        Ok(Self { id, outcome })
    }

    /// The `result` member, if this is a success reply.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    /// The error, if this is an error reply.
    #[must_use]
    pub fn error(&self) -> Option<&RpcError> {
        self.outcome.as_ref().err()
    }

    /// Serialize back into a wire frame.
    #[must_use]
    pub fn to_frame(&self) -> String {
        match &self.outcome {
            Ok(result) => json!({"result": result, "id": self.id}),
            Err(error) => json!({"error": error, "id": self.id}),
        }
        .to_string()
    }
}

/// Convert a wire `error` member into [`RpcError`].
///
/// A numeric, non-zero `code` passes through unchanged; anything else is a
/// shape violation.
fn error_from_value(error: &Value) -> RpcError {
    match error.get("code").and_then(Value::as_i64) {
        Some(code) if code != 0 => RpcError {
            code,
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("remote error")
                .to_owned(),
            data: error.get("data").cloned(),
        },
        _ => RpcError::bad_format("error object carries no usable code"),
    }
}
