//! JSON-RPC server dispatcher.
//!
//! Routes inbound requests to registered methods and constructs the reply
//! frame. A request is well-formed when the top-level value is an object
//! with a string `method`, an array `params` (possibly empty) and an
//! integer `id`; a request without an `id` member is a notification and
//! produces no reply.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::RpcError;

/// A registered JSON-RPC method.
///
/// Returning from [`Method::invoke`] is the reply; the dispatcher
/// serializes it exactly once per request. Handlers are free to complete
/// in any order relative to each other.
#[async_trait]
pub trait Method: Send + Sync {
    /// Handle one invocation with the request's `params` array.
    async fn invoke(&self, params: &[Value]) -> Result<Value, RpcError>;
}

/// Routes inbound JSON-RPC requests to named handlers.
#[derive(Default)]
pub struct Dispatcher {
    methods: HashMap<String, Arc<dyn Method>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `method` under `name`, replacing any previous handler.
    pub fn register(&mut self, name: impl Into<String>, method: Arc<dyn Method>) {
        self.methods.insert(name.into(), method);
    }

    /// Dispatch one parsed request.
    ///
    /// Returns the serialized reply frame, or `None` for notifications.
    pub async fn dispatch(&self, message: &Value) -> Option<String> {
        let Some(object) = message.as_object() else {
            return Some(error_frame(
                &RpcError::invalid_request("request is not an object"),
                None,
            ));
        };

        let id = match object.get("id") {
            None => None,
            Some(id) => match id.as_u64() {
                Some(id) => Some(id),
                None => {
                    return Some(error_frame(
                        &RpcError::invalid_request("request id is not an integer"),
                        None,
                    ));
                }
            },
        };

        let Some(method_name) = object.get("method").and_then(Value::as_str) else {
            return Some(error_frame(
                &RpcError::invalid_request("request method is missing or not a string"),
                id,
            ));
        };
        let Some(params) = object.get("params").and_then(Value::as_array) else {
            return Some(error_frame(
                &RpcError::invalid_request("request params is missing or not an array"),
                id,
            ));
        };

        let Some(method) = self.methods.get(method_name) else {
            warn!(method = method_name, "unknown method");
            return id.map(|id| error_frame(&RpcError::method_not_found(method_name), Some(id)));
        };

        debug!(method = method_name, id, "dispatching request");
        let outcome = method.invoke(params).await;
        let id = id?;
        Some(match outcome {
            Ok(result) => json!({"result": result, "id": id}).to_string(),
            Err(error) => error_frame(&error, Some(id)),
        })
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn error_frame(error: &RpcError, id: Option<u64>) -> String {
    json!({"error": error, "id": id}).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo;

    #[async_trait]
    impl Method for Echo {
        async fn invoke(&self, params: &[Value]) -> Result<Value, RpcError> {
            Ok(json!(params))
        }
    }

    struct Failing;

    #[async_trait]
    impl Method for Failing {
        async fn invoke(&self, _params: &[Value]) -> Result<Value, RpcError> {
            Err(RpcError::invalid_params("nope"))
        }
    }

    struct Counting(AtomicUsize);

    #[async_trait]
    impl Method for Counting {
        async fn invoke(&self, _params: &[Value]) -> Result<Value, RpcError> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(json!({}))
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("echo", Arc::new(Echo));
        dispatcher.register("failing", Arc::new(Failing));
        dispatcher
    }

    async fn dispatch(dispatcher: &Dispatcher, frame: &str) -> Value {
        let message: Value = serde_json::from_str(frame).unwrap();
        let reply = dispatcher.dispatch(&message).await.unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    #[tokio::test]
    async fn dispatches_to_registered_method() {
        let reply = dispatch(
            &dispatcher(),
            "{\"method\": \"echo\", \"params\": [1, \"two\"], \"id\": 7}",
        )
        .await;
        assert_eq!(reply["result"], json!([1, "two"]));
        assert_eq!(reply["id"], 7);
    }

    #[tokio::test]
    async fn handler_error_becomes_error_reply() {
        let reply = dispatch(
            &dispatcher(),
            "{\"method\": \"failing\", \"params\": [], \"id\": 8}",
        )
        .await;
        assert_eq!(reply["error"]["code"], ErrorCode::InvalidParams.code());
        assert_eq!(reply["id"], 8);
    }

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let reply = dispatch(
            &dispatcher(),
            "{\"method\": \"no_such_method\", \"params\": [], \"id\": 9}",
        )
        .await;
        assert_eq!(reply["error"]["code"], ErrorCode::MethodNotFound.code());
        assert_eq!(reply["id"], 9);
    }

    #[tokio::test]
    async fn malformed_requests_yield_invalid_request() {
        for frame in [
            "[]",
            "{\"params\": [], \"id\": 1}",
            "{\"method\": 42, \"params\": [], \"id\": 1}",
            "{\"method\": \"echo\", \"id\": 1}",
            "{\"method\": \"echo\", \"params\": {}, \"id\": 1}",
        ] {
            let reply = dispatch(&dispatcher(), frame).await;
            assert_eq!(
                reply["error"]["code"],
                ErrorCode::InvalidRequest.code(),
                "frame: {frame}"
            );
        }
    }

    #[tokio::test]
    async fn malformed_id_is_reported_with_null_id() {
        let reply = dispatch(
            &dispatcher(),
            "{\"method\": \"echo\", \"params\": [], \"id\": \"abc\"}",
        )
        .await;
        assert_eq!(reply["error"]["code"], ErrorCode::InvalidRequest.code());
        assert_eq!(reply["id"], Value::Null);
    }

    #[tokio::test]
    async fn notifications_run_without_reply() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("tick", counter.clone());

        let message: Value =
            serde_json::from_str("{\"method\": \"tick\", \"params\": []}").unwrap();
        assert!(dispatcher.dispatch(&message).await.is_none());
        assert_eq!(counter.0.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn unknown_notification_is_silent() {
        let message: Value =
            serde_json::from_str("{\"method\": \"no_such_method\", \"params\": []}").unwrap();
        assert!(dispatcher().dispatch(&message).await.is_none());
    }
}
