//! JSON-RPC client proxy.
//!
//! The proxy issues requests over a per-connection frame queue and
//! correlates responses back to their callers by numeric id. Every
//! invocation resolves exactly once: with the remote result, the remote
//! error, or one of `TIMEOUT`, `CONNECTION_CLOSED`, `PROXY_DISPOSED`.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::error::{ErrorCode, RpcError};
use crate::response::Response;

/// Default per-call deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Reserved id denoting "no id"; real requests start above it.
const NOTIFICATION_ID: u64 = 0;

const ACTIVE: u8 = 0;
const SHUTTING_DOWN: u8 = 1;
const DISPOSED: u8 = 2;

/// Bookkeeping for an issued request awaiting its reply.
///
/// Owned exclusively by the pending table; removed on response arrival,
/// timeout, or proxy shutdown, each path completing the channel once.
struct PendingRequest {
    method: String,
    completion: oneshot::Sender<Result<Value, RpcError>>,
}

/// The client side of the JSON-RPC correlation layer.
pub struct Proxy {
    outbound: mpsc::Sender<String>,
    pending: DashMap<u64, PendingRequest>,
    next_id: AtomicU64,
    timeout_ms: AtomicU64,
    state: AtomicU8,
}

impl Proxy {
    /// Create a proxy writing frames into `outbound`.
    ///
    /// The channel is the connection's frame queue; its bounded capacity is
    /// the backpressure limit for outstanding unsent requests.
    #[must_use]
    pub fn new(outbound: mpsc::Sender<String>) -> Self {
        Self {
            outbound,
            pending: DashMap::new(),
            next_id: AtomicU64::new(NOTIFICATION_ID + 1),
            timeout_ms: AtomicU64::new(DEFAULT_TIMEOUT.as_millis() as u64),
            state: AtomicU8::new(ACTIVE),
        }
    }

    /// Change the deadline applied to subsequent invocations.
    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    /// Issue a request and await its reply.
    ///
    /// # Errors
    ///
    /// The remote error verbatim, `TIMEOUT` when the deadline passes,
    /// `CONNECTION_CLOSED` when the frame queue is gone, or
    /// `PROXY_DISPOSED` (synchronously) when the proxy is shutting down.
    pub async fn invoke(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        if self.state.load(Ordering::Acquire) != ACTIVE {
            return Err(RpcError::proxy_disposed());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (completion, settled) = oneshot::channel();
        self.pending.insert(
            id,
            PendingRequest {
                method: method.to_owned(),
                completion,
            },
        );
        // A dispose racing the registration above may have drained the
        // table before the insert landed.
        if self.state.load(Ordering::Acquire) != ACTIVE {
            self.pending.remove(&id);
            return Err(RpcError::proxy_disposed());
        }

        let frame = json!({"method": method, "params": params, "id": id}).to_string();
        trace!(id, method, "queueing request");
        if self.outbound.send(frame).await.is_err() {
            self.pending.remove(&id);
            return Err(RpcError::connection_closed());
        }

        let deadline = Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed));
        match tokio::time::timeout(deadline, settled).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RpcError::proxy_disposed()),
            Err(_) => {
                self.pending.remove(&id);
                debug!(id, method, "request timed out");
                Err(RpcError::timeout())
            }
        }
    }

    /// Send an id-less notification frame; no reply will ever arrive.
    ///
    /// # Errors
    ///
    /// `CONNECTION_CLOSED` when the frame queue is gone, `PROXY_DISPOSED`
    /// when the proxy is shutting down.
    pub async fn notify(&self, method: &str, params: Vec<Value>) -> Result<(), RpcError> {
        if self.state.load(Ordering::Acquire) != ACTIVE {
            return Err(RpcError::proxy_disposed());
        }
        let frame = json!({"method": method, "params": params}).to_string();
        trace!(method, "queueing notification");
        self.outbound
            .send(frame)
            .await
            .map_err(|_| RpcError::connection_closed())
    }

    /// Feed one inbound text frame from the transport.
    ///
    /// Unparseable frames and ids matching no pending request (unknown or
    /// already expired) are discarded silently.
    pub fn handle_response(&self, payload: &str) {
        match serde_json::from_str::<Value>(payload) {
            Ok(message) => self.handle_response_value(&message),
            Err(err) => debug!(%err, "discarding unparseable response"),
        }
    }

    /// Feed one inbound frame that is already parsed.
    pub fn handle_response_value(&self, message: &Value) {
        let response = match Response::from_value(message) {
            Ok(response) => response,
            Err(err) => {
                debug!(%err, "discarding uncorrelatable response");
                return;
            }
        };
        match self.pending.remove(&response.id) {
            Some((_, request)) => {
                trace!(id = response.id, method = %request.method, "completing request");
                let _ = request.completion.send(response.outcome);
            }
            None => debug!(id = response.id, "response matches no pending request"),
        }
    }

    /// Number of requests awaiting a reply.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Fail all pending requests with `PROXY_DISPOSED` and refuse further
    /// invocations. Idempotent.
    pub fn dispose(&self) {
        self.shut_down(ErrorCode::ProxyDisposed);
    }

    /// Fail all pending requests with `code` and refuse further
    /// invocations. Sessions use `CONNECTION_CLOSED` on disconnect.
    pub fn shut_down(&self, code: ErrorCode) {
        if self.state.swap(SHUTTING_DOWN, Ordering::AcqRel) != ACTIVE {
            return;
        }
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, request)) = self.pending.remove(&id) {
                let _ = request.completion.send(Err(RpcError::from(code)));
            }
        }
        self.state.store(DISPOSED, Ordering::Release);
        debug!(code = code.code(), "proxy shut down");
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("pending", &self.pending.len())
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
