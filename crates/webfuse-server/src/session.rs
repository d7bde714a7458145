//! Per-connection session state and frame routing.
//!
//! One session per accepted connection. The session owns the connection's
//! JSON-RPC proxy, the authenticated principal and the mounted
//! filesystems, and drives all I/O from a single `select!` loop: outbound
//! frames (proxy requests and dispatcher replies) drain through one queue,
//! inbound frames route by shape. A frame with a `method` member is a
//! provider request for the dispatcher; everything else is a response for
//! the proxy.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt as _, StreamExt as _};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use webfuse_fs::FilesystemBridge;
use webfuse_jsonrpc::{Dispatcher, ErrorCode, Method, Proxy, RpcError};

use crate::authenticator::{AuthenticatorRegistry, Principal};
use crate::mountpoint::{Mountpoint, MountpointFactory};

/// Outbound frames queued per connection before the socket drains them.
/// Senders await free capacity, which is the backpressure on issuers.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Shared per-connection state.
pub(crate) struct Session {
    proxy: Arc<Proxy>,
    principal: Mutex<Principal>,
    mountpoints: Mutex<HashMap<String, Mountpoint>>,
    factory: Arc<dyn MountpointFactory>,
    authenticators: Arc<AuthenticatorRegistry>,
}

impl Session {
    fn new(
        proxy: Arc<Proxy>,
        factory: Arc<dyn MountpointFactory>,
        authenticators: Arc<AuthenticatorRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            proxy,
            principal: Mutex::new(Principal::Anonymous),
            mountpoints: Mutex::new(HashMap::new()),
            factory,
            authenticators,
        })
    }

    fn dispatcher(self: &Arc<Self>) -> Arc<Dispatcher> {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(
            "add_filesystem",
            Arc::new(AddFilesystem {
                session: Arc::clone(self),
            }),
        );
        dispatcher.register(
            "authenticate",
            Arc::new(Authenticate {
                session: Arc::clone(self),
            }),
        );
        Arc::new(dispatcher)
    }
}

/// Drive one accepted connection until it closes, then tear down.
pub(crate) async fn run<S>(
    mut stream: WebSocketStream<S>,
    factory: Arc<dyn MountpointFactory>,
    authenticators: Arc<AuthenticatorRegistry>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (frames_tx, mut frames_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_DEPTH);
    let proxy = Arc::new(Proxy::new(frames_tx.clone()));
    let session = Session::new(Arc::clone(&proxy), factory, authenticators);
    let dispatcher = session.dispatcher();

    loop {
        tokio::select! {
            frame = frames_rx.recv() => {
                // The session itself holds a sender, so recv cannot yield None.
                let Some(frame) = frame else { break };
                if let Err(err) = stream.send(Message::text(frame)).await {
                    warn!(%err, "failed to send frame");
                    break;
                }
            }
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    route_frame(text.as_str(), &session, &dispatcher, &frames_tx);
                }
                Some(Ok(Message::Ping(payload))) => {
                    if stream.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // binary and pong frames are ignored
                Some(Err(err)) => {
                    warn!(%err, "websocket error");
                    break;
                }
            }
        }
    }

    teardown(&session).await;
}

/// Route one inbound text frame.
fn route_frame(
    text: &str,
    session: &Arc<Session>,
    dispatcher: &Arc<Dispatcher>,
    frames_tx: &mpsc::Sender<String>,
) {
    let message: Value = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            debug!(%err, "discarding unparseable frame");
            return;
        }
    };
    if message.get("method").is_some() {
        // Requests are dispatched in arrival order, each on its own task,
        // so replies may interleave.
        let dispatcher = Arc::clone(dispatcher);
        let frames_tx = frames_tx.clone();
        tokio::spawn(async move {
            if let Some(reply) = dispatcher.dispatch(&message).await {
                let _ = frames_tx.send(reply).await;
            }
        });
    } else {
        session.proxy.handle_response_value(&message);
    }
}

/// Fail pending calls, then unmount and remove every filesystem.
async fn teardown(session: &Arc<Session>) {
    session.proxy.shut_down(ErrorCode::ConnectionClosed);
    let principal = session.principal.lock().clone();
    let mountpoints: Vec<Mountpoint> = {
        let mut map = session.mountpoints.lock();
        map.drain().map(|(_, mountpoint)| mountpoint).collect()
    };
    if mountpoints.is_empty() {
        debug!(%principal, "session closed");
        return;
    }
    debug!(%principal, count = mountpoints.len(), "unmounting session filesystems");
    // Unmounting joins the kernel session thread; keep it off the runtime.
    let _ = tokio::task::spawn_blocking(move || drop(mountpoints)).await;
}

/// Filesystem names are a single path component: `[A-Za-z0-9_.-]+`, with
/// path traversal (`.`, `..`) rejected outright.
pub(crate) fn is_valid_filesystem_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

struct AddFilesystem {
    session: Arc<Session>,
}

#[async_trait]
impl Method for AddFilesystem {
    async fn invoke(&self, params: &[Value]) -> Result<Value, RpcError> {
        let [name] = params else {
            return Err(RpcError::invalid_params("add_filesystem expects [name]"));
        };
        let name = name
            .as_str()
            .ok_or_else(|| RpcError::invalid_params("filesystem name must be a string"))?;
        if !is_valid_filesystem_name(name) {
            return Err(RpcError::invalid_params(format!(
                "invalid filesystem name: {name:?}"
            )));
        }
        if self.session.mountpoints.lock().contains_key(name) {
            return Err(RpcError::invalid_params(format!(
                "filesystem already mounted: {name}"
            )));
        }

        let bridge =
            FilesystemBridge::new(name, Arc::clone(&self.session.proxy), Handle::current());
        let factory = Arc::clone(&self.session.factory);
        let filesystem = name.to_owned();
        // Mounting is blocking work (directory creation, kernel handshake).
        let mountpoint =
            tokio::task::spawn_blocking(move || factory.create_mountpoint(&filesystem, bridge))
                .await
                .map_err(|_| RpcError::bad("mountpoint factory panicked"))?
                .ok_or_else(|| RpcError::bad(format!("unable to mount filesystem: {name}")))?;

        info!(filesystem = name, path = %mountpoint.path().display(), "filesystem mounted");
        match self.session.mountpoints.lock().entry(name.to_owned()) {
            Entry::Occupied(_) => {
                // Lost a race against a concurrent add of the same name;
                // the fresh mountpoint unmounts on drop.
                Err(RpcError::invalid_params(format!(
                    "filesystem already mounted: {name}"
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(mountpoint);
                Ok(json!({"id": name}))
            }
        }
    }
}

struct Authenticate {
    session: Arc<Session>,
}

#[async_trait]
impl Method for Authenticate {
    async fn invoke(&self, params: &[Value]) -> Result<Value, RpcError> {
        let [scheme, credentials] = params else {
            return Err(RpcError::invalid_params(
                "authenticate expects [scheme, credentials]",
            ));
        };
        let scheme = scheme
            .as_str()
            .ok_or_else(|| RpcError::invalid_params("scheme must be a string"))?;
        if !credentials.is_object() {
            return Err(RpcError::invalid_params("credentials must be an object"));
        }
        let authenticator = self
            .session
            .authenticators
            .get(scheme)
            .ok_or_else(|| RpcError::bad(format!("unknown authentication scheme: {scheme}")))?;

        let principal = authenticator.verify(credentials).await?;
        info!(scheme, %principal, "session authenticated");
        *self.session.principal.lock() = principal;
        Ok(json!({}))
    }
}
