//! Socket-level integration tests: a real server driven by a provider
//! client over TCP.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use webfuse_fs::FilesystemBridge;
use webfuse_jsonrpc::{ErrorCode, RpcError};
use webfuse_server::{
    ADAPTER_SERVER_PROTOCOL, Authenticator, Mountpoint, MountpointFactory, Principal, Server,
    ServerConfig,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct DirectoryFactory {
    base: PathBuf,
}

impl MountpointFactory for DirectoryFactory {
    fn create_mountpoint(&self, filesystem: &str, _bridge: FilesystemBridge) -> Option<Mountpoint> {
        let path = self.base.join(filesystem);
        std::fs::create_dir_all(&path).ok()?;
        Some(Mountpoint::new(path).remove_on_drop())
    }
}

struct PasswordAuthenticator;

#[async_trait]
impl Authenticator for PasswordAuthenticator {
    async fn verify(&self, credentials: &Value) -> Result<Principal, RpcError> {
        let username = credentials.get("username").and_then(Value::as_str);
        let password = credentials.get("password").and_then(Value::as_str);
        match (username, password) {
            (Some("bob"), Some("secret")) => Ok(Principal::User("bob".into())),
            _ => Err(RpcError::bad("invalid credentials")),
        }
    }
}

async fn start_server(base: &Path) -> SocketAddr {
    let config = ServerConfig::builder()
        .port(0)
        .mountpoint_factory(Arc::new(DirectoryFactory {
            base: base.to_path_buf(),
        }))
        .authenticator("username", Arc::new(PasswordAuthenticator))
        .build()
        .unwrap();
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn connect(addr: SocketAddr) -> Client {
    let mut request = format!("ws://{addr}/").into_client_request().unwrap();
    request.headers_mut().insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static(ADAPTER_SERVER_PROTOCOL),
    );
    let (client, response) = connect_async(request).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok()),
        Some(ADAPTER_SERVER_PROTOCOL),
    );
    client
}

async fn invoke(client: &mut Client, frame: &str) -> Value {
    client.send(Message::text(frame)).await.unwrap();
    loop {
        match client.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            _ => continue,
        }
    }
}

#[tokio::test]
async fn connect_and_disconnect() {
    let base = TempDir::new().unwrap();
    let addr = start_server(base.path()).await;

    let mut client = connect(addr).await;
    client.close(None).await.unwrap();
}

#[tokio::test]
async fn add_filesystem_happy_path() {
    let base = TempDir::new().unwrap();
    let addr = start_server(base.path()).await;
    let mut client = connect(addr).await;

    let reply = invoke(
        &mut client,
        "{\"method\": \"add_filesystem\", \"params\": [\"test\"], \"id\": 42}",
    )
    .await;
    assert_eq!(reply["result"]["id"], "test");
    assert_eq!(reply["id"], 42);
    assert!(base.path().join("test").is_dir());
}

#[tokio::test]
async fn add_filesystem_missing_param() {
    let base = TempDir::new().unwrap();
    let addr = start_server(base.path()).await;
    let mut client = connect(addr).await;

    let reply = invoke(
        &mut client,
        "{\"method\": \"add_filesystem\", \"params\": [], \"id\": 42}",
    )
    .await;
    assert_eq!(reply["error"]["code"], ErrorCode::InvalidParams.code());
    assert_eq!(reply["id"], 42);
}

#[tokio::test]
async fn add_filesystem_invalid_name() {
    let base = TempDir::new().unwrap();
    let addr = start_server(base.path()).await;
    let mut client = connect(addr).await;

    let reply = invoke(
        &mut client,
        "{\"method\": \"add_filesystem\", \"params\": [\"invalid_1/name\"], \"id\": 42}",
    )
    .await;
    assert_eq!(reply["error"]["code"], ErrorCode::InvalidParams.code());
    assert_eq!(reply["id"], 42);
    assert!(!base.path().join("invalid_1").exists());
}

#[tokio::test]
async fn authenticate_round_trip() {
    let base = TempDir::new().unwrap();
    let addr = start_server(base.path()).await;
    let mut client = connect(addr).await;

    let reply = invoke(
        &mut client,
        "{\"method\": \"authenticate\", \"params\": [\"username\", \
         {\"username\": \"bob\", \"password\": \"secret\"}], \"id\": 42}",
    )
    .await;
    assert!(reply["result"].is_object());
    assert_eq!(reply["id"], 42);

    let reply = invoke(
        &mut client,
        "{\"method\": \"authenticate\", \"params\": [\"username\", \
         {\"username\": \"bob\", \"password\": \"wrong\"}], \"id\": 43}",
    )
    .await;
    assert_eq!(reply["error"]["code"], ErrorCode::Bad.code());
    assert_eq!(reply["id"], 43);
}

#[tokio::test]
async fn unknown_method_is_reported() {
    let base = TempDir::new().unwrap();
    let addr = start_server(base.path()).await;
    let mut client = connect(addr).await;

    let reply = invoke(
        &mut client,
        "{\"method\": \"remove_filesystem\", \"params\": [\"test\"], \"id\": 9}",
    )
    .await;
    assert_eq!(reply["error"]["code"], ErrorCode::MethodNotFound.code());
    assert_eq!(reply["id"], 9);
}

#[tokio::test]
async fn disconnect_tears_down_mountpoints() {
    let base = TempDir::new().unwrap();
    let addr = start_server(base.path()).await;
    let mut client = connect(addr).await;

    invoke(
        &mut client,
        "{\"method\": \"add_filesystem\", \"params\": [\"test\"], \"id\": 1}",
    )
    .await;
    assert!(base.path().join("test").is_dir());

    client.close(None).await.unwrap();
    for _ in 0..50 {
        if !base.path().join("test").exists() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("mount directory survived disconnect");
}
