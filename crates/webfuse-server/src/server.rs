//! The accept loop.
//!
//! Binds the configured port, optionally wraps accepted sockets in TLS,
//! performs the WebSocket handshake with subprotocol selection and runs
//! one session task per connection. Transport errors stay local to the
//! affected session.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use rustls::pki_types::pem::PemObject as _;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tracing::{debug, info, warn};

use crate::authenticator::AuthenticatorRegistry;
use crate::config::{ServerConfig, TlsConfig};
use crate::error::ServerError;
use crate::mountpoint::MountpointFactory;
use crate::protocol::select_subprotocol;
use crate::session;

/// Accepts provider connections and runs one session per connection.
pub struct Server {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    vhost_name: String,
    factory: Arc<dyn MountpointFactory>,
    authenticators: Arc<AuthenticatorRegistry>,
}

impl Server {
    /// Bind the configured port.
    ///
    /// # Errors
    ///
    /// I/O errors from binding, or [`ServerError::Tls`] when the TLS
    /// material cannot be loaded.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = TcpListener::bind(addr).await?;
        let tls = config.tls.as_ref().map(build_tls_acceptor).transpose()?;
        info!(
            vhost = %config.vhost_name,
            addr = %listener.local_addr()?,
            tls = tls.is_some(),
            "server listening"
        );
        Ok(Self {
            listener,
            tls,
            vhost_name: config.vhost_name,
            factory: config.mountpoint_factory,
            authenticators: Arc::new(config.authenticators),
        })
    }

    /// The bound socket address (useful with port 0).
    ///
    /// # Errors
    ///
    /// Propagates the socket's `local_addr` failure.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the surrounding task is dropped.
    ///
    /// # Errors
    ///
    /// Only listener-level failures end the loop; per-connection errors
    /// are logged and the session discarded.
    pub async fn run(self) -> Result<(), ServerError> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!(%peer, vhost = %self.vhost_name, "connection accepted");
            let tls = self.tls.clone();
            let factory = Arc::clone(&self.factory);
            let authenticators = Arc::clone(&self.authenticators);
            tokio::spawn(async move {
                match tls {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(stream) => serve_connection(stream, factory, authenticators).await,
                        Err(err) => warn!(%peer, %err, "TLS handshake failed"),
                    },
                    None => serve_connection(stream, factory, authenticators).await,
                }
            });
        }
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("vhost_name", &self.vhost_name)
            .field("tls", &self.tls.is_some())
            .finish_non_exhaustive()
    }
}

async fn serve_connection<S>(
    stream: S,
    factory: Arc<dyn MountpointFactory>,
    authenticators: Arc<AuthenticatorRegistry>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let negotiate = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        let selected = request
            .headers()
            .get_all(SEC_WEBSOCKET_PROTOCOL)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(select_subprotocol);
        if let Some(selected) = selected {
            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(selected));
        }
        Ok(response)
    };
    match accept_hdr_async(stream, negotiate).await {
        Ok(stream) => session::run(stream, factory, authenticators).await,
        Err(err) => warn!(%err, "websocket handshake failed"),
    }
}

fn build_tls_acceptor(tls: &TlsConfig) -> Result<TlsAcceptor, ServerError> {
    let certs = CertificateDer::pem_file_iter(&tls.cert_path)
        .map_err(|err| ServerError::Tls(format!("cannot read {}: {err}", tls.cert_path.display())))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ServerError::Tls(format!("invalid certificate: {err}")))?;
    let key = PrivateKeyDer::from_pem_file(&tls.key_path)
        .map_err(|err| ServerError::Tls(format!("cannot read {}: {err}", tls.key_path.display())))?;
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| ServerError::Tls(err.to_string()))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}
