//! Server configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::authenticator::{Authenticator, AuthenticatorRegistry};
use crate::error::ServerError;
use crate::mountpoint::MountpointFactory;

/// Default TCP listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default virtual host name.
pub const DEFAULT_VHOST_NAME: &str = "localhost";

/// TLS material locations. Constructing the pair keeps the
/// both-or-neither invariant; a config either has both paths or no TLS.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// PEM certificate chain path.
    pub cert_path: PathBuf,
    /// PEM private key path.
    pub key_path: PathBuf,
}

/// Server configuration.
///
/// Built through [`ServerConfig::builder`]; a mountpoint factory is the
/// only mandatory piece.
pub struct ServerConfig {
    /// TCP listen port; 0 binds an ephemeral port.
    pub port: u16,
    /// Virtual host name, used in accept-path diagnostics.
    pub vhost_name: String,
    /// Static HTTP root for the companion HTTP server. Recognized and
    /// carried here; serving it is the companion's concern.
    pub document_root: Option<PathBuf>,
    /// TLS material; `None` serves plain TCP.
    pub tls: Option<TlsConfig>,
    pub(crate) mountpoint_factory: Arc<dyn MountpointFactory>,
    pub(crate) authenticators: AuthenticatorRegistry,
}

impl ServerConfig {
    /// Start building a configuration.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("vhost_name", &self.vhost_name)
            .field("document_root", &self.document_root)
            .field("tls", &self.tls)
            .field("authenticators", &self.authenticators)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Default)]
pub struct ServerConfigBuilder {
    port: Option<u16>,
    vhost_name: Option<String>,
    document_root: Option<PathBuf>,
    tls: Option<TlsConfig>,
    mountpoint_factory: Option<Arc<dyn MountpointFactory>>,
    authenticators: AuthenticatorRegistry,
}

impl ServerConfigBuilder {
    /// Set the TCP listen port (0 binds an ephemeral port).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the virtual host name.
    #[must_use]
    pub fn vhost_name(mut self, name: impl Into<String>) -> Self {
        self.vhost_name = Some(name.into());
        self
    }

    /// Set the static HTTP root handed to the companion HTTP server.
    #[must_use]
    pub fn document_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.document_root = Some(root.into());
        self
    }

    /// Enable TLS with the given PEM certificate chain and private key.
    #[must_use]
    pub fn tls(mut self, cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        self.tls = Some(TlsConfig {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        });
        self
    }

    /// Set the mountpoint factory (required).
    #[must_use]
    pub fn mountpoint_factory(mut self, factory: Arc<dyn MountpointFactory>) -> Self {
        self.mountpoint_factory = Some(factory);
        self
    }

    /// Register an authentication scheme.
    #[must_use]
    pub fn authenticator(
        mut self,
        scheme: impl Into<String>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        self.authenticators.register(scheme, authenticator);
        self
    }

    /// Finish the configuration.
    ///
    /// # Errors
    ///
    /// [`ServerError::MissingMountpointFactory`] when no factory was set.
    pub fn build(self) -> Result<ServerConfig, ServerError> {
        let mountpoint_factory = self
            .mountpoint_factory
            .ok_or(ServerError::MissingMountpointFactory)?;
        Ok(ServerConfig {
            port: self.port.unwrap_or(DEFAULT_PORT),
            vhost_name: self
                .vhost_name
                .unwrap_or_else(|| DEFAULT_VHOST_NAME.to_owned()),
            document_root: self.document_root,
            tls: self.tls,
            mountpoint_factory,
            authenticators: self.authenticators,
        })
    }
}

impl fmt::Debug for ServerConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfigBuilder")
            .field("port", &self.port)
            .field("vhost_name", &self.vhost_name)
            .field("document_root", &self.document_root)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}
