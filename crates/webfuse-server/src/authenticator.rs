//! Pluggable credential verification.
//!
//! Providers may present credentials through the `authenticate` method.
//! Verification is delegated to schemes registered at startup; no scheme
//! is built in.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use webfuse_jsonrpc::RpcError;

/// The identity a session acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// No credential has been accepted yet.
    Anonymous,
    /// A verified user.
    User(String),
}

impl Principal {
    /// Whether this session has not authenticated.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::User(name) => f.write_str(name),
        }
    }
}

/// Verifies credentials for one authentication scheme.
///
/// Verifiers are pure with respect to session state; the session records
/// the returned principal only on success.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify `credentials`, returning the authenticated principal.
    async fn verify(&self, credentials: &Value) -> Result<Principal, RpcError>;
}

/// Scheme-keyed registry of authenticators.
#[derive(Default, Clone)]
pub struct AuthenticatorRegistry {
    schemes: HashMap<String, Arc<dyn Authenticator>>,
}

impl AuthenticatorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `authenticator` under `scheme`, replacing any previous one.
    pub fn register(&mut self, scheme: impl Into<String>, authenticator: Arc<dyn Authenticator>) {
        self.schemes.insert(scheme.into(), authenticator);
    }

    /// Look up the authenticator for `scheme`.
    #[must_use]
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn Authenticator>> {
        self.schemes.get(scheme).cloned()
    }

    /// The registered scheme names.
    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.schemes.keys().map(String::as_str)
    }
}

impl fmt::Debug for AuthenticatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatorRegistry")
            .field("schemes", &self.schemes.keys().collect::<Vec<_>>())
            .finish()
    }
}
