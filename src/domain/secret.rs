//! Orchestrator secret objects and the TLS key material they carry.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::domain::id::{Name, Namespace};

/// The type an orchestrator secret object declares. Only [`SecretType::TlsPair`]
/// is accepted by the secret resolver; any other type is a user-data fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretType {
    TlsPair,
    Opaque,
}

impl SecretType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretType::TlsPair => "tls-pair",
            SecretType::Opaque => "opaque",
        }
    }
}

/// PEM-encoded TLS certificate and private key. Zeroized on drop so a
/// resolve failure never leaves key material behind in freed memory.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TlsPair {
    pub cert_pem: String,
    pub key_pem: String,
}

impl std::fmt::Debug for TlsPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsPair").field("cert_pem", &"[redacted]").field("key_pem", &"[redacted]").finish()
    }
}

/// An orchestrator secret object as returned by `SecretStore::get`.
#[derive(Debug, Clone)]
pub struct SecretObject {
    pub namespace: Namespace,
    pub name: Name,
    pub secret_type: SecretType,
    pub tls: Option<TlsPair>,
}
