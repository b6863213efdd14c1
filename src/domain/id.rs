//! Type-safe wrappers for opaque string identifiers.
//!
//! Unlike database-backed identifiers, these wrap orchestrator-assigned
//! strings (a node-id from an xDS `Node` message, a secret or revision name)
//! rather than generating UUIDs, so there is no `new()`/`parse()` validation
//! step here.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! text_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

text_id!(
    /// The `node_id` an Envoy data-plane instance presents in its xDS `Node` message.
    /// Shards the snapshot cache.
    NodeId
);

text_id!(
    /// A Kubernetes-style namespace for revision and secret objects.
    Namespace
);

text_id!(
    /// The bare name component of a namespaced object.
    Name
);

/// Uniquely identifies a revision (or secret) object within the orchestrator:
/// `(namespace, name)`. Used as the reconcile work queue's key type and as
/// the secret-reference index key in the secret-change watcher.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NamespacedName {
    pub namespace: Namespace,
    pub name: Name,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: Namespace::new(namespace), name: Name::new(name) }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
