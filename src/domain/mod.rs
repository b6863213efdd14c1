//! # Domain Layer
//!
//! Pure domain entities for the revision reconciliation engine: zero
//! infrastructure dependencies, fully testable without mocks.
//!
//! - `id`: opaque string identifiers (`NodeId`, `NamespacedName`, ...)
//! - `resources`: the closed set of xDS resource families and the textual
//!   resource bundle a revision carries before decoding
//! - `condition`: revision status conditions
//! - `secret`: orchestrator secret objects and TLS key material
//! - `revision`: the `EnvoyConfigRevision` domain object

pub mod condition;
pub mod id;
pub mod resources;
pub mod revision;
pub mod secret;

pub use condition::{Condition, ConditionType, RevisionStatus};
pub use id::{Name, NamespacedName, Namespace, NodeId};
pub use resources::{
    EnvoyResources, ResourceEntry, ResourceFamily, SecretEntry, SecretRef, Serialization,
    FAMILY_ORDER,
};
pub use revision::{Revision, RevisionSpec};
pub use secret::{SecretObject, SecretType, TlsPair};
