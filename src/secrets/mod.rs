//! # Secret Resolver (C2)
//!
//! Turns an orchestrator secret reference into the Envoy SDS `Secret`
//! message the snapshot cache's secrets slot serves. The only supported
//! secret shape is a TLS certificate/key pair; anything else is a
//! user-data fault the caller should taint the revision with.

mod resolver;

pub use resolver::resolve;
