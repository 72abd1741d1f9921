//! Domain model for the organizational hierarchy.
//!
//! # Responsibility
//! - Define the node record stored by the engine and the tree snapshot
//!   returned by read paths.
//!
//! # Invariants
//! - Every node is identified by a stable `NodeId`.
//! - An organization root shares its id with its organization identity.

pub mod node;
