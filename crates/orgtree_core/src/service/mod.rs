//! Org tree use-case services.
//!
//! # Responsibility
//! - Orchestrate node store calls into hierarchy-preserving operations.
//! - Keep callers decoupled from storage details.

pub mod cycle;
pub mod org_tree_service;
pub mod palette;
pub mod tree_builder;
