//! Persistence contracts and SQLite implementations.
//!
//! # Responsibility
//! - Define the node store contract consumed by the tree services.
//! - Keep SQL details out of the orchestration layer.
//!
//! # Invariants
//! - Repositories hold no business rules; hierarchy invariants are checked
//!   by services (the schema only backs them up).
//! - Semantic misses surface as `NodeNotFound`, transport failures as `Db`.

pub mod node_repo;
