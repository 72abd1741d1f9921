//! Core engine for organizational hierarchies.
//! This crate is the single source of truth for tree invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, TreeConfig, DEFAULT_PALETTE, NEUTRAL_COLOR};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::node::{Node, NodeId, NodeKind, OrganizationId, TreeNode};
pub use repo::node_repo::{
    NodeChanges, NodeDraft, NodeRepoError, NodeRepoResult, NodeRepository, SqliteNodeRepository,
};
pub use service::cycle::would_create_cycle;
pub use service::org_tree_service::{
    parse_node_id, NewNode, NodeUpdate, OrgTreeError, OrgTreeService,
};
pub use service::palette::ColorAllocator;
pub use service::tree_builder::{assemble_tree, build_subtree};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
