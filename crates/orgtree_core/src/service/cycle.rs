//! Ancestor-walk cycle detection.

use crate::model::node::NodeId;
use crate::repo::node_repo::{NodeRepoError, NodeRepoResult, NodeRepository};
use std::collections::HashSet;

/// Returns whether attaching `moving_uuid` under `candidate_parent_uuid`
/// would make the parent graph cyclic.
///
/// Walks `parent_uuid` links upward from the candidate parent until a root.
/// A revisited ancestor means the stored graph is already cyclic and is
/// reported as a cycle too.
///
/// # Errors
/// - `NodeNotFound` when an ancestor on the walk is missing or deleted.
pub fn would_create_cycle<R: NodeRepository>(
    repo: &R,
    candidate_parent_uuid: NodeId,
    moving_uuid: NodeId,
) -> NodeRepoResult<bool> {
    if candidate_parent_uuid == moving_uuid {
        return Ok(true);
    }

    let mut visited = HashSet::new();
    let mut cursor = Some(candidate_parent_uuid);
    while let Some(current) = cursor {
        if current == moving_uuid || !visited.insert(current) {
            return Ok(true);
        }
        let node = repo
            .get_node(current)?
            .ok_or(NodeRepoError::NodeNotFound(current))?;
        cursor = node.parent_uuid;
    }
    Ok(false)
}
