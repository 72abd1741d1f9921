//! Tree materialization for read paths.
//!
//! # Invariants
//! - One bulk store read per build; assembly happens in memory.
//! - Assembly is iterative, so deep trees cannot overflow the stack.
//! - Never writes.

use crate::model::node::{Node, NodeId, TreeNode};
use crate::repo::node_repo::{NodeRepoResult, NodeRepository};
use std::collections::HashMap;

/// Loads `root_uuid` and every live descendant as a snapshot.
///
/// Returns `None` when the root is missing or deleted.
pub fn build_subtree<R: NodeRepository>(
    repo: &R,
    root_uuid: NodeId,
) -> NodeRepoResult<Option<TreeNode>> {
    let nodes = repo.list_subtree(root_uuid)?;
    Ok(assemble_tree(root_uuid, nodes))
}

/// Assembles a flat node list into a tree rooted at `root_uuid`.
///
/// Children keep their relative order from `nodes`. Nodes not reachable
/// from the root are dropped.
pub fn assemble_tree(root_uuid: NodeId, nodes: Vec<Node>) -> Option<TreeNode> {
    let mut root = None;
    let mut by_parent: HashMap<NodeId, Vec<Node>> = HashMap::new();
    for node in nodes {
        if node.node_uuid == root_uuid {
            root = Some(node);
        } else if let Some(parent_uuid) = node.parent_uuid {
            by_parent.entry(parent_uuid).or_default().push(node);
        }
    }
    let root = root?;

    // Pre-order flattening: a child's slot is always greater than its parent's.
    let mut order: Vec<(Node, Option<usize>)> = Vec::new();
    let mut stack = vec![(root, None)];
    while let Some((node, parent_slot)) = stack.pop() {
        let slot = order.len();
        let children = by_parent.remove(&node.node_uuid).unwrap_or_default();
        order.push((node, parent_slot));
        stack.extend(children.into_iter().rev().map(|child| (child, Some(slot))));
    }

    let mut pending: Vec<Vec<TreeNode>> = order.iter().map(|_| Vec::new()).collect();
    let mut assembled = None;
    for (slot, (node, parent_slot)) in order.into_iter().enumerate().rev() {
        let mut children = std::mem::take(&mut pending[slot]);
        children.reverse();
        let tree = TreeNode { node, children };
        match parent_slot {
            Some(parent_slot) => pending[parent_slot].push(tree),
            None => assembled = Some(tree),
        }
    }
    assembled
}
