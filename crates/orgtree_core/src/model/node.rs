//! Node domain model.
//!
//! # Invariants
//! - `kind` never changes after creation.
//! - `parent_uuid` is `None` exactly when `kind == NodeKind::Organization`.
//! - `deleted_at` is the soft-delete tombstone; live nodes have `None`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a tree node.
pub type NodeId = Uuid;

/// Stable identifier for an organization. Equal to its root node's id.
pub type OrganizationId = Uuid;

/// Role of a node in the hierarchy. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Tree root. One per organization, never parented.
    Organization,
    Location,
    Department,
    Employee,
}

impl NodeKind {
    /// Storage token for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Location => "location",
            Self::Department => "department",
            Self::Employee => "employee",
        }
    }

    /// Parses a storage token. Accepts any ASCII case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "organization" => Some(Self::Organization),
            "location" => Some(Self::Location),
            "department" => Some(Self::Department),
            "employee" => Some(Self::Employee),
            _ => None,
        }
    }

    /// Whether children of this kind inherit its color.
    ///
    /// Only locations and departments act as color groups.
    pub fn is_color_group(self) -> bool {
        matches!(self, Self::Location | Self::Department)
    }
}

/// Persisted tree vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub node_uuid: NodeId,
    /// Organization this node was created under.
    pub organization_uuid: OrganizationId,
    pub kind: NodeKind,
    /// `None` only for the organization root.
    pub parent_uuid: Option<NodeId>,
    pub display_name: String,
    /// Hex `#rrggbb` token or a lowercase color name.
    pub color: String,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
    /// Epoch ms soft-delete timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

impl Node {
    /// Whether this node is an organization root.
    pub fn is_root(&self) -> bool {
        self.kind == NodeKind::Organization
    }
}

/// Materialized snapshot of a node and all of its descendants.
///
/// Children keep store order (creation order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub node: Node,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Creates a leaf snapshot.
    pub fn leaf(node: Node) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this snapshot, root included.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(current) = stack.pop() {
            count += 1;
            stack.extend(current.children.iter());
        }
        count
    }

    /// Finds a node in this snapshot by id.
    pub fn find(&self, node_uuid: NodeId) -> Option<&TreeNode> {
        let mut stack = vec![self];
        while let Some(current) = stack.pop() {
            if current.node.node_uuid == node_uuid {
                return Some(current);
            }
            stack.extend(current.children.iter());
        }
        None
    }

    /// Ids of every descendant in pre-order, root excluded.
    pub fn descendant_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        let mut stack: Vec<&TreeNode> = self.children.iter().rev().collect();
        while let Some(current) = stack.pop() {
            ids.push(current.node.node_uuid);
            stack.extend(current.children.iter().rev());
        }
        ids
    }
}
