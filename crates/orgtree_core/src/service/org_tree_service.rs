//! Organization tree use-case service.
//!
//! # Responsibility
//! - Create, reparent, recolor, read and delete nodes of an organization tree.
//! - Run every structural mutation as one store transaction.
//!
//! # Invariants
//! - The parent graph stays acyclic: every reparent is cycle-checked inside
//!   the same write transaction that applies it.
//! - Organization roots never gain a parent and cannot be deleted here.
//! - A failed mutation leaves no partial writes behind.

use crate::config::{is_valid_color, ConfigError, TreeConfig};
use crate::model::node::{Node, NodeId, NodeKind, OrganizationId, TreeNode};
use crate::repo::node_repo::{NodeChanges, NodeDraft, NodeRepoError, NodeRepository};
use crate::service::cycle::would_create_cycle;
use crate::service::palette::ColorAllocator;
use crate::service::tree_builder::{assemble_tree, build_subtree};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

/// Errors from organization tree operations.
#[derive(Debug)]
pub enum OrgTreeError {
    /// Caller input rejected before touching the store.
    InvalidInput(String),
    /// Target node does not exist or is deleted.
    NodeNotFound(NodeId),
    /// Requested parent does not exist or is deleted.
    ParentNotFound(NodeId),
    /// Requested organization context does not exist.
    OrganizationNotFound(OrganizationId),
    /// Attaching `node_uuid` under `parent_uuid` would create a cycle.
    CycleDetected {
        node_uuid: NodeId,
        parent_uuid: NodeId,
    },
    /// Operation is not allowed for this node.
    InvalidOperation {
        node_uuid: NodeId,
        reason: &'static str,
    },
    /// Storage failure. Not retried here.
    Repo(NodeRepoError),
}

impl OrgTreeError {
    /// Stable machine-readable code for transport mapping.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "bad_request",
            Self::NodeNotFound(_) | Self::ParentNotFound(_) | Self::OrganizationNotFound(_) => {
                "not_found"
            }
            Self::CycleDetected { .. } => "cycle_detected",
            Self::InvalidOperation { .. } => "invalid_operation",
            Self::Repo(_) => "storage_error",
        }
    }

    /// Whether the caller can fix the request and retry.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Repo(_))
    }
}

impl Display for OrgTreeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::NodeNotFound(id) => write!(f, "org node not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "parent node not found: {id}"),
            Self::OrganizationNotFound(id) => write!(f, "organization not found: {id}"),
            Self::CycleDetected {
                node_uuid,
                parent_uuid,
            } => write!(
                f,
                "attaching node {node_uuid} under {parent_uuid} would create a cycle"
            ),
            Self::InvalidOperation { node_uuid, reason } => {
                write!(f, "invalid operation on node {node_uuid}: {reason}")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for OrgTreeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NodeRepoError> for OrgTreeError {
    fn from(value: NodeRepoError) -> Self {
        match value {
            NodeRepoError::NodeNotFound(node_uuid) => Self::NodeNotFound(node_uuid),
            other => Self::Repo(other),
        }
    }
}

/// Create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNode {
    pub display_name: String,
    /// Honored for organizations and for employees without a color group parent.
    pub color: Option<String>,
    /// Required for every kind except `Organization`, which must omit it.
    pub parent_uuid: Option<NodeId>,
    pub kind: NodeKind,
    /// Organization to attribute the node to. Defaults to the parent's.
    pub organization_uuid: Option<OrganizationId>,
}

impl NewNode {
    /// Request for a new organization root.
    pub fn organization(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            color: None,
            parent_uuid: None,
            kind: NodeKind::Organization,
            organization_uuid: None,
        }
    }

    /// Request for a non-root node under `parent_uuid`.
    pub fn child(kind: NodeKind, display_name: impl Into<String>, parent_uuid: NodeId) -> Self {
        Self {
            display_name: display_name.into(),
            color: None,
            parent_uuid: Some(parent_uuid),
            kind,
            organization_uuid: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn in_organization(mut self, organization_uuid: OrganizationId) -> Self {
        self.organization_uuid = Some(organization_uuid);
        self
    }
}

/// Update request. Name, color and parent are the full desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeUpdate {
    pub display_name: String,
    pub color: String,
    /// `None` only for organization roots.
    pub parent_uuid: Option<NodeId>,
    /// On reparent: move the whole subtree (`true`) or leave the descendants
    /// under the old parent (`false`).
    pub shift_all_descendants: bool,
}

/// Organization tree service facade.
pub struct OrgTreeService<R: NodeRepository> {
    repo: R,
    colors: ColorAllocator,
    neutral_color: String,
}

impl<R: NodeRepository> OrgTreeService<R> {
    /// Creates service with the default palette.
    pub fn new(repo: R) -> Self {
        let config = TreeConfig::default();
        Self {
            repo,
            colors: ColorAllocator::new(config.palette),
            neutral_color: config.neutral_color,
        }
    }

    /// Creates service with a validated custom config.
    pub fn with_config(repo: R, config: TreeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            repo,
            colors: ColorAllocator::new(config.palette),
            neutral_color: config.neutral_color,
        })
    }

    /// The palette used for round-robin assignment.
    pub fn palette(&self) -> &[String] {
        self.colors.palette()
    }

    /// Creates one node.
    ///
    /// Organizations get a fresh organization identity sharing the node id.
    /// Other kinds are attached under an existing parent and colored from
    /// the parent (location/department parents) or the palette.
    pub fn create_node(&self, request: NewNode) -> Result<Node, OrgTreeError> {
        let started_at = Instant::now();
        let kind = request.kind;
        let result = self.create_node_inner(request);
        log_outcome(
            "node_create",
            started_at,
            result.as_ref().map(|node| node.node_uuid),
            kind.as_str(),
        );
        result
    }

    /// Loads one live node.
    pub fn get_node(&self, node_uuid: NodeId) -> Result<Node, OrgTreeError> {
        self.repo
            .get_node(node_uuid)?
            .ok_or(OrgTreeError::NodeNotFound(node_uuid))
    }

    /// Materializes `root_uuid` and all of its descendants.
    pub fn get_tree(&self, root_uuid: NodeId) -> Result<TreeNode, OrgTreeError> {
        build_subtree(&self.repo, root_uuid)?.ok_or(OrgTreeError::NodeNotFound(root_uuid))
    }

    /// Lists the direct children of one node.
    pub fn list_children(&self, node_uuid: NodeId) -> Result<Vec<Node>, OrgTreeError> {
        self.get_node(node_uuid)?;
        self.repo.find_by_parent(node_uuid).map_err(Into::into)
    }

    /// Ids of every descendant of one node, pre-order.
    pub fn descendant_ids(&self, node_uuid: NodeId) -> Result<Vec<NodeId>, OrgTreeError> {
        Ok(self.get_tree(node_uuid)?.descendant_ids())
    }

    /// Renames, recolors and/or reparents one node.
    ///
    /// Returns the node unchanged when name, color and parent all match.
    /// Under the same parent, a color change cascades to every descendant.
    /// Under a new parent the node takes the new parent's color, and the
    /// subtree either moves with it or is re-anchored to the old parent.
    pub fn update_node(
        &self,
        node_uuid: NodeId,
        update: NodeUpdate,
    ) -> Result<Node, OrgTreeError> {
        let started_at = Instant::now();
        let result = self.update_node_inner(node_uuid, update);
        log_outcome(
            "node_update",
            started_at,
            result.as_ref().map(|node| node.node_uuid),
            "-",
        );
        result
    }

    /// Sets `color` on a node and on every descendant.
    pub fn recolor_subtree(
        &self,
        node_uuid: NodeId,
        color: impl Into<String>,
    ) -> Result<Node, OrgTreeError> {
        let color = normalize_color(color.into())?;
        self.repo.atomically(|repo| {
            let node = load_node(repo, node_uuid)?;
            let descendants = subtree_descendants(repo, node_uuid)?;
            repo.update_node(node_uuid, &NodeChanges::color(color.as_str()))?;
            apply_to_all(repo, &descendants, &NodeChanges::color(color.as_str()))?;
            info!(
                "event=subtree_recolor module=org_tree status=ok node_id={} kind={} descendants={}",
                node_uuid,
                node.kind.as_str(),
                descendants.len()
            );
            load_node(repo, node_uuid)
        })
    }

    /// Deletes one non-root node.
    ///
    /// With `delete_all_descendants` the whole subtree goes; otherwise every
    /// descendant is re-anchored to the node's parent first.
    pub fn delete_node(
        &self,
        node_uuid: NodeId,
        delete_all_descendants: bool,
    ) -> Result<bool, OrgTreeError> {
        let started_at = Instant::now();
        let result = self.delete_node_inner(node_uuid, delete_all_descendants);
        log_outcome(
            "node_delete",
            started_at,
            result.as_ref().map(|_| node_uuid),
            if delete_all_descendants {
                "cascade"
            } else {
                "reanchor"
            },
        );
        result
    }

    fn create_node_inner(&self, request: NewNode) -> Result<Node, OrgTreeError> {
        let display_name = normalize_display_name(request.display_name)?;
        let color = request.color.map(normalize_color).transpose()?;

        if request.kind == NodeKind::Organization {
            if request.parent_uuid.is_some() {
                return Err(OrgTreeError::InvalidInput(
                    "organization nodes cannot have a parent".to_string(),
                ));
            }
            if request.organization_uuid.is_some() {
                return Err(OrgTreeError::InvalidInput(
                    "organization nodes define their own organization".to_string(),
                ));
            }
            return self.create_organization_root(display_name, color);
        }

        let parent_uuid = request.parent_uuid.ok_or_else(|| {
            OrgTreeError::InvalidInput(format!(
                "{} nodes require a parent",
                request.kind.as_str()
            ))
        })?;
        let node_uuid = Uuid::new_v4();

        self.repo.atomically(|repo| {
            let parent = repo
                .get_node(parent_uuid)?
                .ok_or(OrgTreeError::ParentNotFound(parent_uuid))?;
            let organization_uuid = match request.organization_uuid {
                Some(org_uuid) => {
                    if !repo.organization_exists(org_uuid)? {
                        return Err(OrgTreeError::OrganizationNotFound(org_uuid));
                    }
                    org_uuid
                }
                None => parent.organization_uuid,
            };

            let color = if parent.kind.is_color_group() {
                parent.color.clone()
            } else if request.kind.is_color_group() {
                self.colors.next(repo, organization_uuid)?
            } else {
                color.unwrap_or_else(|| self.neutral_color.clone())
            };

            // A fresh id cannot be an ancestor of anything; checked anyway so
            // no attach path skips the walk.
            if would_create_cycle(repo, parent_uuid, node_uuid)? {
                return Err(OrgTreeError::CycleDetected {
                    node_uuid,
                    parent_uuid,
                });
            }

            repo.insert_node(&NodeDraft {
                node_uuid,
                organization_uuid,
                kind: request.kind,
                parent_uuid: Some(parent_uuid),
                display_name,
                color,
            })
            .map_err(Into::into)
        })
    }

    fn create_organization_root(
        &self,
        display_name: String,
        color: Option<String>,
    ) -> Result<Node, OrgTreeError> {
        let org_uuid = Uuid::new_v4();
        let color = color.unwrap_or_else(|| self.neutral_color.clone());
        self.repo.atomically(|repo| {
            repo.create_organization(org_uuid, display_name.as_str())?;
            repo.insert_node(&NodeDraft {
                node_uuid: org_uuid,
                organization_uuid: org_uuid,
                kind: NodeKind::Organization,
                parent_uuid: None,
                display_name,
                color,
            })
            .map_err(Into::into)
        })
    }

    fn update_node_inner(
        &self,
        node_uuid: NodeId,
        update: NodeUpdate,
    ) -> Result<Node, OrgTreeError> {
        let display_name = normalize_display_name(update.display_name)?;
        let color = normalize_color(update.color)?;

        self.repo.atomically(|repo| {
            let node = load_node(repo, node_uuid)?;

            let requested_parent = match (node.kind, update.parent_uuid) {
                (NodeKind::Organization, None) => None,
                (NodeKind::Organization, Some(_)) => {
                    return Err(OrgTreeError::InvalidOperation {
                        node_uuid,
                        reason: "organization nodes cannot be reparented",
                    });
                }
                (_, None) => {
                    return Err(OrgTreeError::InvalidOperation {
                        node_uuid,
                        reason: "only organization nodes may have no parent",
                    });
                }
                (_, Some(parent_uuid)) => Some(parent_uuid),
            };

            if requested_parent == node.parent_uuid
                && color == node.color
                && display_name == node.display_name
            {
                return Ok(node);
            }

            let descendants = subtree_descendants(repo, node_uuid)?;

            let new_parent_uuid = match requested_parent {
                Some(parent_uuid) if requested_parent != node.parent_uuid => parent_uuid,
                _ => {
                    let changes = NodeChanges {
                        display_name: (display_name != node.display_name).then_some(display_name),
                        color: (color != node.color).then(|| color.clone()),
                        parent_uuid: None,
                    };
                    if !changes.is_empty() {
                        repo.update_node(node_uuid, &changes)?;
                    }
                    if changes.color.is_some() {
                        apply_to_all(repo, &descendants, &NodeChanges::color(color.as_str()))?;
                    }
                    return load_node(repo, node_uuid);
                }
            };

            let new_parent = repo
                .get_node(new_parent_uuid)?
                .ok_or(OrgTreeError::ParentNotFound(new_parent_uuid))?;
            if would_create_cycle(repo, new_parent_uuid, node_uuid)? {
                return Err(OrgTreeError::CycleDetected {
                    node_uuid,
                    parent_uuid: new_parent_uuid,
                });
            }

            if update.shift_all_descendants {
                apply_to_all(
                    repo,
                    &descendants,
                    &NodeChanges::color(new_parent.color.as_str()),
                )?;
            } else {
                let old_parent_uuid = node.parent_uuid.ok_or(OrgTreeError::InvalidOperation {
                    node_uuid,
                    reason: "node has no previous parent to re-anchor descendants to",
                })?;
                let old_parent = repo
                    .get_node(old_parent_uuid)?
                    .ok_or(OrgTreeError::ParentNotFound(old_parent_uuid))?;
                apply_to_all(
                    repo,
                    &descendants,
                    &NodeChanges::reparent(old_parent_uuid, old_parent.color.as_str()),
                )?;
            }

            repo.update_node(
                node_uuid,
                &NodeChanges {
                    display_name: Some(display_name),
                    ..NodeChanges::reparent(new_parent_uuid, new_parent.color.as_str())
                },
            )?;
            info!(
                "event=node_reparent module=org_tree status=ok node_id={} parent_id={} shift_all={} descendants={}",
                node_uuid,
                new_parent_uuid,
                update.shift_all_descendants,
                descendants.len()
            );
            load_node(repo, node_uuid)
        })
    }

    fn delete_node_inner(
        &self,
        node_uuid: NodeId,
        delete_all_descendants: bool,
    ) -> Result<bool, OrgTreeError> {
        self.repo.atomically(|repo| {
            let node = load_node(repo, node_uuid)?;
            if node.is_root() {
                return Err(OrgTreeError::InvalidOperation {
                    node_uuid,
                    reason: "organization nodes cannot be deleted",
                });
            }

            let descendants = subtree_descendants(repo, node_uuid)?;
            if delete_all_descendants {
                // Pre-order reversed puts every descendant before its ancestors.
                for descendant_uuid in descendants.iter().rev() {
                    repo.delete_node(*descendant_uuid)?;
                }
            } else {
                let parent_uuid = node.parent_uuid.ok_or(OrgTreeError::InvalidOperation {
                    node_uuid,
                    reason: "node has no parent to re-anchor descendants to",
                })?;
                let parent = repo
                    .get_node(parent_uuid)?
                    .ok_or(OrgTreeError::ParentNotFound(parent_uuid))?;
                apply_to_all(
                    repo,
                    &descendants,
                    &NodeChanges::reparent(parent_uuid, parent.color.as_str()),
                )?;
            }
            repo.delete_node(node_uuid)?;
            Ok(true)
        })
    }
}

/// Parses a collaborator-supplied node id.
pub fn parse_node_id(value: &str) -> Result<NodeId, OrgTreeError> {
    Uuid::parse_str(value.trim())
        .map_err(|_| OrgTreeError::InvalidInput(format!("invalid node id `{value}`")))
}

fn load_node<R: NodeRepository>(repo: &R, node_uuid: NodeId) -> Result<Node, OrgTreeError> {
    repo.get_node(node_uuid)?
        .ok_or(OrgTreeError::NodeNotFound(node_uuid))
}

fn subtree_descendants<R: NodeRepository>(
    repo: &R,
    node_uuid: NodeId,
) -> Result<Vec<NodeId>, OrgTreeError> {
    let nodes = repo.list_subtree(node_uuid)?;
    let tree = assemble_tree(node_uuid, nodes).ok_or(OrgTreeError::NodeNotFound(node_uuid))?;
    Ok(tree.descendant_ids())
}

fn apply_to_all<R: NodeRepository>(
    repo: &R,
    node_ids: &[NodeId],
    changes: &NodeChanges,
) -> Result<(), OrgTreeError> {
    for node_uuid in node_ids {
        repo.update_node(*node_uuid, changes)?;
    }
    Ok(())
}

fn normalize_display_name(value: String) -> Result<String, OrgTreeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(OrgTreeError::InvalidInput(
            "display name must not be blank".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn normalize_color(value: String) -> Result<String, OrgTreeError> {
    let trimmed = value.trim();
    if !is_valid_color(trimmed) {
        return Err(OrgTreeError::InvalidInput(format!(
            "invalid color token `{trimmed}`"
        )));
    }
    Ok(trimmed.to_string())
}

fn log_outcome(
    event: &str,
    started_at: Instant,
    outcome: Result<NodeId, &OrgTreeError>,
    detail: &str,
) {
    match outcome {
        Ok(node_uuid) => info!(
            "event={event} module=org_tree status=ok node_id={node_uuid} detail={detail} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event={event} module=org_tree status=error detail={detail} duration_ms={} error_code={}",
            started_at.elapsed().as_millis(),
            err.error_code()
        ),
    }
}
