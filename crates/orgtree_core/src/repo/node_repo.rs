//! Node store contract and SQLite implementation.
//!
//! # Responsibility
//! - Create/read/update/soft-delete org tree nodes and organization rows.
//! - Bulk-load whole subtrees in one query for tree materialization.
//! - Persist the per-organization palette cursor.
//! - Provide a transaction scope for compound mutations.
//!
//! # Invariants
//! - Soft-deleted (`deleted_at IS NOT NULL`) nodes are invisible to reads.
//! - Child listing is deterministic: insertion order (`rowid ASC`).
//! - `atomically` holds the SQLite write lock for its whole scope.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::node::{Node, NodeId, NodeKind, OrganizationId};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const NODE_COLUMNS: &[&str] = &[
    "node_uuid",
    "organization_uuid",
    "kind",
    "parent_uuid",
    "display_name",
    "color",
    "created_at",
    "updated_at",
    "deleted_at",
];

const NODE_SELECT_SQL: &str = "SELECT
    node_uuid,
    organization_uuid,
    kind,
    parent_uuid,
    display_name,
    color,
    created_at,
    updated_at,
    deleted_at
FROM org_nodes";

/// Result type used by node store operations.
pub type NodeRepoResult<T> = Result<T, NodeRepoError>;

/// Errors from node store operations.
#[derive(Debug)]
pub enum NodeRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target node does not exist or is soft-deleted.
    NodeNotFound(NodeId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid node.
    InvalidData(String),
}

impl Display for NodeRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NodeNotFound(id) => write!(f, "org node not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "node repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "node repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "node repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid org node data: {message}"),
        }
    }
}

impl Error for NodeRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for NodeRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for NodeRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Insert payload for one node. Timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDraft {
    pub node_uuid: NodeId,
    pub organization_uuid: OrganizationId,
    pub kind: NodeKind,
    pub parent_uuid: Option<NodeId>,
    pub display_name: String,
    pub color: String,
}

/// Partial field update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeChanges {
    pub display_name: Option<String>,
    pub color: Option<String>,
    pub parent_uuid: Option<NodeId>,
}

impl NodeChanges {
    /// Changes that only set a color.
    pub fn color(color: impl Into<String>) -> Self {
        Self {
            color: Some(color.into()),
            ..Self::default()
        }
    }

    /// Changes that move a node and set its color.
    pub fn reparent(parent_uuid: NodeId, color: impl Into<String>) -> Self {
        Self {
            parent_uuid: Some(parent_uuid),
            color: Some(color.into()),
            ..Self::default()
        }
    }

    /// Whether applying these changes would write nothing.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.color.is_none() && self.parent_uuid.is_none()
    }
}

/// Node store contract.
///
/// Implementations are pure persistence adapters: they do not check
/// hierarchy invariants.
pub trait NodeRepository {
    /// Runs `work` in one write transaction.
    ///
    /// Commits when `work` returns `Ok`, rolls back otherwise. Not reentrant.
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<NodeRepoError>;
    /// Creates one organization identity row.
    fn create_organization(
        &self,
        org_uuid: OrganizationId,
        display_name: &str,
    ) -> NodeRepoResult<()>;
    /// Returns whether an organization identity row exists.
    fn organization_exists(&self, org_uuid: OrganizationId) -> NodeRepoResult<bool>;
    /// Loads one live node by id.
    fn get_node(&self, node_uuid: NodeId) -> NodeRepoResult<Option<Node>>;
    /// Lists live direct children of one node.
    fn find_by_parent(&self, parent_uuid: NodeId) -> NodeRepoResult<Vec<Node>>;
    /// Persists one new node and returns the stored row.
    fn insert_node(&self, draft: &NodeDraft) -> NodeRepoResult<Node>;
    /// Applies a partial update to one live node.
    fn update_node(&self, node_uuid: NodeId, changes: &NodeChanges) -> NodeRepoResult<()>;
    /// Soft-deletes one live node.
    fn delete_node(&self, node_uuid: NodeId) -> NodeRepoResult<()>;
    /// Loads a live node and all live descendants in one round trip.
    ///
    /// Rows come back in insertion order. Empty when the root is missing.
    fn list_subtree(&self, root_uuid: NodeId) -> NodeRepoResult<Vec<Node>>;
    /// Returns the organization's palette cursor and advances it modulo
    /// `palette_len`.
    fn next_palette_index(
        &self,
        org_uuid: OrganizationId,
        palette_len: usize,
    ) -> NodeRepoResult<usize>;
}

/// SQLite-backed node store.
pub struct SqliteNodeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNodeRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> NodeRepoResult<Self> {
        ensure_node_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl NodeRepository for SqliteNodeRepository<'_> {
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<NodeRepoError>,
    {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(NodeRepoError::from)?;
        // Dropping `tx` on the error path rolls back.
        let value = work(self)?;
        tx.commit().map_err(NodeRepoError::from)?;
        Ok(value)
    }

    fn create_organization(
        &self,
        org_uuid: OrganizationId,
        display_name: &str,
    ) -> NodeRepoResult<()> {
        self.conn.execute(
            "INSERT INTO organizations (org_uuid, display_name) VALUES (?1, ?2);",
            params![org_uuid.to_string(), display_name],
        )?;
        Ok(())
    }

    fn organization_exists(&self, org_uuid: OrganizationId) -> NodeRepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM organizations WHERE org_uuid = ?1);",
            [org_uuid.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn get_node(&self, node_uuid: NodeId) -> NodeRepoResult<Option<Node>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NODE_SELECT_SQL}
             WHERE node_uuid = ?1
               AND deleted_at IS NULL;"
        ))?;
        let mut rows = stmt.query([node_uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_node_row(row)?));
        }
        Ok(None)
    }

    fn find_by_parent(&self, parent_uuid: NodeId) -> NodeRepoResult<Vec<Node>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NODE_SELECT_SQL}
             WHERE parent_uuid = ?1
               AND deleted_at IS NULL
             ORDER BY rowid ASC;"
        ))?;
        let mut rows = stmt.query([parent_uuid.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_node_row(row)?);
        }
        Ok(items)
    }

    fn insert_node(&self, draft: &NodeDraft) -> NodeRepoResult<Node> {
        self.conn.execute(
            "INSERT INTO org_nodes (
                node_uuid,
                organization_uuid,
                kind,
                parent_uuid,
                display_name,
                color
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                draft.node_uuid.to_string(),
                draft.organization_uuid.to_string(),
                draft.kind.as_str(),
                draft.parent_uuid.map(|value| value.to_string()),
                draft.display_name.as_str(),
                draft.color.as_str(),
            ],
        )?;
        self.get_node(draft.node_uuid)?
            .ok_or(NodeRepoError::NodeNotFound(draft.node_uuid))
    }

    fn update_node(&self, node_uuid: NodeId, changes: &NodeChanges) -> NodeRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE org_nodes
             SET display_name = COALESCE(?2, display_name),
                 color = COALESCE(?3, color),
                 parent_uuid = COALESCE(?4, parent_uuid),
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE node_uuid = ?1
               AND deleted_at IS NULL;",
            params![
                node_uuid.to_string(),
                changes.display_name.as_deref(),
                changes.color.as_deref(),
                changes.parent_uuid.map(|value| value.to_string()),
            ],
        )?;
        if changed == 0 {
            return Err(NodeRepoError::NodeNotFound(node_uuid));
        }
        Ok(())
    }

    fn delete_node(&self, node_uuid: NodeId) -> NodeRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE org_nodes
             SET deleted_at = (strftime('%s', 'now') * 1000),
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE node_uuid = ?1
               AND deleted_at IS NULL;",
            [node_uuid.to_string()],
        )?;
        if changed == 0 {
            return Err(NodeRepoError::NodeNotFound(node_uuid));
        }
        Ok(())
    }

    fn list_subtree(&self, root_uuid: NodeId) -> NodeRepoResult<Vec<Node>> {
        // UNION (not UNION ALL) keeps the walk finite even on corrupt cyclic rows.
        let mut stmt = self.conn.prepare(
            "WITH RECURSIVE subtree(node_uuid) AS (
                SELECT node_uuid
                FROM org_nodes
                WHERE node_uuid = ?1
                  AND deleted_at IS NULL
                UNION
                SELECT child.node_uuid
                FROM org_nodes child
                INNER JOIN subtree parent ON child.parent_uuid = parent.node_uuid
                WHERE child.deleted_at IS NULL
            )
            SELECT
                n.node_uuid AS node_uuid,
                n.organization_uuid AS organization_uuid,
                n.kind AS kind,
                n.parent_uuid AS parent_uuid,
                n.display_name AS display_name,
                n.color AS color,
                n.created_at AS created_at,
                n.updated_at AS updated_at,
                n.deleted_at AS deleted_at
            FROM org_nodes n
            INNER JOIN subtree ON subtree.node_uuid = n.node_uuid
            ORDER BY n.rowid ASC;",
        )?;
        let mut rows = stmt.query([root_uuid.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_node_row(row)?);
        }
        Ok(items)
    }

    fn next_palette_index(
        &self,
        org_uuid: OrganizationId,
        palette_len: usize,
    ) -> NodeRepoResult<usize> {
        if palette_len == 0 {
            return Err(NodeRepoError::InvalidData(
                "palette must not be empty".to_string(),
            ));
        }

        let org_text = org_uuid.to_string();
        self.conn.execute(
            "INSERT INTO palette_cursors (org_uuid, next_index)
             VALUES (?1, 0)
             ON CONFLICT (org_uuid) DO NOTHING;",
            [org_text.as_str()],
        )?;
        let stored: i64 = self.conn.query_row(
            "SELECT next_index FROM palette_cursors WHERE org_uuid = ?1;",
            [org_text.as_str()],
            |row| row.get(0),
        )?;
        let current = usize::try_from(stored).map_err(|_| {
            NodeRepoError::InvalidData(format!(
                "invalid next_index `{stored}` in palette_cursors.next_index"
            ))
        })? % palette_len;

        let advanced = (current + 1) % palette_len;
        self.conn.execute(
            "UPDATE palette_cursors SET next_index = ?2 WHERE org_uuid = ?1;",
            params![org_text, advanced as i64],
        )?;
        Ok(current)
    }
}

fn parse_node_row(row: &Row<'_>) -> NodeRepoResult<Node> {
    let node_uuid_text: String = row.get("node_uuid")?;
    let organization_uuid_text: String = row.get("organization_uuid")?;
    let parent_uuid = row
        .get::<_, Option<String>>("parent_uuid")?
        .map(|value| parse_uuid(&value, "org_nodes.parent_uuid"))
        .transpose()?;

    let kind_text: String = row.get("kind")?;
    let kind = NodeKind::parse(&kind_text).ok_or_else(|| {
        NodeRepoError::InvalidData(format!("invalid node kind `{kind_text}` in org_nodes.kind"))
    })?;

    Ok(Node {
        node_uuid: parse_uuid(&node_uuid_text, "org_nodes.node_uuid")?,
        organization_uuid: parse_uuid(&organization_uuid_text, "org_nodes.organization_uuid")?,
        kind,
        parent_uuid,
        display_name: row.get("display_name")?,
        color: row.get("color")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn parse_uuid(value: &str, column: &'static str) -> NodeRepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| NodeRepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn ensure_node_connection_ready(conn: &Connection) -> NodeRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(NodeRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["organizations", "palette_cursors", "org_nodes"] {
        if !table_exists(conn, table)? {
            return Err(NodeRepoError::MissingRequiredTable(table));
        }
    }
    for &column in NODE_COLUMNS {
        if !table_has_column(conn, "org_nodes", column)? {
            return Err(NodeRepoError::MissingRequiredColumn {
                table: "org_nodes",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> NodeRepoResult<bool> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1
             FROM sqlite_master
             WHERE type = 'table' AND name = ?1;",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> NodeRepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
