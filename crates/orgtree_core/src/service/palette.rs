//! Round-robin color allocation for locations and departments.
//!
//! The cursor lives in the store, one per organization, so allocation is
//! consistent across requests, processes and restarts. Callers advance it
//! inside their write transaction.

use crate::model::node::OrganizationId;
use crate::repo::node_repo::{NodeRepoError, NodeRepoResult, NodeRepository};

/// Fixed ordered palette with a store-backed cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorAllocator {
    palette: Vec<String>,
}

impl ColorAllocator {
    /// Creates an allocator over `palette`. Order is assignment order.
    pub fn new(palette: Vec<String>) -> Self {
        Self { palette }
    }

    /// The palette in assignment order.
    pub fn palette(&self) -> &[String] {
        &self.palette
    }

    /// Palette entry for `index`, wrapping around. `None` for an empty palette.
    pub fn color_at(&self, index: usize) -> Option<&str> {
        if self.palette.is_empty() {
            return None;
        }
        Some(self.palette[index % self.palette.len()].as_str())
    }

    /// Returns the color under the organization's cursor and advances it.
    pub fn next<R: NodeRepository>(
        &self,
        repo: &R,
        org_uuid: OrganizationId,
    ) -> NodeRepoResult<String> {
        let index = repo.next_palette_index(org_uuid, self.palette.len())?;
        self.color_at(index).map(str::to_string).ok_or_else(|| {
            NodeRepoError::InvalidData(format!("palette index {index} out of range"))
        })
    }
}
