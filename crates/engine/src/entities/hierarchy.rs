//! Hierarchy entity module.
//!
//! Read access to one closure table outside any batch.

use std::sync::Arc;

use treeline_domain::{NodeId, PathRow, Relative};

use crate::infrastructure::ports::{HierarchyTable, PathStore, StoreError};

/// Hierarchy entity - path reads for one node/closure table pair.
pub struct Hierarchy {
    store: Arc<dyn PathStore>,
}

impl Hierarchy {
    pub fn new(store: Arc<dyn PathStore>) -> Self {
        Self { store }
    }

    pub fn table(&self) -> HierarchyTable {
        self.store.table()
    }

    /// Create the node and closure tables if missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.store.ensure_schema().await
    }

    /// Ancestors of `node` by depth ascending, starting with `node` itself at
    /// depth 0. `max_depth` is inclusive.
    pub async fn read_ancestors(
        &self,
        node: NodeId,
        max_depth: Option<u32>,
    ) -> Result<Vec<Relative>, StoreError> {
        let rows = self.store.ancestors(node, max_depth).await?;
        relatives(node, &rows, PathRow::ancestor)
    }

    /// Descendants of `node` by depth ascending, starting with `node` itself
    /// at depth 0. `max_depth` is inclusive.
    pub async fn read_descendants(
        &self,
        node: NodeId,
        max_depth: Option<u32>,
    ) -> Result<Vec<Relative>, StoreError> {
        let rows = self.store.descendants(node, max_depth).await?;
        relatives(node, &rows, PathRow::descendant)
    }

    /// Whether one node lies on the other's chain, in either direction.
    pub async fn exists_path(&self, src: NodeId, dst: NodeId) -> Result<bool, StoreError> {
        if src == dst {
            return self.store.node_exists(src).await;
        }
        if self.store.path_between(src, dst).await?.is_some() {
            return Ok(true);
        }
        Ok(self.store.path_between(dst, src).await?.is_some())
    }
}

fn relatives(
    node: NodeId,
    rows: &[PathRow],
    other_end: fn(&PathRow) -> NodeId,
) -> Result<Vec<Relative>, StoreError> {
    if !rows.iter().any(|row| row.path.is_self()) {
        return Err(StoreError::NodeMissing(node));
    }
    Ok(rows
        .iter()
        .map(|row| Relative::new(other_end(row), row.depth()))
        .collect())
}
