//! Path store ports: the closure-table persistence boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use treeline_domain::{ClosurePath, NodeId, NodePayload, PathRow, PathRowId};

use super::error::StoreError;
use super::types::{HierarchyTable, IdGap};

// =============================================================================
// Store (pool-level)
// =============================================================================

/// One hierarchy's node and closure tables.
///
/// Reads here run outside any batch; every write goes through a [`PathTxn`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PathStore: Send + Sync {
    fn table(&self) -> HierarchyTable;

    /// Create the tables if they do not exist yet.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Open an isolated transaction holding one pooled connection.
    async fn begin(&self) -> Result<Box<dyn PathTxn>, StoreError>;

    /// Rows `(a, node, k)`, depth ascending, bounded by `max_depth` when given.
    async fn ancestors(
        &self,
        node: NodeId,
        max_depth: Option<u32>,
    ) -> Result<Vec<PathRow>, StoreError>;

    /// Rows `(node, d, k)`, depth ascending, bounded by `max_depth` when given.
    async fn descendants(
        &self,
        node: NodeId,
        max_depth: Option<u32>,
    ) -> Result<Vec<PathRow>, StoreError>;

    async fn path_between(
        &self,
        ancestor: NodeId,
        descendant: NodeId,
    ) -> Result<Option<PathRow>, StoreError>;

    async fn node_exists(&self, node: NodeId) -> Result<bool, StoreError>;
}

// =============================================================================
// Transaction
// =============================================================================

/// An open batch transaction.
///
/// Dropping it without [`PathTxn::commit`] rolls everything back. Once
/// committed or rolled back, every call fails with
/// [`StoreError::TransactionClosed`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PathTxn: Send {
    // Node ids
    async fn node_id_gaps(&mut self, between_limit: u32) -> Result<Vec<IdGap>, StoreError>;
    async fn node_exists(&mut self, node: NodeId) -> Result<bool, StoreError>;

    // Nodes
    async fn insert_node(
        &mut self,
        node: NodeId,
        payload: &NodePayload,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn update_node_payload(
        &mut self,
        node: NodeId,
        payload: &NodePayload,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // Single-row path ops
    async fn insert_path(&mut self, path: ClosurePath) -> Result<PathRowId, StoreError>;
    async fn update_path(&mut self, row: PathRowId, path: ClosurePath) -> Result<(), StoreError>;
    async fn null_path_endpoints(&mut self, row: PathRowId) -> Result<(), StoreError>;
    async fn delete_path_by_pk(&mut self, row: PathRowId) -> Result<(), StoreError>;

    // Bulk path ops
    async fn insert_paths(&mut self, paths: &[ClosurePath]) -> Result<u64, StoreError>;
    /// Rows whose ancestor is in `ancestors` and whose descendant is in `descendants`.
    async fn fetch_paths(
        &mut self,
        ancestors: &[NodeId],
        descendants: &[NodeId],
    ) -> Result<Vec<PathRow>, StoreError>;
    /// Removes every listed root with its whole subtree; returns the removed node ids.
    async fn delete_subtree(&mut self, roots: &[NodeId]) -> Result<Vec<NodeId>, StoreError>;

    // Reads
    async fn fetch_ancestors(&mut self, node: NodeId) -> Result<Vec<PathRow>, StoreError>;
    async fn fetch_descendants(&mut self, node: NodeId) -> Result<Vec<PathRow>, StoreError>;
    async fn fetch_self(&mut self, node: NodeId) -> Result<Option<PathRow>, StoreError>;
    async fn path_between(
        &mut self,
        ancestor: NodeId,
        descendant: NodeId,
    ) -> Result<Option<PathRow>, StoreError>;
    async fn count_null_paths(&mut self) -> Result<u64, StoreError>;

    // Lifecycle
    async fn commit(&mut self) -> Result<(), StoreError>;
    async fn rollback(&mut self) -> Result<(), StoreError>;
}
