//! SQLite implementation of the path store ports.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use treeline_domain::{ClosurePath, NodeId, NodePayload, PathRow, PathRowId};

use crate::infrastructure::ports::{HierarchyTable, IdGap, PathStore, PathTxn, StoreError};

/// Ids per `IN (...)` list. Two lists per statement stay under SQLite's
/// historical 999 bind-parameter ceiling.
const BIND_CHUNK: usize = 400;

/// Closure rows per multi-row INSERT (three binds each).
const INSERT_CHUNK: usize = 300;

const PATH_COLUMNS: &str = "id, ancestor, descendant, depth";

// =============================================================================
// Store
// =============================================================================

/// Pool-level handle on one hierarchy.
#[derive(Clone)]
pub struct SqlitePathStore {
    pool: SqlitePool,
    table: HierarchyTable,
}

impl SqlitePathStore {
    pub fn new(pool: SqlitePool, table: HierarchyTable) -> Self {
        Self { pool, table }
    }

    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Sqlite>, StoreError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| StoreError::database("acquire", e))
    }
}

#[async_trait]
impl PathStore for SqlitePathStore {
    fn table(&self) -> HierarchyTable {
        self.table
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        super::schema::ensure_schema(&self.pool, self.table).await
    }

    async fn begin(&self) -> Result<Box<dyn PathTxn>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::database("begin", e))?;
        Ok(Box::new(SqlitePathTxn {
            tx: Some(tx),
            table: self.table,
        }))
    }

    async fn ancestors(
        &self,
        node: NodeId,
        max_depth: Option<u32>,
    ) -> Result<Vec<PathRow>, StoreError> {
        let mut conn = self.acquire().await?;
        select_ancestors(&mut conn, self.table, node, max_depth).await
    }

    async fn descendants(
        &self,
        node: NodeId,
        max_depth: Option<u32>,
    ) -> Result<Vec<PathRow>, StoreError> {
        let mut conn = self.acquire().await?;
        select_descendants(&mut conn, self.table, node, max_depth).await
    }

    async fn path_between(
        &self,
        ancestor: NodeId,
        descendant: NodeId,
    ) -> Result<Option<PathRow>, StoreError> {
        let mut conn = self.acquire().await?;
        select_path(&mut conn, self.table, ancestor, descendant).await
    }

    async fn node_exists(&self, node: NodeId) -> Result<bool, StoreError> {
        let mut conn = self.acquire().await?;
        select_node_exists(&mut conn, self.table, node).await
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A batch transaction. `None` once committed or rolled back.
pub struct SqlitePathTxn {
    tx: Option<Transaction<'static, Sqlite>>,
    table: HierarchyTable,
}

impl SqlitePathTxn {
    fn conn(&mut self) -> Result<&mut SqliteConnection, StoreError> {
        self.tx.as_deref_mut().ok_or(StoreError::TransactionClosed)
    }

    /// Turn a failed path write into the most specific error.
    async fn path_write_error(
        &mut self,
        operation: &'static str,
        err: sqlx::Error,
        paths: &[ClosurePath],
    ) -> StoreError {
        if is_unique_violation(&err) {
            return match self.conflicting_path(paths).await {
                Ok(path) => StoreError::PathConflict(path),
                Err(e) => e,
            };
        }
        if is_foreign_key_violation(&err) {
            return match self.missing_endpoint(paths).await {
                Ok(Some(node)) => StoreError::NodeMissing(node),
                Ok(None) => StoreError::database(operation, err),
                Err(e) => e,
            };
        }
        StoreError::database(operation, err)
    }

    /// The first path whose key is already taken, or repeated within `paths`.
    async fn conflicting_path(&mut self, paths: &[ClosurePath]) -> Result<ClosurePath, StoreError> {
        let mut seen = BTreeSet::new();
        let mut repeated = None;
        for path in paths {
            if self.path_between(path.ancestor, path.descendant).await?.is_some() {
                return Ok(*path);
            }
            if !seen.insert(path.endpoints()) && repeated.is_none() {
                repeated = Some(*path);
            }
        }
        repeated
            .or_else(|| paths.first().copied())
            .ok_or_else(|| StoreError::database("insert_paths", "conflict on empty insert"))
    }

    async fn missing_endpoint(
        &mut self,
        paths: &[ClosurePath],
    ) -> Result<Option<NodeId>, StoreError> {
        for path in paths {
            for node in [path.ancestor, path.descendant] {
                if !self.node_exists(node).await? {
                    return Ok(Some(node));
                }
            }
        }
        Ok(None)
    }

    async fn delete_where_in(
        &mut self,
        sql_prefix: &str,
        ids: &[NodeId],
        operation: &'static str,
    ) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let mut affected = 0;
        for chunk in ids.chunks(BIND_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(sql_prefix);
            push_id_list(&mut builder, chunk);
            affected += builder
                .build()
                .execute(&mut *conn)
                .await
                .map_err(|e| StoreError::database(operation, e))?
                .rows_affected();
        }
        Ok(affected)
    }
}

#[async_trait]
impl PathTxn for SqlitePathTxn {
    async fn node_id_gaps(&mut self, between_limit: u32) -> Result<Vec<IdGap>, StoreError> {
        let node = self.table.node_table;
        let conn = self.conn()?;

        // 1. Below the smallest id
        let min: Option<i64> = sqlx::query_scalar(&format!("SELECT MIN(id) FROM {node}"))
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| StoreError::database("node_id_gaps", e))?;
        let Some(min) = min else {
            return Ok(vec![IdGap::full()]);
        };

        let mut gaps = Vec::new();
        if min > i64::from(NodeId::MIN.get()) {
            gaps.push(IdGap::new(NodeId::MIN.get(), to_u32(min - 1)?));
        }

        // 2. Between consecutive ids
        let between: Vec<(i64, i64)> = sqlx::query_as(&format!(
            r#"
            SELECT id + 1, next_id - 1 FROM (
                SELECT id, LEAD(id) OVER (ORDER BY id) AS next_id FROM {node}
            )
            WHERE next_id IS NOT NULL AND next_id - id > 1
            ORDER BY id
            LIMIT ?
            "#
        ))
        .bind(i64::from(between_limit))
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| StoreError::database("node_id_gaps", e))?;
        for (start, end) in between {
            gaps.push(IdGap::new(to_u32(start)?, to_u32(end)?));
        }

        // 3. Above the largest id
        let max: Option<i64> = sqlx::query_scalar(&format!("SELECT MAX(id) FROM {node}"))
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| StoreError::database("node_id_gaps", e))?;
        if let Some(max) = max {
            if max < i64::from(NodeId::MAX.get()) {
                gaps.push(IdGap::new(to_u32(max + 1)?, NodeId::MAX.get()));
            }
        }

        Ok(gaps)
    }

    async fn node_exists(&mut self, node: NodeId) -> Result<bool, StoreError> {
        let table = self.table;
        select_node_exists(self.conn()?, table, node).await
    }

    async fn insert_node(
        &mut self,
        node: NodeId,
        payload: &NodePayload,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(payload).map_err(StoreError::serialization)?;
        let now = now.to_rfc3339();
        let table = self.table.node_table;
        let conn = self.conn()?;

        sqlx::query(&format!(
            "INSERT INTO {table} (id, payload, created_at, updated_at) VALUES (?, ?, ?, ?)"
        ))
        .bind(id_param(node))
        .bind(json)
        .bind(&now)
        .bind(&now)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::NodeIdTaken(node)
            } else {
                StoreError::database("insert_node", e)
            }
        })?;
        Ok(())
    }

    async fn update_node_payload(
        &mut self,
        node: NodeId,
        payload: &NodePayload,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(payload).map_err(StoreError::serialization)?;
        let table = self.table.node_table;
        let conn = self.conn()?;

        let result = sqlx::query(&format!(
            "UPDATE {table} SET payload = ?, updated_at = ? WHERE id = ?"
        ))
        .bind(json)
        .bind(now.to_rfc3339())
        .bind(id_param(node))
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::database("update_node_payload", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NodeMissing(node));
        }
        Ok(())
    }

    async fn insert_path(&mut self, path: ClosurePath) -> Result<PathRowId, StoreError> {
        let closure = self.table.closure_table;
        let conn = self.conn()?;
        let result = sqlx::query(&format!(
            "INSERT INTO {closure} (ancestor, descendant, depth) VALUES (?, ?, ?)"
        ))
        .bind(id_param(path.ancestor))
        .bind(id_param(path.descendant))
        .bind(i64::from(path.depth))
        .execute(&mut *conn)
        .await;

        match result {
            Ok(done) => Ok(PathRowId::new(done.last_insert_rowid())),
            Err(e) => Err(self.path_write_error("insert_path", e, &[path]).await),
        }
    }

    async fn update_path(&mut self, row: PathRowId, path: ClosurePath) -> Result<(), StoreError> {
        let closure = self.table.closure_table;
        let conn = self.conn()?;
        let result = sqlx::query(&format!(
            "UPDATE {closure} SET ancestor = ?, descendant = ?, depth = ? WHERE id = ?"
        ))
        .bind(id_param(path.ancestor))
        .bind(id_param(path.descendant))
        .bind(i64::from(path.depth))
        .bind(row.get())
        .execute(&mut *conn)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(StoreError::database(
                "update_path",
                format!("path row {row} not found"),
            )),
            Ok(_) => Ok(()),
            Err(e) => Err(self.path_write_error("update_path", e, &[path]).await),
        }
    }

    async fn null_path_endpoints(&mut self, row: PathRowId) -> Result<(), StoreError> {
        let closure = self.table.closure_table;
        let conn = self.conn()?;
        let result = sqlx::query(&format!(
            "UPDATE {closure} SET ancestor = NULL, descendant = NULL WHERE id = ?"
        ))
        .bind(row.get())
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::database("null_path_endpoints", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::database(
                "null_path_endpoints",
                format!("path row {row} not found"),
            ));
        }
        Ok(())
    }

    async fn delete_path_by_pk(&mut self, row: PathRowId) -> Result<(), StoreError> {
        let closure = self.table.closure_table;
        let conn = self.conn()?;
        sqlx::query(&format!("DELETE FROM {closure} WHERE id = ?"))
            .bind(row.get())
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::database("delete_path_by_pk", e))?;
        Ok(())
    }

    async fn insert_paths(&mut self, paths: &[ClosurePath]) -> Result<u64, StoreError> {
        let closure = self.table.closure_table;
        let mut inserted = 0;
        for chunk in paths.chunks(INSERT_CHUNK) {
            let result = {
                let conn = self.conn()?;
                let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                    "INSERT INTO {closure} (ancestor, descendant, depth) "
                ));
                builder.push_values(chunk, |mut b, path| {
                    b.push_bind(id_param(path.ancestor))
                        .push_bind(id_param(path.descendant))
                        .push_bind(i64::from(path.depth));
                });
                builder.build().execute(&mut *conn).await
            };
            match result {
                Ok(done) => inserted += done.rows_affected(),
                Err(e) => return Err(self.path_write_error("insert_paths", e, chunk).await),
            }
        }
        Ok(inserted)
    }

    async fn fetch_paths(
        &mut self,
        ancestors: &[NodeId],
        descendants: &[NodeId],
    ) -> Result<Vec<PathRow>, StoreError> {
        if ancestors.is_empty() || descendants.is_empty() {
            return Ok(Vec::new());
        }
        let closure = self.table.closure_table;
        let conn = self.conn()?;
        let mut out = Vec::new();
        for ancestor_chunk in ancestors.chunks(BIND_CHUNK) {
            for descendant_chunk in descendants.chunks(BIND_CHUNK) {
                let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                    "SELECT {PATH_COLUMNS} FROM {closure} WHERE ancestor IN "
                ));
                push_id_list(&mut builder, ancestor_chunk);
                builder.push(" AND descendant IN ");
                push_id_list(&mut builder, descendant_chunk);
                builder.push(" ORDER BY descendant, depth DESC");

                let rows = builder
                    .build()
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(|e| StoreError::database("fetch_paths", e))?;
                for row in &rows {
                    out.push(path_row(row)?);
                }
            }
        }
        Ok(out)
    }

    async fn delete_subtree(&mut self, roots: &[NodeId]) -> Result<Vec<NodeId>, StoreError> {
        let mut doomed = BTreeSet::new();
        for root in roots {
            if doomed.contains(root) {
                continue;
            }
            let rows = self.fetch_descendants(*root).await?;
            doomed.extend(rows.iter().map(PathRow::descendant));
            if self.node_exists(*root).await? {
                doomed.insert(*root);
            }
        }
        let ids: Vec<NodeId> = doomed.into_iter().collect();
        if ids.is_empty() {
            return Ok(ids);
        }

        let closure = self.table.closure_table;
        let node = self.table.node_table;
        let by_descendant = self
            .delete_where_in(
                &format!("DELETE FROM {closure} WHERE descendant IN "),
                &ids,
                "delete_subtree",
            )
            .await?;
        let by_ancestor = self
            .delete_where_in(
                &format!("DELETE FROM {closure} WHERE ancestor IN "),
                &ids,
                "delete_subtree",
            )
            .await?;
        let nodes = self
            .delete_where_in(&format!("DELETE FROM {node} WHERE id IN "), &ids, "delete_subtree")
            .await?;

        tracing::debug!(
            hierarchy = %self.table,
            roots = roots.len(),
            nodes,
            paths = by_descendant + by_ancestor,
            "Subtrees deleted"
        );
        Ok(ids)
    }

    async fn fetch_ancestors(&mut self, node: NodeId) -> Result<Vec<PathRow>, StoreError> {
        let table = self.table;
        select_ancestors(self.conn()?, table, node, None).await
    }

    async fn fetch_descendants(&mut self, node: NodeId) -> Result<Vec<PathRow>, StoreError> {
        let table = self.table;
        select_descendants(self.conn()?, table, node, None).await
    }

    async fn fetch_self(&mut self, node: NodeId) -> Result<Option<PathRow>, StoreError> {
        let table = self.table;
        select_path(self.conn()?, table, node, node).await
    }

    async fn path_between(
        &mut self,
        ancestor: NodeId,
        descendant: NodeId,
    ) -> Result<Option<PathRow>, StoreError> {
        let table = self.table;
        select_path(self.conn()?, table, ancestor, descendant).await
    }

    async fn count_null_paths(&mut self) -> Result<u64, StoreError> {
        let closure = self.table.closure_table;
        let conn = self.conn()?;
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {closure} WHERE ancestor IS NULL OR descendant IS NULL"
        ))
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| StoreError::database("count_null_paths", e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit()
            .await
            .map_err(|e| StoreError::database("commit", e))
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.rollback()
            .await
            .map_err(|e| StoreError::database("rollback", e))
    }
}

// =============================================================================
// Shared queries
// =============================================================================

async fn select_ancestors(
    conn: &mut SqliteConnection,
    table: HierarchyTable,
    node: NodeId,
    max_depth: Option<u32>,
) -> Result<Vec<PathRow>, StoreError> {
    let closure = table.closure_table;
    let rows = sqlx::query(&format!(
        "SELECT {PATH_COLUMNS} FROM {closure} WHERE descendant = ? AND depth <= ? ORDER BY depth"
    ))
    .bind(id_param(node))
    .bind(depth_bound(max_depth))
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| StoreError::database("fetch_ancestors", e))?;
    rows.iter().map(path_row).collect()
}

async fn select_descendants(
    conn: &mut SqliteConnection,
    table: HierarchyTable,
    node: NodeId,
    max_depth: Option<u32>,
) -> Result<Vec<PathRow>, StoreError> {
    let closure = table.closure_table;
    let rows = sqlx::query(&format!(
        "SELECT {PATH_COLUMNS} FROM {closure} WHERE ancestor = ? AND depth <= ? ORDER BY depth, descendant"
    ))
    .bind(id_param(node))
    .bind(depth_bound(max_depth))
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| StoreError::database("fetch_descendants", e))?;
    rows.iter().map(path_row).collect()
}

async fn select_path(
    conn: &mut SqliteConnection,
    table: HierarchyTable,
    ancestor: NodeId,
    descendant: NodeId,
) -> Result<Option<PathRow>, StoreError> {
    let closure = table.closure_table;
    let row = sqlx::query(&format!(
        "SELECT {PATH_COLUMNS} FROM {closure} WHERE ancestor = ? AND descendant = ?"
    ))
    .bind(id_param(ancestor))
    .bind(id_param(descendant))
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| StoreError::database("path_between", e))?;
    row.as_ref().map(path_row).transpose()
}

async fn select_node_exists(
    conn: &mut SqliteConnection,
    table: HierarchyTable,
    node: NodeId,
) -> Result<bool, StoreError> {
    let node_table = table.node_table;
    let found: Option<i64> =
        sqlx::query_scalar(&format!("SELECT id FROM {node_table} WHERE id = ?"))
            .bind(id_param(node))
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| StoreError::database("node_exists", e))?;
    Ok(found.is_some())
}

// =============================================================================
// Helpers
// =============================================================================

fn push_id_list(builder: &mut QueryBuilder<'_, Sqlite>, ids: &[NodeId]) {
    builder.push("(");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id_param(*id));
    }
    separated.push_unseparated(")");
}

fn path_row(row: &SqliteRow) -> Result<PathRow, StoreError> {
    let id: i64 = row
        .try_get("id")
        .map_err(|e| StoreError::database("decode_path", e))?;
    let ancestor: i64 = row
        .try_get("ancestor")
        .map_err(|e| StoreError::database("decode_path", e))?;
    let descendant: i64 = row
        .try_get("descendant")
        .map_err(|e| StoreError::database("decode_path", e))?;
    let depth: i64 = row
        .try_get("depth")
        .map_err(|e| StoreError::database("decode_path", e))?;

    Ok(PathRow::new(
        PathRowId::new(id),
        ClosurePath::new(
            NodeId::new(to_u32(ancestor)?),
            NodeId::new(to_u32(descendant)?),
            to_u32(depth)?,
        ),
    ))
}

fn id_param(node: NodeId) -> i64 {
    i64::from(node.get())
}

fn depth_bound(max_depth: Option<u32>) -> i64 {
    max_depth.map(i64::from).unwrap_or(i64::MAX)
}

fn to_u32(value: i64) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::database("decode", format!("{value} is outside the u32 range")))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}
