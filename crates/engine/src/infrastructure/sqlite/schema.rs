//! Table definitions for one hierarchy.

use sqlx::SqlitePool;

use crate::infrastructure::ports::{HierarchyTable, StoreError};

/// DDL for the node table, the closure table and its lookup index.
///
/// Closure endpoints are nullable so a row can be parked with both endpoints
/// NULL while a batch shuffles keys; SQLite treats NULLs as distinct under
/// UNIQUE, so parked rows never collide.
pub fn statements(table: HierarchyTable) -> [String; 3] {
    let node = table.node_table;
    let closure = table.closure_table;
    [
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {node} (
                id INTEGER PRIMARY KEY CHECK (id BETWEEN 1 AND 4294967295),
                payload TEXT NOT NULL DEFAULT '{{}}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {closure} (
                id INTEGER PRIMARY KEY,
                ancestor INTEGER NULL REFERENCES {node}(id) ON DELETE CASCADE,
                descendant INTEGER NULL REFERENCES {node}(id) ON DELETE CASCADE,
                depth INTEGER NOT NULL CHECK (depth >= 0),
                UNIQUE (ancestor, descendant)
            )
            "#
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {closure}_descendant_depth ON {closure} (descendant, depth)"
        ),
    ]
}

/// Create both tables if missing.
pub async fn ensure_schema(pool: &SqlitePool, table: HierarchyTable) -> Result<(), StoreError> {
    for statement in statements(table) {
        sqlx::query(&statement)
            .execute(pool)
            .await
            .map_err(|e| StoreError::database("ensure_schema", e))?;
    }
    tracing::debug!(hierarchy = %table, "Schema ensured");
    Ok(())
}
