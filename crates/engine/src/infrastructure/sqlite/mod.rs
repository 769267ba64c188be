//! SQLite-backed path store.

mod path_store;
pub mod schema;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::infrastructure::ports::StoreError;
use crate::infrastructure::settings::EngineSettings;

pub use path_store::{SqlitePathStore, SqlitePathTxn};

/// Open the pool described by `settings`, with foreign keys enforced.
pub async fn connect(settings: &EngineSettings) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(&settings.database_url)
        .map_err(|e| StoreError::database("connect", e))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .connect_with(options)
        .await
        .map_err(|e| StoreError::database("connect", e))?;

    tracing::info!(
        url = %settings.database_url,
        max_connections = settings.max_connections,
        "SQLite pool ready"
    );
    Ok(pool)
}
