//! Application state and composition.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::entities::Hierarchy;
use crate::infrastructure::{
    clock::{SystemClock, SystemRandom},
    ports::{
        ClockPort, HierarchyTable, PathStore, RandomPort, StoreError, PRODUCT_TAGS, USER_GROUPS,
    },
    settings::EngineSettings,
    sqlite::{self, SqlitePathStore},
};
use crate::use_cases::ApplyBatch;

/// Main application state.
///
/// One [`HierarchyModule`] per shipped hierarchy, all sharing one pool.
pub struct App {
    pub product_tags: HierarchyModule,
    pub user_groups: HierarchyModule,
}

/// Reads and batch writes for one hierarchy.
pub struct HierarchyModule {
    pub hierarchy: Hierarchy,
    pub apply_batch: ApplyBatch,
}

impl HierarchyModule {
    pub fn new(
        store: Arc<dyn PathStore>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            hierarchy: Hierarchy::new(store.clone()),
            apply_batch: ApplyBatch::new(
                store,
                clock,
                random,
                settings.id_alloc_max_retries,
                settings.gap_scan_limit,
            ),
        }
    }
}

impl App {
    /// Open the configured database, create missing tables and wire
    /// everything with the system clock and randomness.
    pub async fn connect(settings: &EngineSettings) -> Result<Self, StoreError> {
        let pool = sqlite::connect(settings).await?;
        let app = Self::new(
            pool,
            settings,
            Arc::new(SystemClock),
            Arc::new(SystemRandom),
        );
        app.ensure_schema().await?;
        Ok(app)
    }

    pub fn new(
        pool: SqlitePool,
        settings: &EngineSettings,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        let module = |table: HierarchyTable| {
            let store: Arc<dyn PathStore> = Arc::new(SqlitePathStore::new(pool.clone(), table));
            HierarchyModule::new(store, clock.clone(), random.clone(), settings)
        };
        Self {
            product_tags: module(PRODUCT_TAGS),
            user_groups: module(USER_GROUPS),
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for module in [&self.product_tags, &self.user_groups] {
            module.hierarchy.ensure_schema().await?;
        }
        Ok(())
    }

    /// The module serving `table`.
    pub fn hierarchy(&self, table: HierarchyTable) -> Option<&HierarchyModule> {
        if table == PRODUCT_TAGS {
            Some(&self.product_tags)
        } else if table == USER_GROUPS {
            Some(&self.user_groups)
        } else {
            None
        }
    }
}
