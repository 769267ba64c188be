//! Test database and closure-table assertions.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;
use treeline_domain::{BatchKind, FormItem, ItemOutcome, NodeId, NodePayload};

use crate::app::{App, HierarchyModule};
use crate::infrastructure::clock::{FixedClock, SequenceRandom};
use crate::infrastructure::ports::{HierarchyTable, PRODUCT_TAGS};
use crate::infrastructure::settings::EngineSettings;
use crate::infrastructure::sqlite;
use crate::use_cases::{BatchError, BatchOutcome};

/// `(ancestor, descendant, depth)` as stored.
pub type Triple = (u32, u32, u32);

/// A fresh database file with both hierarchies' tables created.
pub struct TestDb {
    _dir: TempDir,
    pub pool: SqlitePool,
    pub app: App,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let settings = EngineSettings {
            database_url: format!(
                "sqlite://{}?mode=rwc",
                dir.path().join("treeline.db").display()
            ),
            max_connections: 2,
            ..EngineSettings::default()
        };
        let pool = sqlite::connect(&settings).await.expect("connect");
        let clock = Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let app = App::new(pool.clone(), &settings, clock, Arc::new(SequenceRandom::new()));
        app.ensure_schema().await.expect("schema");
        Self {
            _dir: dir,
            pool,
            app,
        }
    }

    pub fn tags(&self) -> &HierarchyModule {
        &self.app.product_tags
    }

    pub async fn apply(
        &self,
        kind: BatchKind,
        forms: &[FormItem],
    ) -> Result<BatchOutcome, BatchError> {
        self.tags().apply_batch.execute(kind, forms).await
    }

    /// Create a forest from `(name, parent name)` pairs, parents listed first.
    pub async fn seed(&self, nodes: &[(&'static str, Option<&'static str>)]) -> Names {
        let position: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(index, (name, _))| (*name, index))
            .collect();
        let forms: Vec<FormItem> = nodes
            .iter()
            .map(|(name, parent)| {
                let payload = NodePayload::new(serde_json::json!({ "name": name }));
                match parent {
                    Some(parent) => FormItem::child_of_batch(position[parent], payload),
                    None => FormItem::create_root(payload),
                }
            })
            .collect();

        let outcome = self.apply(BatchKind::Create, &forms).await.expect("seed");
        Names(
            nodes
                .iter()
                .zip(resolved(&outcome))
                .map(|((name, _), id)| (*name, id))
                .collect(),
        )
    }

    /// All closure rows with both endpoints set.
    pub async fn closure(&self) -> BTreeSet<Triple> {
        self.closure_of(PRODUCT_TAGS).await
    }

    pub async fn closure_of(&self, table: HierarchyTable) -> BTreeSet<Triple> {
        let rows: Vec<(i64, i64, i64)> = sqlx::query_as(&format!(
            "SELECT ancestor, descendant, depth FROM {} \
             WHERE ancestor IS NOT NULL AND descendant IS NOT NULL",
            table.closure_table
        ))
        .fetch_all(&self.pool)
        .await
        .expect("closure rows");
        rows.into_iter()
            .map(|(a, d, k)| (a as u32, d as u32, k as u32))
            .collect()
    }

    /// Primary key of the row `(a, d)`, if present.
    pub async fn row_id(&self, ancestor: NodeId, descendant: NodeId) -> Option<i64> {
        sqlx::query_scalar(&format!(
            "SELECT id FROM {} WHERE ancestor = ? AND descendant = ?",
            PRODUCT_TAGS.closure_table
        ))
        .bind(i64::from(ancestor.get()))
        .bind(i64::from(descendant.get()))
        .fetch_optional(&self.pool)
        .await
        .expect("row id")
    }

    pub async fn node_ids(&self) -> BTreeSet<u32> {
        let ids: Vec<i64> =
            sqlx::query_scalar(&format!("SELECT id FROM {}", PRODUCT_TAGS.node_table))
                .fetch_all(&self.pool)
                .await
                .expect("node ids");
        ids.into_iter().map(|id| id as u32).collect()
    }

    pub async fn payload(&self, node: NodeId) -> serde_json::Value {
        let raw: String = sqlx::query_scalar(&format!(
            "SELECT payload FROM {} WHERE id = ?",
            PRODUCT_TAGS.node_table
        ))
        .bind(i64::from(node.get()))
        .fetch_one(&self.pool)
        .await
        .expect("payload");
        serde_json::from_str(&raw).expect("payload json")
    }

    pub async fn total_rows(&self) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", PRODUCT_TAGS.closure_table))
            .fetch_one(&self.pool)
            .await
            .expect("row count")
    }

    /// Checks self rows, completeness against the parent graph, uniqueness,
    /// acyclicity and the absence of parked rows.
    pub async fn assert_invariants(&self) {
        let nodes = self.node_ids().await;
        let closure = self.closure().await;
        assert_eq!(
            self.total_rows().await as usize,
            closure.len(),
            "closure has rows with null endpoints"
        );

        // Self rows
        for node in &nodes {
            let selves = closure
                .iter()
                .filter(|(a, d, _)| a == node && d == node)
                .collect::<Vec<_>>();
            assert_eq!(selves, vec![&(*node, *node, 0)], "self row of {node}");
        }

        // Each node has at most one parent
        let mut parents: BTreeMap<u32, u32> = BTreeMap::new();
        for (a, d, k) in &closure {
            if *k == 1 {
                assert!(parents.insert(*d, *a).is_none(), "{d} has two parents");
            }
        }

        // Acyclic, and rebuild every chain from the parent graph
        let mut expected = BTreeSet::new();
        for node in &nodes {
            expected.insert((*node, *node, 0));
            let mut current = *node;
            let mut depth = 0;
            while let Some(parent) = parents.get(&current) {
                depth += 1;
                assert!(depth <= nodes.len() as u32, "cycle through {node}");
                expected.insert((*parent, *node, depth));
                current = *parent;
            }
        }
        assert_eq!(closure, expected, "closure does not match the parent graph");
    }
}

/// Seeded node ids by name.
pub struct Names(pub HashMap<&'static str, NodeId>);

impl Names {
    pub fn id(&self, name: &str) -> NodeId {
        self.0[name]
    }

    pub fn raw(&self, name: &str) -> u32 {
        self.id(name).get()
    }

    /// `(ancestor, descendant, depth)` by names.
    pub fn triple(&self, ancestor: &str, descendant: &str, depth: u32) -> Triple {
        (self.raw(ancestor), self.raw(descendant), depth)
    }
}

/// Node ids of resolved items, in order. Panics on a deleted item.
pub fn resolved(outcome: &BatchOutcome) -> Vec<NodeId> {
    outcome
        .items
        .iter()
        .map(|item| match item {
            ItemOutcome::Resolved(id) => *id,
            ItemOutcome::Deleted => panic!("item unexpectedly deleted"),
        })
        .collect()
}

pub fn payload(name: &str) -> NodePayload {
    NodePayload::new(serde_json::json!({ "name": name }))
}
