//! Apply batch use case.
//!
//! Runs the planners over a snapshot read inside the batch transaction, then
//! writes the plan in a fixed order: stale rows, parked rows, updates, bulk
//! creates, payloads, new nodes, subtree deletes.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::Instrument;
use treeline_domain::{
    validate_forms, BatchId, BatchKind, ClosurePath, ClosureSnapshot, CycleValidator, FormItem,
    FormMode, GraphView, InsertParent, InsertPlanner, InsertStep, ItemOutcome, MovePlan,
    MovePlanner, NodeId, PathDiff, PathPlan, PlanError, Relative,
};

use crate::infrastructure::ports::{ClockPort, PathStore, PathTxn, RandomPort};

use super::apply::{BatchOutcome, BatchPhase, BatchRun, PlanSummary};
use super::error::{BatchError, ErrorClass};
use super::id_alloc::IdAllocator;

/// Everything the write phase needs, computed before the first write.
struct BatchPlan {
    inserts: Vec<InsertStep>,
    paths: PathPlan,
    delete_roots: Vec<NodeId>,
}

/// Apply batch use case.
///
/// One instance per hierarchy; every call runs in its own transaction.
pub struct ApplyBatch {
    store: Arc<dyn PathStore>,
    ids: IdAllocator,
    clock: Arc<dyn ClockPort>,
    random: Arc<dyn RandomPort>,
}

impl ApplyBatch {
    pub fn new(
        store: Arc<dyn PathStore>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
        id_alloc_max_retries: u32,
        gap_scan_limit: u32,
    ) -> Self {
        Self {
            store,
            ids: IdAllocator::new(random.clone(), id_alloc_max_retries, gap_scan_limit),
            clock,
            random,
        }
    }

    /// Execute the batch atomically.
    ///
    /// # Returns
    /// * `Ok(BatchOutcome)` - committed; one outcome per item in request order
    /// * `Err(BatchError)` - nothing was written
    pub async fn execute(
        &self,
        kind: BatchKind,
        forms: &[FormItem],
    ) -> Result<BatchOutcome, BatchError> {
        let batch_id = BatchId::from_uuid(self.random.gen_uuid());
        let span = tracing::info_span!(
            "batch",
            batch_id = %batch_id.short(),
            hierarchy = %self.store.table(),
            kind = %kind,
            items = forms.len()
        );
        self.run(batch_id, kind, forms).instrument(span).await
    }

    async fn run(
        &self,
        batch_id: BatchId,
        kind: BatchKind,
        forms: &[FormItem],
    ) -> Result<BatchOutcome, BatchError> {
        let mut run = BatchRun::new(batch_id);
        run.advance(BatchPhase::Parsed);

        let result = self.run_phases(&mut run, kind, forms).await;
        match &result {
            Ok(outcome) => {
                let stats = &outcome.stats;
                tracing::info!(
                    nodes_created = stats.nodes_created,
                    nodes_deleted = stats.nodes_deleted,
                    paths_updated = stats.paths_updated,
                    paths_created = stats.paths_created,
                    paths_deleted = stats.paths_deleted,
                    paths_nulled = stats.paths_nulled,
                    paths_untouched = stats.paths_untouched,
                    "Batch committed"
                );
            }
            Err(e) => log_failure(e, &run),
        }
        result
    }

    async fn run_phases(
        &self,
        run: &mut BatchRun,
        kind: BatchKind,
        forms: &[FormItem],
    ) -> Result<BatchOutcome, BatchError> {
        validate_forms(kind, forms)?;
        if forms.is_empty() {
            run.advance(BatchPhase::Committed);
            return Ok(BatchOutcome::empty(run.id));
        }

        let mut txn = self.store.begin().await?;
        match self.plan_and_apply(txn.as_mut(), run, forms).await {
            Ok(items) => {
                txn.commit().await?;
                run.advance(BatchPhase::Committed);
                Ok(BatchOutcome {
                    batch_id: run.id,
                    items,
                    stats: run.stats,
                })
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    tracing::warn!(error = %rollback, "Rollback failed; transaction dropped");
                }
                Err(e)
            }
        }
    }

    async fn plan_and_apply(
        &self,
        txn: &mut dyn PathTxn,
        run: &mut BatchRun,
        forms: &[FormItem],
    ) -> Result<Vec<ItemOutcome>, BatchError> {
        // 1. Snapshot every persisted node the batch references
        let snapshot = read_snapshot(txn, forms).await?;

        // 2. Reject cycles before planning anything
        let view = GraphView::build(forms, &snapshot)?;
        CycleValidator::new(&view).validate()?;
        run.advance(BatchPhase::Validated);

        // 3. Plan inserts, moves and the path rewrite
        let plan = self.plan(txn, run, forms, &snapshot).await?;
        run.advance(BatchPhase::Planned);

        // 4. Write
        run.advance(BatchPhase::Applying);
        self.apply(txn, run, forms, plan).await
    }

    async fn plan(
        &self,
        txn: &mut dyn PathTxn,
        run: &mut BatchRun,
        forms: &[FormItem],
        snapshot: &ClosureSnapshot,
    ) -> Result<BatchPlan, BatchError> {
        let inserts = InsertPlanner::order(forms)?;
        let mut moves = MovePlanner::new(snapshot).plan(forms)?;

        let targets: HashSet<NodeId> = forms
            .iter()
            .filter_map(|form| match form.mode {
                FormMode::Delete { id } => Some(id),
                _ => None,
            })
            .collect();
        let doomed = moves.discard_under(&targets);
        let mut delete_roots: Vec<NodeId> = targets.into_iter().chain(doomed).collect();
        delete_roots.sort();

        let mut summary = PlanSummary {
            inserts: inserts.len(),
            moving: moves.roots().collect(),
            in_place: moves.in_place().len(),
            delete_roots: delete_roots.clone(),
            ..Default::default()
        };
        run.plan = Some(summary.clone());

        let paths = diff_moves(txn, &mut moves).await?;
        summary.record_paths(&paths);
        tracing::debug!(plan = ?summary, "Batch planned");
        run.plan = Some(summary);

        Ok(BatchPlan {
            inserts,
            paths,
            delete_roots,
        })
    }

    async fn apply(
        &self,
        txn: &mut dyn PathTxn,
        run: &mut BatchRun,
        forms: &[FormItem],
        plan: BatchPlan,
    ) -> Result<Vec<ItemOutcome>, BatchError> {
        let now = self.clock.now();
        let BatchPlan {
            inserts,
            paths,
            delete_roots,
        } = plan;

        // 1. Stale rows first, freeing their keys
        for row in &paths.deletes {
            txn.delete_path_by_pk(row.id).await?;
        }
        // 2. Park rows whose key another update is about to take
        for row in &paths.conflicts {
            txn.null_path_endpoints(*row).await?;
        }
        // 3. Retarget reused rows
        for update in &paths.updates {
            txn.update_path(update.row, update.new).await?;
        }
        // 4. Cells no row could be reused for
        if !paths.creates.is_empty() {
            txn.insert_paths(&paths.creates).await?;
        }
        run.stats.paths_deleted = paths.deletes.len();
        run.stats.paths_nulled = paths.conflicts.len();
        run.stats.paths_updated = paths.updates.len();
        run.stats.paths_created = paths.creates.len();
        run.stats.paths_untouched = paths.untouched;

        // 5. Payloads of persisted nodes
        for form in forms {
            if let FormMode::Move { id, .. } | FormMode::EditInPlace { id } = form.mode {
                if !form.payload.as_json().is_null() {
                    txn.update_node_payload(id, &form.payload, now).await?;
                }
            }
        }

        // 6. New nodes, parents before children
        let created = self.insert_nodes(txn, run, forms, &inserts, now).await?;

        // 7. Deletes run last and win over everything above
        let deleted: BTreeSet<NodeId> = if delete_roots.is_empty() {
            BTreeSet::new()
        } else {
            txn.delete_subtree(&delete_roots).await?.into_iter().collect()
        };
        run.stats.nodes_deleted = deleted.len();

        let parked = txn.count_null_paths().await?;
        if parked > 0 {
            return Err(BatchError::UnfilledNullPaths { count: parked });
        }

        forms
            .iter()
            .enumerate()
            .map(|(index, form)| {
                let id = match form.mode.existing_id() {
                    Some(id) => id,
                    None => created.get(&index).copied().ok_or_else(|| {
                        PlanError::malformed_parent(index, "create item was never inserted")
                    })?,
                };
                Ok(if deleted.contains(&id) {
                    ItemOutcome::Deleted
                } else {
                    ItemOutcome::Resolved(id)
                })
            })
            .collect()
    }

    async fn insert_nodes(
        &self,
        txn: &mut dyn PathTxn,
        run: &mut BatchRun,
        forms: &[FormItem],
        steps: &[InsertStep],
        now: DateTime<Utc>,
    ) -> Result<HashMap<usize, NodeId>, BatchError> {
        let mut created: HashMap<usize, NodeId> = HashMap::with_capacity(steps.len());
        for step in steps {
            let parent = match step.parent {
                InsertParent::Root => None,
                InsertParent::Existing(parent) => Some(parent),
                InsertParent::Batch(index) => {
                    let parent = created.get(&index).copied().ok_or_else(|| {
                        PlanError::malformed_parent(
                            step.index,
                            format!("form #{index} not inserted yet"),
                        )
                    })?;
                    Some(parent)
                }
            };

            let form = &forms[step.index];
            let id = self.ids.insert_with_fresh_id(txn, &form.payload, now).await?;

            let mut chain = vec![ClosurePath::self_path(id)];
            if let Some(parent) = parent {
                let ancestors = txn.fetch_ancestors(parent).await?;
                if ancestors.is_empty() {
                    return Err(BatchError::NodeMissing(parent));
                }
                chain.extend(
                    ancestors
                        .iter()
                        .map(|row| ClosurePath::new(row.ancestor(), id, row.depth() + 1)),
                );
            }
            run.stats.paths_created += txn.insert_paths(&chain).await? as usize;
            created.insert(step.index, id);

            tracing::debug!(
                index = step.index,
                id = %id,
                parent = ?parent,
                depth = chain.len() - 1,
                "Node created"
            );
        }
        run.stats.nodes_created = created.len();
        Ok(created)
    }
}

/// Persisted chains of every node the batch mentions.
async fn read_snapshot(
    txn: &mut dyn PathTxn,
    forms: &[FormItem],
) -> Result<ClosureSnapshot, BatchError> {
    let mut referenced = BTreeSet::new();
    for form in forms {
        match form.mode {
            FormMode::CreateChildOfExisting { parent } => {
                referenced.insert(parent);
            }
            FormMode::Move { id, new_parent } => {
                referenced.insert(id);
                referenced.extend(new_parent);
            }
            FormMode::EditInPlace { id } | FormMode::Delete { id } => {
                referenced.insert(id);
            }
            FormMode::CreateRoot | FormMode::CreateChildOfBatch { .. } => {}
        }
    }

    let mut snapshot = ClosureSnapshot::new();
    for node in referenced {
        let rows = txn.fetch_ancestors(node).await?;
        snapshot.insert_rows(node, &rows)?;
    }
    tracing::debug!(nodes = snapshot.len(), "Closure snapshot read");
    Ok(snapshot)
}

/// Reads each moving subtree's rows and diffs them into one path plan.
async fn diff_moves(txn: &mut dyn PathTxn, moves: &mut MovePlan) -> Result<PathPlan, BatchError> {
    if moves.is_empty() {
        return Ok(PathPlan::default());
    }

    let roots: Vec<NodeId> = moves.roots().collect();
    let mut descendants: BTreeMap<NodeId, Vec<Relative>> = BTreeMap::new();
    for root in roots {
        let rows = txn.fetch_descendants(root).await?;
        descendants.insert(
            root,
            rows.iter()
                .map(|row| Relative::new(row.descendant(), row.depth()))
                .collect(),
        );
    }
    moves.resolve_segments(&descendants)?;

    let mut diff = PathDiff::new();
    for subtree in moves.subtrees() {
        let ancestors: Vec<NodeId> = subtree.old_ancestors.iter().map(|r| r.node).collect();
        let members: Vec<NodeId> = subtree.segment.iter().map(|r| r.node).collect();
        let rows = txn.fetch_paths(&ancestors, &members).await?;
        diff.add_subtree(subtree, &rows)?;
    }
    Ok(diff.finish()?)
}

fn log_failure(err: &BatchError, run: &BatchRun) {
    let kind = err.kind_name();
    let phase = run.phase;
    match err.class() {
        ErrorClass::Internal => match &run.plan {
            Some(plan) => tracing::error!(
                error = %err,
                kind,
                phase = %phase,
                inserts = plan.inserts,
                moving = ?plan.moving,
                in_place = plan.in_place,
                updates = plan.updates,
                creates = plan.creates,
                deletes = plan.deletes,
                conflicts = plan.conflicts,
                delete_roots = ?plan.delete_roots,
                "Batch failed on an internal invariant"
            ),
            None => tracing::error!(
                error = %err,
                kind,
                phase = %phase,
                "Batch failed on an internal invariant before planning"
            ),
        },
        ErrorClass::Input => {
            tracing::info!(error = %err, kind, phase = %phase, "Batch rejected")
        }
        ErrorClass::Conflict | ErrorClass::Storage => {
            tracing::warn!(error = %err, kind, phase = %phase, "Batch rolled back")
        }
    }
}
