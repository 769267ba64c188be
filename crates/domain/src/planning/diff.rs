//! Path diff: turn moving subtrees into row-level closure mutations.
//!
//! Old rows are reused wherever possible so the table sees updates rather than
//! delete + insert churn. Reuse goes in three rounds:
//!
//! 1. per descendant, a row whose ancestor survives the move keeps its key and
//!    at most changes depth;
//! 2. per descendant, leftover rows are retargeted to leftover cells, deepest first;
//! 3. across the batch, still-unmatched cells take whatever rows remain.
//!
//! Cells left after that are created, rows left after that are deleted.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::entities::{ClosurePath, PathRow};
use crate::error::PlanError;
use crate::ids::{NodeId, PathRowId};

use super::moves::MovingSubtree;

/// An existing row rewritten to a new cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathUpdate {
    pub row: PathRowId,
    pub old: ClosurePath,
    pub new: ClosurePath,
}

impl PathUpdate {
    /// Same endpoints, only the depth moves.
    pub fn is_depth_only(&self) -> bool {
        self.old.endpoints() == self.new.endpoints()
    }
}

/// Row-level mutations for a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathPlan {
    pub updates: Vec<PathUpdate>,
    pub creates: Vec<ClosurePath>,
    pub deletes: Vec<PathRow>,
    /// Rows in `updates` whose current key is another update's target. They are
    /// nulled before any update runs and filled by their own update.
    pub conflicts: Vec<PathRowId>,
    /// Rows that already hold their final cell.
    pub untouched: usize,
}

impl PathPlan {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.creates.is_empty() && self.deletes.is_empty()
    }
}

/// Tracks which persisted rows the batch already gave a job to.
#[derive(Debug, Default)]
pub struct ClaimLedger {
    claims: HashMap<PathRowId, ClosurePath>,
}

impl ClaimLedger {
    /// Records `row` as claimed for `purpose`. A second claim is a planner bug.
    pub fn claim(&mut self, row: &PathRow, purpose: ClosurePath) -> Result<(), PlanError> {
        if let Some(first) = self.claims.get(&row.id) {
            return Err(PlanError::DuplicatePathAssignment {
                row: row.id,
                first: *first,
                second: purpose,
            });
        }
        self.claims.insert(row.id, purpose);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

/// Accumulates moving subtrees, then produces one [`PathPlan`].
#[derive(Debug, Default)]
pub struct PathDiff {
    ledger: ClaimLedger,
    plan: PathPlan,
    spare_rows: Vec<PathRow>,
    spare_cells: Vec<ClosurePath>,
}

impl PathDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diffs one subtree.
    ///
    /// `old_rows` are the persisted rows linking the subtree's old ancestors to
    /// the members of its segment. Rows outside that rectangle are ignored.
    pub fn add_subtree(
        &mut self,
        subtree: &MovingSubtree,
        old_rows: &[PathRow],
    ) -> Result<(), PlanError> {
        let old_ancestors: HashSet<NodeId> =
            subtree.old_ancestors.iter().map(|r| r.node).collect();

        let mut rows_by_descendant: BTreeMap<NodeId, Vec<PathRow>> = BTreeMap::new();
        for row in old_rows {
            if old_ancestors.contains(&row.ancestor()) {
                rows_by_descendant
                    .entry(row.descendant())
                    .or_default()
                    .push(*row);
            }
        }

        let (updates_before, spare_rows_before, spare_cells_before) = (
            self.plan.updates.len(),
            self.spare_rows.len(),
            self.spare_cells.len(),
        );

        for member in &subtree.segment {
            let mut rows = rows_by_descendant.remove(&member.node).unwrap_or_default();
            rows.sort_by(|a, b| b.depth().cmp(&a.depth()).then(a.id.cmp(&b.id)));

            // Deepest ancestor first.
            let mut cells: Vec<ClosurePath> = subtree
                .new_ancestors
                .iter()
                .rev()
                .map(|a| ClosurePath::new(a.node, member.node, a.depth + member.depth))
                .collect();

            // Round 1: the ancestor survives, only depth can change.
            let mut leftover_rows = Vec::with_capacity(rows.len());
            for row in rows {
                match cells.iter().position(|c| c.ancestor == row.ancestor()) {
                    Some(pos) => {
                        let cell = cells.remove(pos);
                        self.assign(row, cell)?;
                    }
                    None => leftover_rows.push(row),
                }
            }

            // Round 2: retarget within the descendant.
            let paired = leftover_rows.len().min(cells.len());
            let rest_rows = leftover_rows.split_off(paired);
            let rest_cells = cells.split_off(paired);
            for (row, cell) in leftover_rows.into_iter().zip(cells) {
                self.assign(row, cell)?;
            }
            self.spare_rows.extend(rest_rows);
            self.spare_cells.extend(rest_cells);
        }

        tracing::debug!(
            root = %subtree.root,
            segment = subtree.segment.len(),
            updates = self.plan.updates.len() - updates_before,
            spare_rows = self.spare_rows.len() - spare_rows_before,
            spare_cells = self.spare_cells.len() - spare_cells_before,
            "Subtree paths diffed"
        );
        Ok(())
    }

    /// Round 3 and conflict detection.
    pub fn finish(mut self) -> Result<PathPlan, PlanError> {
        let spare_rows = std::mem::take(&mut self.spare_rows);
        let spare_cells = std::mem::take(&mut self.spare_cells);
        let mut rows = spare_rows.into_iter();
        for cell in spare_cells {
            match rows.next() {
                Some(row) => self.assign(row, cell)?,
                None => self.plan.creates.push(cell),
            }
        }
        for row in rows {
            self.ledger.claim(&row, row.path)?;
            self.plan.deletes.push(row);
        }

        // Guard only: round 1 keeps every surviving key on its own row, so no
        // update targets another update's current key and this stays empty.
        self.plan.conflicts = detect_conflicts(&self.plan.updates);

        tracing::debug!(
            updates = self.plan.updates.len(),
            creates = self.plan.creates.len(),
            deletes = self.plan.deletes.len(),
            conflicts = self.plan.conflicts.len(),
            untouched = self.plan.untouched,
            claimed = self.ledger.len(),
            "Path plan ready"
        );
        Ok(self.plan)
    }

    fn assign(&mut self, row: PathRow, cell: ClosurePath) -> Result<(), PlanError> {
        self.ledger.claim(&row, cell)?;
        if row.path == cell {
            self.plan.untouched += 1;
        } else {
            self.plan.updates.push(PathUpdate {
                row: row.id,
                old: row.path,
                new: cell,
            });
        }
        Ok(())
    }
}

/// Rows whose current key is the target of a different update.
pub fn detect_conflicts(updates: &[PathUpdate]) -> Vec<PathRowId> {
    let targets: HashMap<(NodeId, NodeId), PathRowId> = updates
        .iter()
        .map(|u| (u.new.endpoints(), u.row))
        .collect();
    updates
        .iter()
        .filter(|u| {
            targets
                .get(&u.old.endpoints())
                .is_some_and(|target_row| *target_row != u.row)
        })
        .map(|u| u.row)
        .collect()
}
