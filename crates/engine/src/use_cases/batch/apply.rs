//! Batch outcome types and the phase a batch has reached.

use std::fmt;

use treeline_domain::{BatchId, ItemOutcome, NodeId, PathPlan};

/// Where a batch is in its lifecycle. Failures are terminal at the phase
/// they occur in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BatchPhase {
    Start,
    /// Wire items converted to form items.
    Parsed,
    /// Modes checked and no cycle found.
    Validated,
    /// Inserts ordered, moves ordered and path mutations computed.
    Planned,
    /// Writing inside the transaction.
    Applying,
    Committed,
}

impl BatchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Parsed => "parsed",
            Self::Validated => "validated",
            Self::Planned => "planned",
            Self::Applying => "applying",
            Self::Committed => "committed",
        }
    }
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row and node counts for one committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub nodes_created: usize,
    pub nodes_deleted: usize,
    /// Closure rows rewritten in place.
    pub paths_updated: usize,
    /// Closure rows inserted, new-node chains included.
    pub paths_created: usize,
    /// Closure rows removed by the path plan. Subtree deletes are counted in nodes.
    pub paths_deleted: usize,
    /// Rows parked with null endpoints before being filled.
    pub paths_nulled: usize,
    /// Reused rows whose key and depth did not change.
    pub paths_untouched: usize,
}

impl ApplyStats {
    /// True when the batch wrote no closure rows.
    pub fn paths_unchanged(&self) -> bool {
        self.paths_updated == 0
            && self.paths_created == 0
            && self.paths_deleted == 0
            && self.paths_nulled == 0
            && self.nodes_deleted == 0
    }
}

/// Shape of the plan, kept on the run so failures can be logged with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub inserts: usize,
    /// Moving roots in dependency order.
    pub moving: Vec<NodeId>,
    pub in_place: usize,
    pub updates: usize,
    pub creates: usize,
    pub deletes: usize,
    pub conflicts: usize,
    pub delete_roots: Vec<NodeId>,
}

impl PlanSummary {
    pub fn record_paths(&mut self, paths: &PathPlan) {
        self.updates = paths.updates.len();
        self.creates = paths.creates.len();
        self.deletes = paths.deletes.len();
        self.conflicts = paths.conflicts.len();
    }
}

/// Result of a committed batch: one outcome per form item, in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub batch_id: BatchId,
    pub items: Vec<ItemOutcome>,
    pub stats: ApplyStats,
}

impl BatchOutcome {
    pub fn empty(batch_id: BatchId) -> Self {
        Self {
            batch_id,
            items: Vec::new(),
            stats: ApplyStats::default(),
        }
    }
}

/// Per-batch bookkeeping threaded through the coordinator.
#[derive(Debug)]
pub(super) struct BatchRun {
    pub id: BatchId,
    pub phase: BatchPhase,
    pub stats: ApplyStats,
    /// Set once the moves are ordered; path counts follow after the diff.
    pub plan: Option<PlanSummary>,
}

impl BatchRun {
    pub fn new(id: BatchId) -> Self {
        Self {
            id,
            phase: BatchPhase::Start,
            stats: ApplyStats::default(),
            plan: None,
        }
    }

    pub fn advance(&mut self, next: BatchPhase) {
        tracing::debug!(from = %self.phase, to = %next, "Batch phase");
        self.phase = next;
    }
}
