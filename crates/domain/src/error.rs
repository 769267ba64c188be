//! Planning errors for the domain layer
//!
//! Everything the pure planners can reject a batch for. Storage failures live in the
//! engine; this enum never carries I/O errors.

use thiserror::Error;

use crate::entities::{BatchKind, ClosurePath};
use crate::graph::NodeKey;
use crate::ids::{NodeId, PathRowId};

/// Reasons a batch cannot be planned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// The proposed edges close a directed cycle. `path` starts and ends on the same node.
    #[error("{} will form a loop, which is not allowed in a closure table", join_keys(.path))]
    LoopDetected { path: Vec<NodeKey> },

    /// A referenced persisted node does not exist
    #[error("Node not found: {0}")]
    NodeMissing(NodeId),

    /// The same persisted node is targeted by more than one form item
    #[error("Node {0} appears in more than one form item")]
    DuplicateFormId(NodeId),

    /// A batch-local parent reference points nowhere usable
    #[error("Form #{index} has a malformed parent reference: {reason}")]
    MalformedParentRef { index: usize, reason: String },

    /// A form mode the batch kind does not allow
    #[error("Form #{index} ({mode}) is not allowed in a {kind} batch")]
    UnexpectedMode {
        index: usize,
        mode: &'static str,
        kind: BatchKind,
    },

    /// Moving subtrees depend on each other in a circle.
    ///
    /// The cycle validator runs first, so reaching this is an internal bug.
    #[error("Cannot order moving subtrees; still pending: {}", join_ids(.pending))]
    ReorderDeadlock { pending: Vec<NodeId> },

    /// Two plan entries claimed the same closure row.
    #[error("Path row {row} claimed twice: first for {first}, then for {second}")]
    DuplicatePathAssignment {
        row: PathRowId,
        first: ClosurePath,
        second: ClosurePath,
    },
}

impl PlanError {
    pub fn malformed_parent(index: usize, reason: impl Into<String>) -> Self {
        Self::MalformedParentRef {
            index,
            reason: reason.into(),
        }
    }

    /// Errors that indicate a planner bug rather than bad input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::ReorderDeadlock { .. } | Self::DuplicatePathAssignment { .. }
        )
    }
}

fn join_keys(path: &[NodeKey]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
