//! Batch-level errors.

use treeline_domain::{ClosurePath, NodeId, NodeKey, PathRowId, PlanError};
use treeline_shared::{BatchErrorResponse, ErrorCode};

use crate::infrastructure::ports::StoreError;

/// Coarse category of a [`BatchError`], used for logging and status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request itself is wrong; resubmitting it unchanged fails again.
    Input,
    /// Storage rejected a write on a uniqueness constraint.
    Conflict,
    /// A planner or allocator invariant broke.
    Internal,
    /// The database failed; the caller may retry.
    Storage,
}

/// Everything a batch can fail with. The transaction is always rolled back.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("{} will form a loop, which is not allowed in a closure table", join_keys(.path))]
    LoopDetected { path: Vec<NodeKey> },

    #[error("Node not found: {0}")]
    NodeMissing(NodeId),

    #[error("Node {0} appears in more than one form item")]
    DuplicateFormId(NodeId),

    #[error("Form #{index} has a malformed parent reference: {reason}")]
    MalformedParentRef { index: usize, reason: String },

    #[error("Form #{index} ({mode}) is not allowed in a {kind} batch")]
    UnexpectedMode {
        index: usize,
        mode: &'static str,
        kind: treeline_domain::BatchKind,
    },

    #[error("Path conflict: {0} collides with an existing row")]
    PathConflict(ClosurePath),

    #[error("No free node id after {attempts} attempts")]
    IdExhausted { attempts: u32 },

    #[error("Cannot order moving subtrees; still pending: {pending:?}")]
    ReorderDeadlock { pending: Vec<NodeId> },

    #[error("Path row {row} claimed twice: first for {first}, then for {second}")]
    DuplicatePathAssignment {
        row: PathRowId,
        first: ClosurePath,
        second: ClosurePath,
    },

    #[error("{count} closure rows still have null endpoints before commit")]
    UnfilledNullPaths { count: u64 },

    #[error("Storage failed: {0}")]
    StorageFailed(String),
}

impl BatchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::LoopDetected { .. }
            | Self::NodeMissing(_)
            | Self::DuplicateFormId(_)
            | Self::MalformedParentRef { .. }
            | Self::UnexpectedMode { .. } => ErrorClass::Input,
            Self::PathConflict(_) => ErrorClass::Conflict,
            Self::IdExhausted { .. }
            | Self::ReorderDeadlock { .. }
            | Self::DuplicatePathAssignment { .. }
            | Self::UnfilledNullPaths { .. } => ErrorClass::Internal,
            Self::StorageFailed(_) => ErrorClass::Storage,
        }
    }

    /// Stable snake_case name for wire responses and log fields.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::LoopDetected { .. } => "loop_detected",
            Self::NodeMissing(_) => "node_missing",
            Self::DuplicateFormId(_) => "duplicate_form_id",
            Self::MalformedParentRef { .. } => "malformed_parent_ref",
            Self::UnexpectedMode { .. } => "unexpected_mode",
            Self::PathConflict(_) => "path_conflict",
            Self::IdExhausted { .. } => "id_exhausted",
            Self::ReorderDeadlock { .. } => "reorder_deadlock",
            Self::DuplicatePathAssignment { .. } => "duplicate_path_assignment",
            Self::UnfilledNullPaths { .. } => "unfilled_null_paths",
            Self::StorageFailed(_) => "storage_failed",
        }
    }

    /// Wire form of this error.
    pub fn to_response(&self) -> BatchErrorResponse {
        let code = match (self.class(), self) {
            (_, Self::NodeMissing(_)) => ErrorCode::NotFound,
            (ErrorClass::Input, _) => ErrorCode::BadRequest,
            (ErrorClass::Conflict, _) => ErrorCode::Conflict,
            (ErrorClass::Internal, _) => ErrorCode::InternalError,
            (ErrorClass::Storage, _) => ErrorCode::ServiceUnavailable,
        };
        let response = BatchErrorResponse::new(code, self.kind_name(), self.to_string());
        match self.loop_path() {
            Some(path) => response.with_loop_path(path.iter().map(ToString::to_string).collect()),
            None => response,
        }
    }

    /// The loop members, for `LoopDetected` only.
    pub fn loop_path(&self) -> Option<&[NodeKey]> {
        match self {
            Self::LoopDetected { path } => Some(path),
            _ => None,
        }
    }
}

impl From<PlanError> for BatchError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::LoopDetected { path } => Self::LoopDetected { path },
            PlanError::NodeMissing(id) => Self::NodeMissing(id),
            PlanError::DuplicateFormId(id) => Self::DuplicateFormId(id),
            PlanError::MalformedParentRef { index, reason } => {
                Self::MalformedParentRef { index, reason }
            }
            PlanError::UnexpectedMode { index, mode, kind } => {
                Self::UnexpectedMode { index, mode, kind }
            }
            PlanError::ReorderDeadlock { pending } => Self::ReorderDeadlock { pending },
            PlanError::DuplicatePathAssignment { row, first, second } => {
                Self::DuplicatePathAssignment { row, first, second }
            }
        }
    }
}

impl From<StoreError> for BatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PathConflict(path) => Self::PathConflict(path),
            StoreError::NodeMissing(id) => Self::NodeMissing(id),
            other => Self::StorageFailed(other.to_string()),
        }
    }
}

fn join_keys(path: &[NodeKey]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_errors_keep_their_class() {
        let looped: BatchError = PlanError::LoopDetected {
            path: vec![
                NodeKey::Existing(NodeId::new(1)),
                NodeKey::Existing(NodeId::new(2)),
                NodeKey::Existing(NodeId::new(1)),
            ],
        }
        .into();
        assert_eq!(looped.class(), ErrorClass::Input);
        assert_eq!(looped.kind_name(), "loop_detected");
        assert_eq!(looped.loop_path().map(<[NodeKey]>::len), Some(3));
        assert_eq!(
            looped.to_string(),
            "1, 2, 1 will form a loop, which is not allowed in a closure table"
        );

        let deadlock: BatchError = PlanError::ReorderDeadlock {
            pending: vec![NodeId::new(3)],
        }
        .into();
        assert_eq!(deadlock.class(), ErrorClass::Internal);
    }

    #[test]
    fn responses_carry_code_and_loop() {
        let looped = BatchError::LoopDetected {
            path: vec![NodeKey::Batch(0), NodeKey::Batch(1), NodeKey::Batch(0)],
        };
        let response = looped.to_response();
        assert_eq!(response.code, ErrorCode::BadRequest);
        assert_eq!(response.kind, "loop_detected");
        assert_eq!(response.loop_path, vec!["form #0", "form #1", "form #0"]);

        let missing = BatchError::NodeMissing(NodeId::new(5)).to_response();
        assert_eq!(missing.code, ErrorCode::NotFound);
        assert!(missing.loop_path.is_empty());

        let storage = BatchError::StorageFailed("pool timed out".into()).to_response();
        assert_eq!(storage.code, ErrorCode::ServiceUnavailable);
    }

    #[test]
    fn store_errors_collapse_to_storage_failed() {
        let conflict: BatchError =
            StoreError::PathConflict(ClosurePath::new(NodeId::new(1), NodeId::new(2), 1)).into();
        assert_eq!(conflict.class(), ErrorClass::Conflict);

        let missing: BatchError = StoreError::NodeMissing(NodeId::new(9)).into();
        assert!(matches!(missing, BatchError::NodeMissing(id) if id == NodeId::new(9)));

        let closed: BatchError = StoreError::TransactionClosed.into();
        assert_eq!(closed.class(), ErrorClass::Storage);
        assert_eq!(closed.kind_name(), "storage_failed");

        let taken: BatchError = StoreError::NodeIdTaken(NodeId::new(4)).into();
        assert!(matches!(taken, BatchError::StorageFailed(_)));
    }
}
