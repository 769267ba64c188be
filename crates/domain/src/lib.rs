//! Closure-table hierarchy domain: ids, path rows, batch forms and the pure
//! planners that turn a batch into row mutations.

pub mod entities;
pub mod error;
pub mod graph;
pub mod ids;
pub mod planning;

pub use entities::{
    BatchKind, ClosurePath, FormItem, FormMode, ItemOutcome, NodePayload, PathRow, Relative,
};
pub use error::PlanError;
pub use graph::{ClosureSnapshot, CycleValidator, GraphView, NodeKey, ProposedEdge};
pub use ids::{BatchId, NodeId, PathRowId};
pub use planning::{
    detect_conflicts, validate_forms, ClaimLedger, InsertParent, InsertPlanner, InsertStep,
    MovePlan, MovePlanner, MovingSubtree, NestedMove, NestedMoveKind, PathDiff, PathPlan,
    PathUpdate,
};
