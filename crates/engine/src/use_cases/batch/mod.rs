//! Batch mutation use cases.

mod apply;
mod coordinator;
mod error;
mod id_alloc;

pub use apply::{ApplyStats, BatchOutcome, BatchPhase, PlanSummary};
pub use coordinator::ApplyBatch;
pub use error::{BatchError, ErrorClass};
pub use id_alloc::IdAllocator;
