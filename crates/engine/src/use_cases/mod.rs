//! Use cases - request orchestration.
//!
//! Use cases coordinate the domain planners with the path store ports.

pub mod batch;

pub use batch::{ApplyBatch, BatchError, BatchOutcome};
