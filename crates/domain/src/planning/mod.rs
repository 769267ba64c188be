//! Batch planners.
//!
//! Pure functions over form items and closure snapshots; the engine feeds them
//! rows read inside the batch transaction and applies what they return.

mod diff;
mod insert;
mod moves;

use std::collections::HashSet;

use crate::entities::{BatchKind, FormItem};
use crate::error::PlanError;

pub use diff::{detect_conflicts, ClaimLedger, PathDiff, PathPlan, PathUpdate};
pub use insert::{InsertParent, InsertPlanner, InsertStep};
pub use moves::{MovePlan, MovePlanner, MovingSubtree, NestedMove, NestedMoveKind};

/// Checks that need nothing but the request itself.
///
/// Every mode must be allowed by `kind`, and no persisted node may be the
/// target of more than one item.
pub fn validate_forms(kind: BatchKind, forms: &[FormItem]) -> Result<(), PlanError> {
    let mut seen = HashSet::new();
    for (index, form) in forms.iter().enumerate() {
        if !kind.permits(&form.mode) {
            return Err(PlanError::UnexpectedMode {
                index,
                mode: form.mode.label(),
                kind,
            });
        }
        if let Some(id) = form.mode.existing_id() {
            if !seen.insert(id) {
                return Err(PlanError::DuplicateFormId(id));
            }
        }
    }
    Ok(())
}
