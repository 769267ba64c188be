//! Ordering of new-node inserts so batch-local parents exist first.

use crate::entities::{FormItem, FormMode};
use crate::error::PlanError;
use crate::graph::NodeKey;
use crate::ids::NodeId;

/// Where a new node attaches once its turn comes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertParent {
    Root,
    Existing(NodeId),
    /// Another create item of the batch, by position. Always earlier in the order.
    Batch(usize),
}

/// One node to persist, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertStep {
    pub index: usize,
    pub parent: InsertParent,
}

pub struct InsertPlanner;

impl InsertPlanner {
    /// Orders the batch's create items.
    ///
    /// Roots and children of persisted nodes keep request order; children of
    /// batch nodes follow in passes, each pass admitting every item whose
    /// parent is already placed.
    pub fn order(forms: &[FormItem]) -> Result<Vec<InsertStep>, PlanError> {
        let mut placed = vec![false; forms.len()];
        let mut steps = Vec::new();
        let mut pending = Vec::new();

        for (index, form) in forms.iter().enumerate() {
            let parent = match form.mode {
                FormMode::CreateRoot => InsertParent::Root,
                FormMode::CreateChildOfExisting { parent } => InsertParent::Existing(parent),
                FormMode::CreateChildOfBatch { index: target } => {
                    let valid = forms.get(target).is_some_and(|f| f.mode.is_create());
                    if !valid {
                        return Err(PlanError::malformed_parent(
                            index,
                            format!("form #{target} is not a create item of this batch"),
                        ));
                    }
                    pending.push((index, target));
                    continue;
                }
                _ => continue,
            };
            placed[index] = true;
            steps.push(InsertStep { index, parent });
        }

        while !pending.is_empty() {
            let before = pending.len();
            let mut still_pending = Vec::with_capacity(before);
            for (index, target) in pending {
                if placed[target] {
                    placed[index] = true;
                    steps.push(InsertStep {
                        index,
                        parent: InsertParent::Batch(target),
                    });
                } else {
                    still_pending.push((index, target));
                }
            }
            if still_pending.len() == before {
                return Err(PlanError::LoopDetected {
                    path: pending_loop(&still_pending),
                });
            }
            pending = still_pending;
        }

        tracing::debug!(
            creates = steps.len(),
            order = ?steps.iter().map(|s| s.index).collect::<Vec<_>>(),
            "Insert order planned"
        );
        Ok(steps)
    }
}

/// Follows parent references from the first stuck item until one repeats.
fn pending_loop(pending: &[(usize, usize)]) -> Vec<NodeKey> {
    let Some(&(start, _)) = pending.first() else {
        return Vec::new();
    };
    let target_of = |index: usize| pending.iter().find(|(i, _)| *i == index).map(|(_, t)| *t);

    let mut walk = vec![start];
    let mut current = start;
    while let Some(next) = target_of(current) {
        if let Some(pos) = walk.iter().position(|i| *i == next) {
            let mut path: Vec<NodeKey> = walk[pos..].iter().map(|i| NodeKey::Batch(*i)).collect();
            path.push(NodeKey::Batch(next));
            return path;
        }
        walk.push(next);
        current = next;
    }
    walk.into_iter().map(NodeKey::Batch).collect()
}
