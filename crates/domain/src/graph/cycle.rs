//! Loop detection over a [`GraphView`].

use super::{GraphView, NodeKey};
use crate::error::PlanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

/// Rejects graph views whose proposed edges close a directed cycle.
///
/// Runs an iterative depth-first search along child edges, starting from the
/// child of each proposed edge in batch order. Edges hanging from ROOT are
/// skipped because ROOT has no incoming edge and so never sits on a loop.
pub struct CycleValidator<'a> {
    view: &'a GraphView,
}

impl<'a> CycleValidator<'a> {
    pub fn new(view: &'a GraphView) -> Self {
        Self { view }
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        let mut colors = vec![Color::White; self.view.len()];

        for edge in self.view.proposed_edges() {
            if edge.parent == NodeKey::Root {
                continue;
            }
            let Some(start) = self.view.slot_of(edge.child) else {
                continue;
            };
            if colors[start] != Color::White {
                continue;
            }
            if let Some(path) = self.search(start, &mut colors) {
                tracing::debug!(
                    form_index = edge.index,
                    length = path.len() - 1,
                    "Loop found while validating batch"
                );
                return Err(PlanError::LoopDetected { path });
            }
        }
        Ok(())
    }

    /// Returns the loop, first node repeated at the end, if one is reachable.
    fn search(&self, start: usize, colors: &mut [Color]) -> Option<Vec<NodeKey>> {
        // (slot, index of the next child to visit)
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        colors[start] = Color::Grey;

        while let Some(top) = stack.len().checked_sub(1) {
            let (slot, next) = stack[top];
            let children = self.view.child_slots(slot);
            let Some(&child) = children.get(next) else {
                colors[slot] = Color::Black;
                stack.pop();
                continue;
            };
            stack[top].1 += 1;

            match colors[child] {
                Color::White => {
                    colors[child] = Color::Grey;
                    stack.push((child, 0));
                }
                Color::Grey => {
                    let from = stack.iter().position(|(s, _)| *s == child).unwrap_or(0);
                    let mut path: Vec<NodeKey> = stack[from..]
                        .iter()
                        .map(|(s, _)| self.view.key_at(*s))
                        .collect();
                    path.push(self.view.key_at(child));
                    return Some(path);
                }
                Color::Black => {}
            }
        }
        None
    }
}
