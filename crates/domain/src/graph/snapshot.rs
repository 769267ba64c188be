//! Persisted ancestor chains of the nodes a batch touches.

use std::collections::BTreeMap;

use crate::entities::{PathRow, Relative};
use crate::error::PlanError;
use crate::ids::NodeId;

/// Projection of the closure table onto the nodes a batch references.
///
/// Each chain is ordered by depth ascending and starts with the node itself at
/// depth 0, so `chain[1]` (when present) is the current parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosureSnapshot {
    chains: BTreeMap<NodeId, Vec<Relative>>,
}

impl ClosureSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `node` from the rows returned by an ancestor fetch.
    ///
    /// Rows describing other descendants are ignored. A node without a self row
    /// does not exist.
    pub fn insert_rows(&mut self, node: NodeId, rows: &[PathRow]) -> Result<(), PlanError> {
        let mut chain: Vec<Relative> = rows
            .iter()
            .filter(|row| row.descendant() == node)
            .map(|row| Relative::new(row.ancestor(), row.depth()))
            .collect();
        chain.sort_by_key(|r| (r.depth, r.node));
        match chain.first() {
            Some(first) if first.depth == 0 && first.node == node => {
                self.chains.insert(node, chain);
                Ok(())
            }
            _ => Err(PlanError::NodeMissing(node)),
        }
    }

    /// Record a chain directly. `chain` must start with `node` at depth 0.
    pub fn insert_chain(&mut self, node: NodeId, mut chain: Vec<Relative>) {
        chain.sort_by_key(|r| (r.depth, r.node));
        self.chains.insert(node, chain);
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.chains.contains_key(&node)
    }

    pub fn chain(&self, node: NodeId) -> Option<&[Relative]> {
        self.chains.get(&node).map(Vec::as_slice)
    }

    /// Current depth-1 ancestor.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.chains
            .get(&node)
            .and_then(|chain| chain.iter().find(|r| r.depth == 1))
            .map(|r| r.node)
    }

    /// Ancestors at depth >= 1, nearest first.
    pub fn proper_ancestors(&self, node: NodeId) -> Vec<Relative> {
        self.chains
            .get(&node)
            .map(|chain| chain.iter().filter(|r| r.depth > 0).copied().collect())
            .unwrap_or_default()
    }

    pub fn chains(&self) -> impl Iterator<Item = (NodeId, &[Relative])> + '_ {
        self.chains.iter().map(|(node, chain)| (*node, chain.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
