//! In-memory view of the forest a batch operates on.
//!
//! The view combines the persisted ancestor chains of every node the batch
//! references with the edges the batch proposes. Nodes live in an arena and are
//! addressed by slot; slot 0 is the synthetic ROOT every parentless node hangs from.

mod cycle;
mod snapshot;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entities::{FormItem, FormMode};
use crate::error::PlanError;
use crate::ids::NodeId;

pub use cycle::CycleValidator;
pub use snapshot::ClosureSnapshot;

/// Identity of a node inside the view.
///
/// Ordering puts ROOT first, then batch-local nodes by position, then persisted
/// nodes by id, which is also the tie-break order for traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NodeKey {
    Root,
    Batch(usize),
    Existing(NodeId),
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Root => write!(f, "ROOT"),
            NodeKey::Batch(index) => write!(f, "form #{index}"),
            NodeKey::Existing(id) => write!(f, "{id}"),
        }
    }
}

/// A parent -> child edge a form item asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposedEdge {
    /// Position of the form item in the batch.
    pub index: usize,
    pub parent: NodeKey,
    pub child: NodeKey,
}

const ROOT_SLOT: usize = 0;

/// Adjacency and reverse adjacency over the batch's slice of the forest.
#[derive(Debug, Clone)]
pub struct GraphView {
    keys: Vec<NodeKey>,
    slots: HashMap<NodeKey, usize>,
    parents: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    proposed: Vec<ProposedEdge>,
}

impl GraphView {
    /// Assemble the view: persisted chains first, then the batch's edges on top.
    ///
    /// A `Move` replaces the node's persisted parent; create items attach their
    /// batch-local node to a persisted parent, another batch node, or ROOT.
    pub fn build(forms: &[FormItem], snapshot: &ClosureSnapshot) -> Result<Self, PlanError> {
        let mut view = Self {
            keys: vec![NodeKey::Root],
            slots: HashMap::from([(NodeKey::Root, ROOT_SLOT)]),
            parents: vec![None],
            children: Vec::new(),
            proposed: Vec::new(),
        };

        for (_, chain) in snapshot.chains() {
            for pair in chain.windows(2) {
                let child = view.slot(NodeKey::Existing(pair[0].node));
                let parent = view.slot(NodeKey::Existing(pair[1].node));
                view.parents[child] = Some(parent);
            }
            if let Some(first) = chain.first() {
                view.slot(NodeKey::Existing(first.node));
            }
        }

        for (index, form) in forms.iter().enumerate() {
            let edge = match form.mode {
                FormMode::CreateRoot => Some((NodeKey::Root, NodeKey::Batch(index))),
                FormMode::CreateChildOfExisting { parent } => {
                    if !snapshot.contains(parent) {
                        return Err(PlanError::NodeMissing(parent));
                    }
                    Some((NodeKey::Existing(parent), NodeKey::Batch(index)))
                }
                FormMode::CreateChildOfBatch { index: target } => {
                    let target_is_create = forms
                        .get(target)
                        .map(|f| f.mode.is_create())
                        .unwrap_or(false);
                    if !target_is_create {
                        return Err(PlanError::malformed_parent(
                            index,
                            format!("form #{target} is not a create item of this batch"),
                        ));
                    }
                    Some((NodeKey::Batch(target), NodeKey::Batch(index)))
                }
                FormMode::Move { id, new_parent } => {
                    for node in std::iter::once(id).chain(new_parent) {
                        if !snapshot.contains(node) {
                            return Err(PlanError::NodeMissing(node));
                        }
                    }
                    let parent = new_parent.map(NodeKey::Existing).unwrap_or(NodeKey::Root);
                    Some((parent, NodeKey::Existing(id)))
                }
                FormMode::EditInPlace { .. } | FormMode::Delete { .. } => None,
            };

            if let Some((parent, child)) = edge {
                let parent_slot = view.slot(parent);
                let child_slot = view.slot(child);
                view.parents[child_slot] = Some(parent_slot);
                view.proposed.push(ProposedEdge {
                    index,
                    parent,
                    child,
                });
            }
        }

        view.link_children();
        tracing::trace!(
            nodes = view.keys.len(),
            proposed = view.proposed.len(),
            "Graph view assembled"
        );
        Ok(view)
    }

    fn slot(&mut self, key: NodeKey) -> usize {
        if let Some(slot) = self.slots.get(&key) {
            return *slot;
        }
        let slot = self.keys.len();
        self.keys.push(key);
        self.slots.insert(key, slot);
        self.parents.push(Some(ROOT_SLOT));
        slot
    }

    fn link_children(&mut self) {
        let mut children = vec![Vec::new(); self.keys.len()];
        for (slot, parent) in self.parents.iter().enumerate() {
            if let Some(parent) = parent {
                children[*parent].push(slot);
            }
        }
        for list in &mut children {
            list.sort_by_key(|slot| self.keys[*slot]);
        }
        self.children = children;
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.len() <= 1
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.slots.contains_key(&key)
    }

    /// Edges requested by the batch, in batch order.
    pub fn proposed_edges(&self) -> &[ProposedEdge] {
        &self.proposed
    }

    /// Depth-1 ancestor. Nodes hanging from ROOT have none.
    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        let slot = *self.slots.get(&key)?;
        match self.parents[slot] {
            Some(ROOT_SLOT) | None => None,
            Some(parent) => Some(self.keys[parent]),
        }
    }

    /// Depth-1 descendants, in key order.
    pub fn children(&self, key: NodeKey) -> Vec<NodeKey> {
        self.slots
            .get(&key)
            .map(|slot| {
                self.child_slots(*slot)
                    .iter()
                    .map(|child| self.keys[*child])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ancestors of `key`, root first, excluding ROOT and `key` itself.
    ///
    /// Stops early if the walk revisits a node, so it terminates on cyclic input.
    pub fn ancestors_of(&self, key: NodeKey) -> Vec<NodeKey> {
        let Some(&start) = self.slots.get(&key) else {
            return Vec::new();
        };
        let mut seen = HashSet::from([start]);
        let mut out = Vec::new();
        let mut current = self.parents[start];
        while let Some(slot) = current {
            if slot == ROOT_SLOT || !seen.insert(slot) {
                break;
            }
            out.push(self.keys[slot]);
            current = self.parents[slot];
        }
        out.reverse();
        out
    }

    /// Descendants of `key` in breadth-first order, so depth ascending.
    pub fn descendants_of(&self, key: NodeKey) -> Vec<NodeKey> {
        let Some(&start) = self.slots.get(&key) else {
            return Vec::new();
        };
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut out = Vec::new();
        while let Some(slot) = queue.pop_front() {
            for child in self.child_slots(slot) {
                if seen.insert(*child) {
                    out.push(self.keys[*child]);
                    queue.push_back(*child);
                }
            }
        }
        out
    }

    /// True iff `dst` is `src`, one of its ancestors, or one of its descendants.
    pub fn path_exists(&self, src: NodeKey, dst: NodeKey) -> bool {
        if !self.contains(src) || !self.contains(dst) {
            return false;
        }
        src == dst
            || self.ancestors_of(src).contains(&dst)
            || self.descendants_of(src).contains(&dst)
    }

    pub(crate) fn slot_of(&self, key: NodeKey) -> Option<usize> {
        self.slots.get(&key).copied()
    }

    pub(crate) fn key_at(&self, slot: usize) -> NodeKey {
        self.keys[slot]
    }

    pub(crate) fn child_slots(&self, slot: usize) -> &[usize] {
        self.children.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }
}
