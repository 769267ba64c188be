//! Re-parent planning: which subtrees move, in what order, and where to.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::entities::{FormItem, FormMode, Relative};
use crate::error::PlanError;
use crate::graph::ClosureSnapshot;
use crate::ids::NodeId;

/// How a moving root nested inside another moving subtree relates to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestedMoveKind {
    /// Leaves the enclosing subtree for somewhere else.
    MovesOut,
    /// Stays under the enclosing root but changes its chain to it.
    RelocatesInternally,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestedMove {
    pub root: NodeId,
    pub kind: NestedMoveKind,
}

/// A persisted node whose parent changes, together with everything the path
/// diff needs to rewrite the rows of its subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovingSubtree {
    /// Position of the form item in the batch.
    pub index: usize,
    pub root: NodeId,
    pub new_parent: Option<NodeId>,
    /// Nearest other moving root on the new parent's chain.
    pub dependency: Option<NodeId>,
    /// Depth ascending, self excluded.
    pub old_ancestors: Vec<Relative>,
    /// Depth ascending, self excluded.
    pub new_ancestors: Vec<Relative>,
    /// Nodes whose paths this subtree owns, with their depth below `root`.
    /// Includes `root` at depth 0. Empty until segments are resolved.
    pub segment: Vec<Relative>,
    pub nested: Vec<NestedMove>,
}

/// Moving subtrees in dependency order plus the moves that turned out to be
/// payload-only edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovePlan {
    subtrees: Vec<MovingSubtree>,
    in_place: Vec<usize>,
}

impl MovePlan {
    /// Dependency order: every subtree comes after the subtree it depends on.
    pub fn subtrees(&self) -> &[MovingSubtree] {
        &self.subtrees
    }

    /// Form positions of `Move` items whose parent does not actually change.
    pub fn in_place(&self) -> &[usize] {
        &self.in_place
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.subtrees.iter().map(|s| s.root)
    }

    pub fn is_empty(&self) -> bool {
        self.subtrees.is_empty()
    }

    /// Drops every subtree that would land under one of `targets` and returns
    /// their roots, which the caller deletes together with the targets.
    pub fn discard_under(&mut self, targets: &HashSet<NodeId>) -> Vec<NodeId> {
        if targets.is_empty() {
            return Vec::new();
        }
        let mut doomed = Vec::new();
        self.subtrees.retain(|subtree| {
            let keep = !subtree
                .new_ancestors
                .iter()
                .any(|r| targets.contains(&r.node));
            if !keep {
                doomed.push(subtree.root);
            }
            keep
        });
        if !doomed.is_empty() {
            tracing::debug!(roots = ?doomed, "Moving subtrees discarded under deleted nodes");
        }
        doomed
    }

    /// Splits each subtree's descendants into the part it owns.
    ///
    /// `descendants` maps every moving root to its persisted descendants,
    /// depth ascending and self included. A subtree gives up every other
    /// moving root nested inside it along with that root's descendants, since
    /// those rows are rewritten by the nested subtree's own plan.
    pub fn resolve_segments(
        &mut self,
        descendants: &BTreeMap<NodeId, Vec<Relative>>,
    ) -> Result<(), PlanError> {
        let roots: Vec<NodeId> = self.roots().collect();
        let new_chains: HashMap<NodeId, Vec<NodeId>> = self
            .subtrees
            .iter()
            .map(|s| (s.root, s.new_ancestors.iter().map(|r| r.node).collect()))
            .collect();

        for subtree in &mut self.subtrees {
            let below = descendants
                .get(&subtree.root)
                .ok_or(PlanError::NodeMissing(subtree.root))?;
            let members: HashSet<NodeId> = below.iter().map(|r| r.node).collect();

            let mut carved: HashSet<NodeId> = HashSet::new();
            let mut nested = Vec::new();
            for other in roots.iter().copied() {
                if other == subtree.root || !members.contains(&other) {
                    continue;
                }
                let other_below = descendants
                    .get(&other)
                    .ok_or(PlanError::NodeMissing(other))?;
                carved.extend(other_below.iter().map(|r| r.node));
                carved.insert(other);

                let stays = new_chains
                    .get(&other)
                    .is_some_and(|chain| chain.contains(&subtree.root));
                nested.push(NestedMove {
                    root: other,
                    kind: if stays {
                        NestedMoveKind::RelocatesInternally
                    } else {
                        NestedMoveKind::MovesOut
                    },
                });
            }

            subtree.segment = below
                .iter()
                .filter(|r| !carved.contains(&r.node))
                .copied()
                .collect();
            subtree.nested = nested;

            tracing::debug!(
                root = %subtree.root,
                owned = subtree.segment.len(),
                carved = carved.len(),
                nested = ?subtree.nested,
                "Descendant segment resolved"
            );
        }
        Ok(())
    }
}

/// Builds a [`MovePlan`] from the batch's `Move` items and the persisted chains.
pub struct MovePlanner<'a> {
    snapshot: &'a ClosureSnapshot,
}

impl<'a> MovePlanner<'a> {
    pub fn new(snapshot: &'a ClosureSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn plan(&self, forms: &[FormItem]) -> Result<MovePlan, PlanError> {
        let mut plan = MovePlan::default();
        let mut candidates = Vec::new();

        for (index, form) in forms.iter().enumerate() {
            let FormMode::Move { id, new_parent } = form.mode else {
                continue;
            };
            if !self.snapshot.contains(id) {
                return Err(PlanError::NodeMissing(id));
            }
            if self.snapshot.parent(id) == new_parent {
                plan.in_place.push(index);
            } else {
                candidates.push((index, id, new_parent));
            }
        }

        let moving: HashSet<NodeId> = candidates.iter().map(|(_, id, _)| *id).collect();
        let mut pending = Vec::with_capacity(candidates.len());
        for (index, root, new_parent) in candidates {
            let dependency = self.dependency_of(root, new_parent, &moving)?;
            pending.push((index, root, new_parent, dependency));
        }

        // Worklist topological sort, batch order within each pass.
        let mut done: HashMap<NodeId, usize> = HashMap::new();
        while !pending.is_empty() {
            let before = pending.len();
            let mut still_pending = Vec::with_capacity(before);
            for (index, root, new_parent, dependency) in pending {
                let ready = match dependency {
                    None => Some(None),
                    Some(dep) => done.get(&dep).map(|slot| Some(*slot)),
                };
                let Some(dep_slot) = ready else {
                    still_pending.push((index, root, new_parent, dependency));
                    continue;
                };
                let dep_ancestors =
                    dep_slot.map(|slot| plan.subtrees[slot].new_ancestors.as_slice());
                let new_ancestors = self.new_ancestors(new_parent, dependency, dep_ancestors)?;
                let old_ancestors = self.snapshot.proper_ancestors(root);

                tracing::debug!(
                    root = %root,
                    dependency = ?dependency,
                    old = ?old_ancestors,
                    new = ?new_ancestors,
                    "Moving subtree placed"
                );
                done.insert(root, plan.subtrees.len());
                plan.subtrees.push(MovingSubtree {
                    index,
                    root,
                    new_parent,
                    dependency,
                    old_ancestors,
                    new_ancestors,
                    segment: Vec::new(),
                    nested: Vec::new(),
                });
            }
            if still_pending.len() == before {
                return Err(PlanError::ReorderDeadlock {
                    pending: still_pending.iter().map(|(_, root, _, _)| *root).collect(),
                });
            }
            pending = still_pending;
        }

        tracing::debug!(
            order = ?plan.roots().collect::<Vec<_>>(),
            in_place = plan.in_place.len(),
            "Move order planned"
        );
        Ok(plan)
    }

    /// The nearest moving root on the new parent's persisted chain, parent included.
    fn dependency_of(
        &self,
        root: NodeId,
        new_parent: Option<NodeId>,
        moving: &HashSet<NodeId>,
    ) -> Result<Option<NodeId>, PlanError> {
        let Some(parent) = new_parent else {
            return Ok(None);
        };
        let chain = self
            .snapshot
            .chain(parent)
            .ok_or(PlanError::NodeMissing(parent))?;
        match chain.iter().find(|r| moving.contains(&r.node)) {
            // Landing inside its own subtree with nothing moving in between.
            Some(r) if r.node == root => Err(PlanError::ReorderDeadlock {
                pending: vec![root],
            }),
            Some(r) => Ok(Some(r.node)),
            None => Ok(None),
        }
    }

    /// Ancestors after the move, depth ascending with the new parent at depth 1.
    ///
    /// With a dependency `d`, the persisted chain is trusted from the new parent
    /// up to and including `d`; above `d` the already-planned ancestors of `d`
    /// take over.
    fn new_ancestors(
        &self,
        new_parent: Option<NodeId>,
        dependency: Option<NodeId>,
        dep_ancestors: Option<&[Relative]>,
    ) -> Result<Vec<Relative>, PlanError> {
        let Some(parent) = new_parent else {
            return Ok(Vec::new());
        };
        let chain = self
            .snapshot
            .chain(parent)
            .ok_or(PlanError::NodeMissing(parent))?;

        let Some(dep) = dependency else {
            return Ok(chain
                .iter()
                .map(|r| Relative::new(r.node, r.depth + 1))
                .collect());
        };

        let cut = chain
            .iter()
            .position(|r| r.node == dep)
            .ok_or(PlanError::NodeMissing(dep))?;
        let shift = chain[cut].depth + 1;
        let mut out: Vec<Relative> = chain[..=cut]
            .iter()
            .map(|r| Relative::new(r.node, r.depth + 1))
            .collect();
        out.extend(
            dep_ancestors
                .unwrap_or(&[])
                .iter()
                .map(|r| Relative::new(r.node, r.depth + shift)),
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::NodePayload;
    use crate::graph::{GraphView, NodeKey};

    fn n(id: u32) -> NodeId {
        NodeId::new(id)
    }

    /// Parent map -> snapshot holding every node's chain.
    fn forest(edges: &[(u32, Option<u32>)]) -> ClosureSnapshot {
        let parents: HashMap<u32, Option<u32>> = edges.iter().copied().collect();
        let mut snapshot = ClosureSnapshot::new();
        for (node, _) in edges {
            let mut chain = vec![Relative::new(n(*node), 0)];
            let mut current = parents.get(node).copied().flatten();
            while let Some(parent) = current {
                chain.push(Relative::new(n(parent), chain.len() as u32));
                current = parents.get(&parent).copied().flatten();
            }
            snapshot.insert_chain(n(*node), chain);
        }
        snapshot
    }

    /// Descendant sets, self included, derived from a snapshot of every node.
    fn descendants(snapshot: &ClosureSnapshot) -> BTreeMap<NodeId, Vec<Relative>> {
        let mut out: BTreeMap<NodeId, Vec<Relative>> = BTreeMap::new();
        for (node, chain) in snapshot.chains() {
            for r in chain {
                out.entry(r.node).or_default().push(Relative::new(node, r.depth));
            }
        }
        for list in out.values_mut() {
            list.sort_by_key(|r| (r.depth, r.node));
        }
        out
    }

    fn ids(relatives: &[Relative]) -> Vec<(u32, u32)> {
        relatives.iter().map(|r| (r.node.get(), r.depth)).collect()
    }

    /// The planned chain must agree with walking the combined graph.
    fn assert_matches_view(forms: &[FormItem], snapshot: &ClosureSnapshot, plan: &MovePlan) {
        let view = GraphView::build(forms, snapshot).expect("view");
        for subtree in plan.subtrees() {
            let mut expected = view.ancestors_of(NodeKey::Existing(subtree.root));
            expected.reverse();
            let planned: Vec<NodeKey> = subtree
                .new_ancestors
                .iter()
                .map(|r| NodeKey::Existing(r.node))
                .collect();
            assert_eq!(planned, expected, "ancestors of {}", subtree.root);
            for (position, r) in subtree.new_ancestors.iter().enumerate() {
                assert_eq!(r.depth as usize, position + 1);
            }
        }
    }

    #[test]
    fn cross_tree_move_gets_the_new_parent_chain() {
        // R1(1) -> A(2) -> B(3), R2(4) -> C(5); move C under B
        let snapshot = forest(&[(1, None), (2, Some(1)), (3, Some(2)), (4, None), (5, Some(4))]);
        let forms = vec![FormItem::move_to(n(5), Some(n(3)), NodePayload::empty())];
        let plan = MovePlanner::new(&snapshot).plan(&forms).expect("plan");

        let subtree = &plan.subtrees()[0];
        assert_eq!(subtree.dependency, None);
        assert_eq!(ids(&subtree.old_ancestors), vec![(4, 1)]);
        assert_eq!(ids(&subtree.new_ancestors), vec![(3, 1), (2, 2), (1, 3)]);
        assert_matches_view(&forms, &snapshot, &plan);
    }

    #[test]
    fn unchanged_parent_is_an_in_place_edit() {
        let snapshot = forest(&[(1, None), (2, Some(1))]);
        let forms = vec![
            FormItem::move_to(n(2), Some(n(1)), NodePayload::empty()),
            FormItem::move_to(n(1), None, NodePayload::empty()),
        ];
        let plan = MovePlanner::new(&snapshot).plan(&forms).expect("plan");
        assert!(plan.is_empty());
        assert_eq!(plan.in_place(), &[0, 1]);
    }

    #[test]
    fn chained_moves_are_ordered_by_dependency() {
        // T1: 1-2-3, T2: 4-5-6, T3: 7-8-9; T3 under 6 listed before T2 under 3
        let snapshot = forest(&[
            (1, None),
            (2, Some(1)),
            (3, Some(2)),
            (4, None),
            (5, Some(4)),
            (6, Some(5)),
            (7, None),
            (8, Some(7)),
            (9, Some(8)),
        ]);
        let forms = vec![
            FormItem::move_to(n(7), Some(n(6)), NodePayload::empty()),
            FormItem::move_to(n(4), Some(n(3)), NodePayload::empty()),
        ];
        let plan = MovePlanner::new(&snapshot).plan(&forms).expect("plan");

        let roots: Vec<NodeId> = plan.roots().collect();
        assert_eq!(roots, vec![n(4), n(7)]);
        let t3 = &plan.subtrees()[1];
        assert_eq!(t3.dependency, Some(n(4)));
        assert_eq!(
            ids(&t3.new_ancestors),
            vec![(6, 1), (5, 2), (4, 3), (3, 4), (2, 5), (1, 6)]
        );
        assert_matches_view(&forms, &snapshot, &plan);
    }

    #[test]
    fn new_parent_that_is_itself_moving_is_the_dependency() {
        // 1 -> 2, 3 -> 4; move 2 to root and 3 under 2
        let snapshot = forest(&[(1, None), (2, Some(1)), (3, None), (4, Some(3))]);
        let forms = vec![
            FormItem::move_to(n(3), Some(n(2)), NodePayload::empty()),
            FormItem::move_to(n(2), None, NodePayload::empty()),
        ];
        let plan = MovePlanner::new(&snapshot).plan(&forms).expect("plan");

        let moved_3 = plan.subtrees().iter().find(|s| s.root == n(3)).expect("3");
        assert_eq!(moved_3.dependency, Some(n(2)));
        assert_eq!(ids(&moved_3.new_ancestors), vec![(2, 1)]);
        assert_matches_view(&forms, &snapshot, &plan);
    }

    #[test]
    fn nested_root_moving_out_is_carved_from_the_segment() {
        // 1 -> 2 -> 3 -> 4, 10; move 2 under 10 and 3 to root
        let snapshot = forest(&[(1, None), (2, Some(1)), (3, Some(2)), (4, Some(3)), (10, None)]);
        let forms = vec![
            FormItem::move_to(n(2), Some(n(10)), NodePayload::empty()),
            FormItem::move_to(n(3), None, NodePayload::empty()),
        ];
        let mut plan = MovePlanner::new(&snapshot).plan(&forms).expect("plan");
        plan.resolve_segments(&descendants(&snapshot)).expect("segments");

        let outer = plan.subtrees().iter().find(|s| s.root == n(2)).expect("2");
        assert_eq!(ids(&outer.segment), vec![(2, 0)]);
        assert_eq!(
            outer.nested,
            vec![NestedMove {
                root: n(3),
                kind: NestedMoveKind::MovesOut
            }]
        );
        let inner = plan.subtrees().iter().find(|s| s.root == n(3)).expect("3");
        assert_eq!(ids(&inner.segment), vec![(3, 0), (4, 1)]);
        assert!(inner.new_ancestors.is_empty());
    }

    #[test]
    fn nested_root_relocating_inside_its_subtree() {
        // 1 -> 2 -> 3 -> 4, 2 -> 5, 20; move 2 under 20 and 4 under 5
        let snapshot = forest(&[
            (1, None),
            (2, Some(1)),
            (3, Some(2)),
            (4, Some(3)),
            (5, Some(2)),
            (20, None),
        ]);
        let forms = vec![
            FormItem::move_to(n(4), Some(n(5)), NodePayload::empty()),
            FormItem::move_to(n(2), Some(n(20)), NodePayload::empty()),
        ];
        let mut plan = MovePlanner::new(&snapshot).plan(&forms).expect("plan");
        plan.resolve_segments(&descendants(&snapshot)).expect("segments");

        assert_eq!(plan.roots().collect::<Vec<_>>(), vec![n(2), n(4)]);
        let outer = &plan.subtrees()[0];
        assert_eq!(ids(&outer.segment), vec![(2, 0), (3, 1), (5, 1)]);
        assert_eq!(outer.nested[0].kind, NestedMoveKind::RelocatesInternally);

        let inner = &plan.subtrees()[1];
        assert_eq!(ids(&inner.new_ancestors), vec![(5, 1), (2, 2), (20, 3)]);
        assert_matches_view(&forms, &snapshot, &plan);
    }

    #[test]
    fn landing_in_own_subtree_is_a_deadlock() {
        let snapshot = forest(&[(1, None), (2, Some(1))]);
        let forms = vec![FormItem::move_to(n(1), Some(n(2)), NodePayload::empty())];
        let err = MovePlanner::new(&snapshot).plan(&forms).expect_err("deadlock");
        assert_eq!(err, PlanError::ReorderDeadlock { pending: vec![n(1)] });
    }

    #[test]
    fn subtrees_landing_under_deleted_nodes_are_discarded() {
        let snapshot = forest(&[(1, None), (2, Some(1)), (3, None), (4, None)]);
        let forms = vec![
            FormItem::move_to(n(3), Some(n(2)), NodePayload::empty()),
            FormItem::move_to(n(4), Some(n(3)), NodePayload::empty()),
        ];
        let mut plan = MovePlanner::new(&snapshot).plan(&forms).expect("plan");
        let doomed = plan.discard_under(&HashSet::from([n(1)]));
        assert_eq!(doomed, vec![n(3), n(4)]);
        assert!(plan.is_empty());
    }
}
