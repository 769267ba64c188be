//! Closure-table rows.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{NodeId, PathRowId};

/// One closure-table cell: `ancestor` reaches `descendant` in `depth` parent steps.
///
/// `(ancestor, descendant)` is unique in the table and `depth` is a function of the
/// pair. Self-paths have `ancestor == descendant` and `depth == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClosurePath {
    pub ancestor: NodeId,
    pub descendant: NodeId,
    pub depth: u32,
}

impl ClosurePath {
    pub fn new(ancestor: NodeId, descendant: NodeId, depth: u32) -> Self {
        Self {
            ancestor,
            descendant,
            depth,
        }
    }

    /// The depth-0 row every persisted node owns.
    pub fn self_path(node: NodeId) -> Self {
        Self::new(node, node, 0)
    }

    pub fn is_self(&self) -> bool {
        self.depth == 0 && self.ancestor == self.descendant
    }

    /// The uniqueness key of the row.
    pub fn endpoints(&self) -> (NodeId, NodeId) {
        (self.ancestor, self.descendant)
    }
}

impl fmt::Display for ClosurePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.ancestor, self.descendant, self.depth)
    }
}

/// A persisted closure row with its surrogate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathRow {
    pub id: PathRowId,
    pub path: ClosurePath,
}

impl PathRow {
    pub fn new(id: PathRowId, path: ClosurePath) -> Self {
        Self { id, path }
    }

    pub fn ancestor(&self) -> NodeId {
        self.path.ancestor
    }

    pub fn descendant(&self) -> NodeId {
        self.path.descendant
    }

    pub fn depth(&self) -> u32 {
        self.path.depth
    }
}

/// A node seen from some subject node, `depth` steps above or below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relative {
    pub node: NodeId,
    pub depth: u32,
}

impl Relative {
    pub fn new(node: NodeId, depth: u32) -> Self {
        Self { node, depth }
    }
}

impl fmt::Display for Relative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.node, self.depth)
    }
}
