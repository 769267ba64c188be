//! Batch form items: what a client asks the engine to do with one node.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::NodeId;

/// Domain payload carried by a node. The engine stores it verbatim.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePayload(serde_json::Value);

impl NodePayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// An empty JSON object.
    pub fn empty() -> Self {
        Self(serde_json::Value::Object(serde_json::Map::new()))
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_json(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for NodePayload {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// What a single form item does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FormMode {
    /// New node with no parent.
    CreateRoot,
    /// New node under a persisted node.
    CreateChildOfExisting { parent: NodeId },
    /// New node under another create item of the same batch, by batch position.
    CreateChildOfBatch { index: usize },
    /// Re-parent a persisted node; `None` makes it a root.
    Move {
        id: NodeId,
        new_parent: Option<NodeId>,
    },
    /// Payload-only edit of a persisted node.
    EditInPlace { id: NodeId },
    /// Remove a persisted node and its whole subtree.
    Delete { id: NodeId },
}

impl FormMode {
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            Self::CreateRoot | Self::CreateChildOfExisting { .. } | Self::CreateChildOfBatch { .. }
        )
    }

    /// The persisted node a non-create item targets.
    pub fn existing_id(&self) -> Option<NodeId> {
        match self {
            Self::Move { id, .. } | Self::EditInPlace { id } | Self::Delete { id } => Some(*id),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::CreateRoot => "create_root",
            Self::CreateChildOfExisting { .. } => "create_child_of_existing",
            Self::CreateChildOfBatch { .. } => "create_child_of_batch",
            Self::Move { .. } => "move",
            Self::EditInPlace { .. } => "edit_in_place",
            Self::Delete { .. } => "delete",
        }
    }
}

/// One entry of a batch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormItem {
    pub mode: FormMode,
    #[serde(default)]
    pub payload: NodePayload,
}

impl FormItem {
    pub fn new(mode: FormMode, payload: NodePayload) -> Self {
        Self { mode, payload }
    }

    pub fn create_root(payload: NodePayload) -> Self {
        Self::new(FormMode::CreateRoot, payload)
    }

    pub fn child_of_existing(parent: NodeId, payload: NodePayload) -> Self {
        Self::new(FormMode::CreateChildOfExisting { parent }, payload)
    }

    pub fn child_of_batch(index: usize, payload: NodePayload) -> Self {
        Self::new(FormMode::CreateChildOfBatch { index }, payload)
    }

    pub fn move_to(id: NodeId, new_parent: Option<NodeId>, payload: NodePayload) -> Self {
        Self::new(FormMode::Move { id, new_parent }, payload)
    }

    pub fn edit(id: NodeId, payload: NodePayload) -> Self {
        Self::new(FormMode::EditInPlace { id }, payload)
    }

    pub fn delete(id: NodeId) -> Self {
        Self::new(FormMode::Delete { id }, NodePayload::empty())
    }
}

/// Which family of operations a batch may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Create,
    Move,
    Delete,
    Mixed,
}

impl BatchKind {
    /// Whether an item of `mode` is allowed in a batch of this kind.
    pub fn permits(self, mode: &FormMode) -> bool {
        match self {
            Self::Create => mode.is_create(),
            Self::Move => matches!(mode, FormMode::Move { .. } | FormMode::EditInPlace { .. }),
            Self::Delete => matches!(mode, FormMode::Delete { .. }),
            Self::Mixed => true,
        }
    }
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchKind::Create => write!(f, "create"),
            BatchKind::Move => write!(f, "move"),
            BatchKind::Delete => write!(f, "delete"),
            BatchKind::Mixed => write!(f, "mixed"),
        }
    }
}

/// What became of one form item once its batch committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "id", rename_all = "snake_case")]
pub enum ItemOutcome {
    Resolved(NodeId),
    Deleted,
}

impl ItemOutcome {
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::Resolved(id) => Some(*id),
            Self::Deleted => None,
        }
    }
}
