//! Batch request wire form
//!
//! JSON-shaped items as clients send them, and their conversion into domain
//! [`FormItem`]s. Ids are raw integers here; only conversion produces domain ids.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use treeline_domain::{BatchKind, FormItem, FormMode, NodeId, NodePayload};

/// A whole batch as submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub kind: BatchKind,
    #[serde(default)]
    pub items: Vec<BatchFormItem>,
}

/// What an item asks for. Optional on the wire; the batch kind supplies a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormOp {
    Create,
    Move,
    Edit,
    Delete,
}

impl FormOp {
    pub fn as_str(self) -> &'static str {
        match self {
            FormOp::Create => "create",
            FormOp::Move => "move",
            FormOp::Edit => "edit",
            FormOp::Delete => "delete",
        }
    }
}

/// One item of a batch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchFormItem {
    /// Absent for creates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    /// Persisted parent id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exist_parent: Option<u32>,
    /// Batch-local parent, by position in `items`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_parent: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<FormOp>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Why a wire item cannot become a form item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("Item #{index}: exist_parent and new_parent cannot both be set")]
    BothParents { index: usize },

    #[error("Item #{index}: a create item cannot carry an id")]
    IdOnCreate { index: usize },

    #[error("Item #{index}: {op} requires an id")]
    MissingId { index: usize, op: &'static str },

    #[error("Item #{index}: id {value} is outside the node id range")]
    InvalidId { index: usize, value: u32 },

    #[error("Item #{index}: new_parent only applies to create items")]
    BatchParentOnExisting { index: usize },

    #[error("Item #{index}: {op} does not take a parent")]
    UnexpectedParent { index: usize, op: &'static str },

    #[error("Item #{index}: {op} is not allowed in a {kind} batch")]
    OpNotAllowed {
        index: usize,
        op: &'static str,
        kind: BatchKind,
    },
}

impl FormError {
    pub fn index(&self) -> usize {
        match self {
            FormError::BothParents { index }
            | FormError::IdOnCreate { index }
            | FormError::MissingId { index, .. }
            | FormError::InvalidId { index, .. }
            | FormError::BatchParentOnExisting { index }
            | FormError::UnexpectedParent { index, .. }
            | FormError::OpNotAllowed { index, .. } => *index,
        }
    }
}

impl BatchRequest {
    pub fn new(kind: BatchKind, items: Vec<BatchFormItem>) -> Self {
        Self { kind, items }
    }

    /// Converts every item, stopping at the first malformed one.
    pub fn into_forms(self) -> Result<(BatchKind, Vec<FormItem>), FormError> {
        let kind = self.kind;
        let forms = self
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| item.into_form(kind, index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((kind, forms))
    }
}

impl BatchFormItem {
    pub fn create(payload: serde_json::Value) -> Self {
        Self {
            payload,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_exist_parent(mut self, parent: u32) -> Self {
        self.exist_parent = Some(parent);
        self
    }

    pub fn with_new_parent(mut self, position: usize) -> Self {
        self.new_parent = Some(position);
        self
    }

    pub fn with_op(mut self, op: FormOp) -> Self {
        self.op = Some(op);
        self
    }

    /// The op this item performs once defaults are applied.
    pub fn effective_op(&self, kind: BatchKind) -> FormOp {
        if let Some(op) = self.op {
            return op;
        }
        match kind {
            BatchKind::Create => FormOp::Create,
            BatchKind::Move => FormOp::Move,
            BatchKind::Delete => FormOp::Delete,
            BatchKind::Mixed if self.id.is_some() => FormOp::Move,
            BatchKind::Mixed => FormOp::Create,
        }
    }

    pub fn into_form(self, kind: BatchKind, index: usize) -> Result<FormItem, FormError> {
        if self.exist_parent.is_some() && self.new_parent.is_some() {
            return Err(FormError::BothParents { index });
        }
        let op = self.effective_op(kind);
        let payload = NodePayload::new(self.payload);
        let exist_parent = self
            .exist_parent
            .map(|value| node_id(index, value))
            .transpose()?;

        let mode = match op {
            FormOp::Create => {
                if self.id.is_some() {
                    return Err(FormError::IdOnCreate { index });
                }
                match (exist_parent, self.new_parent) {
                    (Some(parent), _) => FormMode::CreateChildOfExisting { parent },
                    (None, Some(position)) => FormMode::CreateChildOfBatch { index: position },
                    (None, None) => FormMode::CreateRoot,
                }
            }
            FormOp::Move | FormOp::Edit | FormOp::Delete => {
                let id = self
                    .id
                    .ok_or(FormError::MissingId {
                        index,
                        op: op.as_str(),
                    })
                    .and_then(|value| node_id(index, value))?;
                if self.new_parent.is_some() {
                    return Err(FormError::BatchParentOnExisting { index });
                }
                match op {
                    FormOp::Move => FormMode::Move {
                        id,
                        new_parent: exist_parent,
                    },
                    _ if exist_parent.is_some() => {
                        return Err(FormError::UnexpectedParent {
                            index,
                            op: op.as_str(),
                        })
                    }
                    FormOp::Edit => FormMode::EditInPlace { id },
                    _ => FormMode::Delete { id },
                }
            }
        };

        if !kind.permits(&mode) {
            return Err(FormError::OpNotAllowed {
                index,
                op: op.as_str(),
                kind,
            });
        }
        Ok(FormItem::new(mode, payload))
    }
}

fn node_id(index: usize, value: u32) -> Result<NodeId, FormError> {
    if value < NodeId::MIN.get() {
        return Err(FormError::InvalidId { index, value });
    }
    Ok(NodeId::new(value))
}
