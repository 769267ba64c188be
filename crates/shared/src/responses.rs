//! Batch response wire form

use serde::{Deserialize, Serialize};

use treeline_domain::ItemOutcome;

/// Per-item result, in request order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub index: usize,
    /// Resolved node id; absent when the node was deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(default)]
    pub deleted: bool,
}

/// Successful batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub batch_id: String,
    pub items: Vec<ItemResult>,
}

impl BatchResponse {
    pub fn from_outcomes(batch_id: impl Into<String>, outcomes: &[ItemOutcome]) -> Self {
        let items = outcomes
            .iter()
            .enumerate()
            .map(|(index, outcome)| ItemResult {
                index,
                id: outcome.node_id().map(|id| id.get()),
                deleted: matches!(outcome, ItemOutcome::Deleted),
            })
            .collect();
        Self {
            batch_id: batch_id.into(),
            items,
        }
    }
}

/// Error classification codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request itself is invalid
    BadRequest,
    /// A referenced node does not exist
    NotFound,
    /// Storage rejected a write that raced with another batch
    Conflict,
    /// A planner invariant broke; not the caller's fault
    InternalError,
    /// The database failed; retrying may succeed
    ServiceUnavailable,
}

/// Failed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchErrorResponse {
    pub code: ErrorCode,
    /// Machine-readable error name, e.g. `loop_detected`.
    pub kind: String,
    pub message: String,
    /// Members of the rejected loop, first node repeated at the end.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loop_path: Vec<String>,
}

impl BatchErrorResponse {
    pub fn new(code: ErrorCode, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            kind: kind.into(),
            message: message.into(),
            loop_path: Vec::new(),
        }
    }

    pub fn with_loop_path(mut self, path: Vec<String>) -> Self {
        self.loop_path = path;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use treeline_domain::NodeId;

    #[test]
    fn outcomes_keep_request_order() {
        let response = BatchResponse::from_outcomes(
            "b1",
            &[
                ItemOutcome::Resolved(NodeId::new(42)),
                ItemOutcome::Deleted,
            ],
        );
        assert_eq!(
            serde_json::to_value(&response).expect("serialize"),
            json!({
                "batch_id": "b1",
                "items": [
                    {"index": 0, "id": 42, "deleted": false},
                    {"index": 1, "deleted": true}
                ]
            })
        );
    }

    #[test]
    fn loop_path_is_omitted_when_empty() {
        let error =
            BatchErrorResponse::new(ErrorCode::NotFound, "node_missing", "Node not found: 3");
        let value = serde_json::to_value(&error).expect("serialize");
        assert!(value.get("loop_path").is_none());
        assert_eq!(value["code"], "not_found");
    }
}
