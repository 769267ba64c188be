//! Error types for port operations.

use treeline_domain::{ClosurePath, NodeId};

/// Path store errors with context for debugging.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A closure row with the same (ancestor, descendant) already exists.
    #[error("Path conflict: {0} collides with an existing row")]
    PathConflict(ClosurePath),

    /// A node row with this id already exists.
    #[error("Node id {0} is already taken")]
    NodeIdTaken(NodeId),

    /// A referenced node does not exist.
    #[error("Node not found: {0}")]
    NodeMissing(NodeId),

    /// The transaction was already committed or rolled back.
    #[error("Transaction already finished")]
    TransactionClosed,

    /// Database operation failed - includes operation name for tracing.
    #[error("Database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// Payload (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Create a Database error with operation context.
    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }

    /// Create a Serialization error.
    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    pub fn is_node_missing(&self) -> bool {
        matches!(self, Self::NodeMissing(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_error_keeps_operation() {
        let err = StoreError::database("fetch_ancestors", "disk I/O error");
        assert_eq!(
            err.to_string(),
            "Database error in fetch_ancestors: disk I/O error"
        );
    }

    #[test]
    fn conflict_names_the_path() {
        let err = StoreError::PathConflict(ClosurePath::new(NodeId::new(1), NodeId::new(2), 1));
        assert_eq!(
            err.to_string(),
            "Path conflict: (1, 2, 1) collides with an existing row"
        );
    }
}
