//! Persisted shapes and batch inputs.

mod form;
mod path;

pub use form::{BatchKind, FormItem, FormMode, ItemOutcome, NodePayload};
pub use path::{ClosurePath, PathRow, Relative};
