//! Treeline wire types
//!
//! JSON-shaped batch requests and responses exchanged with whatever front end
//! drives the engine.
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - serde, serde_json and thiserror only
//! 2. **No business logic** - pure data types plus conversion into domain forms
//! 3. **Raw ids on the wire** - DTOs carry plain integers; conversion validates them

pub mod requests;
pub mod responses;

pub use requests::{BatchFormItem, BatchRequest, FormError, FormOp};
pub use responses::{BatchErrorResponse, BatchResponse, ErrorCode, ItemResult};
