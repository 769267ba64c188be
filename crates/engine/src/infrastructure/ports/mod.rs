//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - Closure-table persistence (could swap SQLite -> Postgres)
//! - Clock/Random (for testing)

mod error;
mod store;
mod testing;
pub mod types;

// =============================================================================
// Store Ports
// =============================================================================
pub use error::StoreError;
pub use store::{PathStore, PathTxn};
pub use types::{HierarchyTable, IdGap, PRODUCT_TAGS, USER_GROUPS};

// =============================================================================
// Test-Only Mocks (only available during test builds)
// =============================================================================
#[cfg(test)]
pub use store::{MockPathStore, MockPathTxn};

#[cfg(test)]
pub use testing::{MockClockPort, MockRandomPort};

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::{ClockPort, RandomPort};
