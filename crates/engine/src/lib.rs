//! Treeline engine library.
//!
//! Batch mutation and path reads over closure-table hierarchies stored in SQLite.
//!
//! ## Structure
//!
//! - `entities/` - Read access to one hierarchy
//! - `use_cases/` - Batch orchestration across the domain planners and the store
//! - `infrastructure/` - Ports, the SQLite path store, clock, settings
//! - `app` - Application composition

pub mod app;
pub mod entities;
pub mod infrastructure;
pub mod use_cases;

/// End-to-end tests against a real SQLite database in a temp directory.
#[cfg(test)]
mod e2e_tests;

pub use app::App;
