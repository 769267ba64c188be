//! Engine end-to-end tests.
//!
//! Every test opens its own SQLite file in a temp directory, builds the full
//! [`App`](crate::App) with a fixed clock and deterministic id draws, and
//! checks the resulting closure rows directly.
//!
//! ```bash
//! cargo test -p treeline-engine --lib e2e_tests
//! ```

mod harness;
mod invariant_tests;

pub use harness::*;
