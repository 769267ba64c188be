//! Entity modules - Domain capability encapsulation.
//!
//! Each module wraps read operations over one port. Mutations go through the
//! batch use case.

pub mod hierarchy;

pub use hierarchy::Hierarchy;
