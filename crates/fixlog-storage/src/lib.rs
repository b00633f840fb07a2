//! In-memory relational storage for the fixlog engine
//!
//! Exposes the two-generation storage manager and the relational
//! primitives the executors drive: scan (via the manager's accessors),
//! union, diff, project-join-filter, complement, and group-by-aggregate.

pub mod manager;
pub mod ops;
pub mod relation;

pub use manager::StorageManager;
pub use ops::{complement, group_by_aggregate, project_join_filter, StorageError};
pub use relation::{diff, union, Relation};
