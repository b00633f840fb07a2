//! Relational-algebra IR for the fixlog engine
//!
//! Rules compile into a tree of relational operators; the whole solve is
//! one tree with a seeded do-while loop per stratum. Both executors
//! traverse this representation.

pub mod build;
pub mod ir;

pub use build::{build_solve_tree, rule_variants};
pub use ir::{LoopTest, Op, ReadSlot, WriteSlot};
