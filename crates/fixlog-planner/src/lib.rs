//! Planner for the fixlog engine
//!
//! From each rule the planner derives a `JoinIndexes` record: variable
//! equality classes, constant constraints, head projection, dependency
//! edges, a per-atom connectivity map, negation metadata for complement
//! materialization, and grouping metadata for aggregation. It also hosts
//! the body-ordering heuristics, stratification, and the memoized index
//! cache.

pub mod cache;
pub mod compile;
pub mod indexes;
pub mod sort;
pub mod stratify;

pub use cache::IndexCache;
pub use compile::{compile_permutation, compile_rule, shared_var_count, PlanError};
pub use indexes::{
    AggSource, EdgeKind, GroupingIndexes, JoinIndexes, NegSlot, ProjSlot,
};
pub use sort::{
    all_permutations, presort_select, presort_select_worst, RankFn, SortOrder,
};
pub use stratify::{stratify, Stratification};
