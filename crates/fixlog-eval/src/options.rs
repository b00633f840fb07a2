//! Executor configuration

pub use fixlog_planner::SortOrder;

/// When the interpreted executor re-plans body orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnlineSort {
    /// Reorder once at plan time
    #[default]
    Off,
    /// Reorder each join node once per solve
    PerRule,
    /// Reorder each join node on every execution
    PerStep,
}

/// Unit of specialization in the staged executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    /// The whole program tree becomes one callable
    #[default]
    Program,
    /// Each rule union becomes a callable; the skeleton stays interpreted
    Rule,
    /// Each scan, complement and grouped view becomes a callable
    Atom,
}

/// Configuration for both executors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JitOptions {
    pub sort_order: SortOrder,
    pub online_sort: OnlineSort,
    pub granularity: Granularity,
}
