//! Evaluation errors
//!
//! All errors are fatal to the current solve; no partial results are
//! returned.

use fixlog_core::{CatalogError, RelationId};
use fixlog_planner::PlanError;
use fixlog_storage::StorageError;

/// Errors surfaced by program construction or a solve
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Catalog rejection: arity mismatch or undeclared relation at build
    Catalog(CatalogError),
    /// Planning rejection: safety, grouping or stratification
    Plan(PlanError),
    /// Runtime storage failure (aggregation type errors)
    Storage(StorageError),
    /// A solve referenced a relation id with no EDB or producing rule
    UnknownRelation(RelationId),
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::Catalog(e) => write!(f, "catalog error: {}", e),
            EvalError::Plan(e) => write!(f, "planning error: {}", e),
            EvalError::Storage(e) => write!(f, "storage error: {}", e),
            EvalError::UnknownRelation(rid) => write!(f, "unknown relation {}", rid),
        }
    }
}

impl std::error::Error for EvalError {}

impl From<CatalogError> for EvalError {
    fn from(e: CatalogError) -> Self {
        EvalError::Catalog(e)
    }
}

impl From<PlanError> for EvalError {
    fn from(e: PlanError) -> Self {
        EvalError::Plan(e)
    }
}

impl From<StorageError> for EvalError {
    fn from(e: StorageError) -> Self {
        EvalError::Storage(e)
    }
}
