//! Integration and property tests for the fixlog engine
//!
//! The scenario module covers the concrete programs the engine must get
//! right; the property module checks the cross-cutting invariants
//! (executor equivalence, sort-order insensitivity, semi-naive vs naive)
//! over generated inputs.

#[cfg(test)]
mod properties;
#[cfg(test)]
mod scenarios;

use fixlog_core::{Term, Value, Var};

/// Shorthand used across the test modules
pub fn v(var: Var) -> Term {
    Term::var(var)
}

pub fn atom_val(name: &str) -> Value {
    Value::atom(name)
}

pub fn int(value: i64) -> Value {
    Value::integer(value)
}
