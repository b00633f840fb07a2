//! Atoms, grouping specs and rules
//!
//! An atom is a relation id applied to a tuple of terms, with flags for
//! negation and grouping. A grouping atom carries the grouped sub-atom,
//! the group-by variables and the aggregation descriptors; its own terms
//! are the tuple the rest of the rule sees (one term per group-by
//! variable, then one per aggregate).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::term::{RelationId, Term, Value, Var};

/// Aggregation operators for grouping atoms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggOp {
    Sum,
    Count,
    Min,
    Max,
}

impl std::fmt::Display for AggOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggOp::Sum => write!(f, "sum"),
            AggOp::Count => write!(f, "count"),
            AggOp::Min => write!(f, "min"),
            AggOp::Max => write!(f, "max"),
        }
    }
}

/// The grouping payload of a grouping atom
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupSpec {
    /// The grouped sub-atom whose rows are partitioned
    pub inner: Box<Atom>,
    /// Group-by variables, in key order
    pub group_by: Vec<Var>,
    /// Aggregation descriptors, in output order
    pub aggregates: Vec<(AggOp, Term)>,
}

/// A relation id applied to a tuple of terms
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    pub relation: RelationId,
    pub terms: Vec<Term>,
    pub negated: bool,
    /// Present iff this is a grouping atom
    pub group: Option<GroupSpec>,
}

impl Atom {
    pub fn new(relation: RelationId, terms: Vec<Term>) -> Self {
        Atom {
            relation,
            terms,
            negated: false,
            group: None,
        }
    }

    /// The same atom under negation
    pub fn negated(mut self) -> Self {
        self.negated = true;
        self
    }

    /// Build a grouping atom over `inner`
    ///
    /// `terms` is the outer tuple: the group keys followed by the
    /// aggregate results.
    pub fn grouping(
        relation: RelationId,
        terms: Vec<Term>,
        inner: Atom,
        group_by: Vec<Var>,
        aggregates: Vec<(AggOp, Term)>,
    ) -> Self {
        Atom {
            relation,
            terms,
            negated: false,
            group: Some(GroupSpec {
                inner: Box::new(inner),
                group_by,
                aggregates,
            }),
        }
    }

    pub fn arity(&self) -> usize {
        self.terms.len()
    }

    pub fn is_grouping(&self) -> bool {
        self.group.is_some()
    }

    /// True iff every term is a constant
    pub fn is_ground(&self) -> bool {
        self.terms.iter().all(|t| !t.is_variable())
    }

    /// The ground tuple, if this atom is ground
    pub fn to_tuple(&self) -> Option<Vec<Value>> {
        self.terms
            .iter()
            .map(|t| t.as_constant().cloned())
            .collect()
    }

    /// Stable hash over relation id, term shape, variable ids and
    /// constant values. Independent of object identity; used as the
    /// planner cache key.
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// A rule: head derived from an ordered body
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub head: Atom,
    pub body: Vec<Atom>,
}

impl Rule {
    pub fn new(head: Atom, body: Vec<Atom>) -> Self {
        Rule { head, body }
    }

    /// True iff this rule just asserts a ground fact
    pub fn is_ground_fact(&self) -> bool {
        self.body.is_empty() && self.head.is_ground()
    }

    /// Stable hash: the concatenation of the atom hashes, head first
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.head.stable_hash().hash(&mut hasher);
        for atom in &self.body {
            atom.stable_hash().hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Stable hash of a body permutation of this rule
    pub fn permutation_hash(&self, perm: &[usize]) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.head.stable_hash().hash(&mut hasher);
        for &i in perm {
            self.body[i].stable_hash().hash(&mut hasher);
        }
        hasher.finish()
    }
}

impl std::fmt::Display for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negated {
            write!(f, "!")?;
        }
        write!(f, "{}(", self.relation)?;
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", term)?;
        }
        write!(f, ")")?;
        if let Some(group) = &self.group {
            write!(f, " from {} group by [", group.inner)?;
            for (i, v) in group.group_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "?{}", v.id.0)?;
            }
            write!(f, "]")?;
            for (op, term) in &group.aggregates {
                write!(f, " {}({})", op, term)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} :- ", self.head)?;
        for (i, atom) in self.body.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", atom)?;
        }
        Ok(())
    }
}
