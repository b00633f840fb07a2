//! Join-index metadata
//!
//! A `JoinIndexes` record is the planner's output for one rule (or one
//! body permutation of a rule). It describes the multi-way join over the
//! rule body in terms of *flat positions*: the concatenation of all body
//! atoms' term tuples in body order. Negated atoms occupy positions that
//! range over their complement; grouping atoms occupy positions that range
//! over the aggregated view (group keys, then aggregate values).

use std::collections::{BTreeMap, HashMap};

use fixlog_core::{AggOp, Atom, RelationId, Value};

/// How one head column is filled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjSlot {
    /// A constant from the rule head
    Const(Value),
    /// The first canonical flat position of the head variable
    Col(usize),
}

/// Kind of a dependency edge from the head relation to a body relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Positive,
    Negated,
    Grouping,
}

/// One column of a negated atom, for complement materialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegSlot {
    /// The column is pinned to a constant
    Const(Value),
    /// The column's universe is the union of values at these
    /// (relation, column) occurrences of the same variable
    Bound(Vec<(RelationId, usize)>),
    /// Anonymous: the full active domain at this slot
    Free,
}

/// Where an aggregate operand reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggSource {
    /// Index into the group key
    GroupColumn(usize),
    /// Column of the grouped sub-atom
    LocalColumn(usize),
    Constant(Value),
}

/// Metadata for one grouping atom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingIndexes {
    pub inner_relation: RelationId,
    pub inner_arity: usize,
    /// Equality groups over inner columns (repeated variables)
    pub var_indexes: Vec<Vec<usize>>,
    /// Inner columns pinned to constants
    pub const_indexes: Vec<(usize, Value)>,
    /// Inner columns forming the group key, in key order
    pub group_by: Vec<usize>,
    pub aggregates: Vec<(AggOp, AggSource)>,
}

impl GroupingIndexes {
    /// Arity of the grouped view: key columns then aggregate columns
    pub fn output_arity(&self) -> usize {
        self.group_by.len() + self.aggregates.len()
    }
}

/// Planner output for one rule body (or one permutation of it)
#[derive(Debug, Clone)]
pub struct JoinIndexes {
    /// Hash of the rule this record was compiled from
    pub rule_hash: u64,
    /// The body permutation, as indexes into the original body
    pub perm: Vec<usize>,
    /// The rule head
    pub head: Atom,
    /// The permuted body atoms
    pub atoms: Vec<Atom>,
    /// Flat offset of each body atom
    pub offsets: Vec<usize>,
    /// Total flat width of the body
    pub width: usize,
    /// Groups of flat positions that must hold equal values
    pub var_indexes: Vec<Vec<usize>>,
    /// Flat positions pinned to constants
    pub const_indexes: Vec<(usize, Value)>,
    /// Head projection, one slot per head column
    pub proj_indexes: Vec<ProjSlot>,
    /// Dependency edges in body order (grouping edges name the inner relation)
    pub deps: Vec<(EdgeKind, RelationId)>,
    /// Per body atom (by stable hash): shared-variable count -> peer hashes
    pub cxns: HashMap<u64, BTreeMap<usize, Vec<u64>>>,
    /// Per negated body index: one slot per column
    pub negation_info: HashMap<usize, Vec<NegSlot>>,
    /// Per grouping body index
    pub grouping_indexes: HashMap<usize, GroupingIndexes>,
    /// True iff the rule is a trivial ground-fact assertion
    pub edb: bool,
}

impl JoinIndexes {
    /// Head arity of the rule this record was compiled for
    pub fn head_arity(&self) -> usize {
        self.proj_indexes.len()
    }

    /// Body indexes that are positive, non-grouping (the semi-naive
    /// delta-eligible slots)
    pub fn delta_eligible(&self) -> Vec<usize> {
        self.atoms
            .iter()
            .enumerate()
            .filter(|(_, a)| !a.negated && !a.is_grouping())
            .map(|(i, _)| i)
            .collect()
    }

    /// The body in its original (unpermuted) order
    pub fn original_body(&self) -> Vec<Atom> {
        let mut body = self.atoms.clone();
        for (k, &orig) in self.perm.iter().enumerate() {
            body[orig] = self.atoms[k].clone();
        }
        body
    }
}
