//! Relational operator tree
//!
//! An `Op` node produces a relation value or performs a storage action.
//! The executors (interpreted and staged) share this representation; both
//! drive the same storage primitives, which is what makes their results
//! bit-for-bit identical.

use std::sync::Arc;

use fixlog_core::RelationId;
use fixlog_planner::{GroupingIndexes, JoinIndexes, NegSlot};

/// Which view of a relation a scan reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSlot {
    /// The extensional database
    Edb,
    /// Known-derived (reads fall back to the EDB when empty)
    Known,
    /// New-derived
    New,
    /// Known delta
    Delta,
    /// New delta (written earlier in the same iteration)
    NewDelta,
}

/// Which generation an insert writes (always the "new" side)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSlot {
    Derived,
    Delta,
}

/// Loop termination tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopTest {
    /// Stop when the known delta of every listed relation is empty
    DeltaEmpty(Vec<RelationId>),
    /// Stop when known and new derived databases are element-equal
    FixpointReached,
}

/// One node of the program tree
#[derive(Debug, Clone)]
pub enum Op {
    /// Clear generations and reset the iteration counter
    InitEvaluation,
    /// Seed the known delta of each relation with its full known view
    SeedDelta(Vec<RelationId>),
    /// Read one generation of one relation
    Scan(RelationId, ReadSlot),
    /// Multi-way equi-join + filter + project per the join indexes.
    /// `delta_idx` is the body slot reading the delta, if any.
    ProjectJoinFilter {
        jidx: Arc<JoinIndexes>,
        inputs: Vec<Op>,
        delta_idx: Option<usize>,
    },
    /// Multiset union of the children, with duplicate elimination
    Union(Vec<Op>),
    /// Tuples of the left child not in the right child
    Diff(Box<Op>, Box<Op>),
    /// Complement of a negated atom over its inferred universe
    Complement {
        relation: RelationId,
        slots: Vec<NegSlot>,
    },
    /// Group-by-aggregate over the child relation
    Group {
        input: Box<Op>,
        grouping: GroupingIndexes,
    },
    /// Write the child's value into a generation of one relation
    Insert {
        relation: RelationId,
        slot: WriteSlot,
        value: Box<Op>,
    },
    /// Swap known/new ids and clear the now-writable generation
    SwapAndClear,
    /// Execute children in order
    Sequence(Vec<Op>),
    /// Execute the body, then repeat until the test holds
    DoWhile { test: LoopTest, body: Box<Op> },
}

impl Op {
    /// Number of nodes in this subtree
    pub fn size(&self) -> usize {
        1 + match self {
            Op::ProjectJoinFilter { inputs, .. } => inputs.iter().map(Op::size).sum(),
            Op::Union(children) | Op::Sequence(children) => {
                children.iter().map(Op::size).sum()
            }
            Op::Diff(l, r) => l.size() + r.size(),
            Op::Group { input, .. } => input.size(),
            Op::Insert { value, .. } => value.size(),
            Op::DoWhile { body, .. } => body.size(),
            _ => 0,
        }
    }
}
