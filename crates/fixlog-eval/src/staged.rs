//! Staged executor
//!
//! Specialization turns an IR subtree into a callable that has closed
//! over the subtree's constants: join indexes, relation ids, projection
//! layout, negation slots. Running the callable performs no dispatch on
//! node kinds. The `Granularity` option picks where the boundary between
//! the interpreted skeleton and the specialized callables sits; at
//! `Program` granularity the whole solve is one callable.
//!
//! Specialization is pure in `(tree, options)` and touches no storage, so
//! compiled programs are cacheable and re-runnable.

use fixlog_core::RelationId;
use fixlog_ir::{LoopTest, Op, WriteSlot};
use fixlog_storage::{
    complement, diff, group_by_aggregate, project_join_filter, union, Relation, StorageManager,
};

use crate::error::EvalError;
use crate::interpret::{read, test_holds};
use crate::options::Granularity;

/// A specialized callable producing a relation
pub type RelThunk = Box<dyn Fn(&mut StorageManager) -> Result<Relation, EvalError>>;

/// A specialized callable performing storage actions
pub type ActThunk = Box<dyn Fn(&mut StorageManager) -> Result<(), EvalError>>;

/// A specialized program: callables below the granularity boundary,
/// structure above it
pub enum Compiled {
    /// Specialized action subtree
    Act(ActThunk),
    /// Specialized value subtree
    Rel(RelThunk),
    Sequence(Vec<Compiled>),
    Loop {
        test: LoopTest,
        body: Box<Compiled>,
    },
    Insert {
        relation: RelationId,
        slot: WriteSlot,
        value: Box<Compiled>,
    },
    Union(Vec<Compiled>),
    Diff(Box<Compiled>, Box<Compiled>),
    Join {
        jidx: std::sync::Arc<fixlog_planner::JoinIndexes>,
        inputs: Vec<Compiled>,
    },
    Init,
    Seed(Vec<RelationId>),
    Swap,
}

impl std::fmt::Debug for Compiled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compiled::Act(_) => write!(f, "Act(..)"),
            Compiled::Rel(_) => write!(f, "Rel(..)"),
            Compiled::Sequence(cs) => f.debug_tuple("Sequence").field(&cs.len()).finish(),
            Compiled::Loop { test, .. } => f.debug_struct("Loop").field("test", test).finish(),
            Compiled::Insert { relation, slot, .. } => f
                .debug_struct("Insert")
                .field("relation", relation)
                .field("slot", slot)
                .finish(),
            Compiled::Union(cs) => f.debug_tuple("Union").field(&cs.len()).finish(),
            Compiled::Diff(..) => write!(f, "Diff(..)"),
            Compiled::Join { jidx, .. } => f
                .debug_struct("Join")
                .field("rule", &jidx.rule_hash)
                .finish(),
            Compiled::Init => write!(f, "Init"),
            Compiled::Seed(rids) => f.debug_tuple("Seed").field(rids).finish(),
            Compiled::Swap => write!(f, "Swap"),
        }
    }
}

/// Specialize a program tree at the given granularity
pub fn specialize(op: &Op, granularity: Granularity) -> Compiled {
    match granularity {
        Granularity::Program => Compiled::Act(make_act(op)),
        Granularity::Rule | Granularity::Atom => structural_action(op, granularity),
    }
}

fn structural_action(op: &Op, granularity: Granularity) -> Compiled {
    match op {
        Op::InitEvaluation => Compiled::Init,
        Op::SeedDelta(rids) => Compiled::Seed(rids.clone()),
        Op::SwapAndClear => Compiled::Swap,
        Op::Sequence(children) => Compiled::Sequence(
            children
                .iter()
                .map(|c| structural_action(c, granularity))
                .collect(),
        ),
        Op::DoWhile { test, body } => Compiled::Loop {
            test: test.clone(),
            body: Box::new(structural_action(body, granularity)),
        },
        Op::Insert {
            relation,
            slot,
            value,
        } => Compiled::Insert {
            relation: *relation,
            slot: *slot,
            value: Box::new(structural_value(value, granularity)),
        },
        other => Compiled::Act(make_act(other)),
    }
}

fn structural_value(op: &Op, granularity: Granularity) -> Compiled {
    if matches!(granularity, Granularity::Rule) {
        return Compiled::Rel(make_rel(op));
    }
    match op {
        Op::Union(children) => Compiled::Union(
            children
                .iter()
                .map(|c| structural_value(c, granularity))
                .collect(),
        ),
        Op::Diff(left, right) => Compiled::Diff(
            Box::new(structural_value(left, granularity)),
            Box::new(structural_value(right, granularity)),
        ),
        Op::ProjectJoinFilter { jidx, inputs, .. } => Compiled::Join {
            jidx: jidx.clone(),
            inputs: inputs
                .iter()
                .map(|c| structural_value(c, granularity))
                .collect(),
        },
        // Scans, complements and grouped views are the atom-level units
        other => Compiled::Rel(make_rel(other)),
    }
}

/// Specialize an action subtree into one callable
fn make_act(op: &Op) -> ActThunk {
    match op {
        Op::InitEvaluation => Box::new(|storage: &mut StorageManager| {
            storage.init_evaluation();
            Ok(())
        }),
        Op::SeedDelta(rids) => {
            let rids = rids.clone();
            Box::new(move |storage: &mut StorageManager| {
                storage.seed_delta(&rids);
                Ok(())
            })
        }
        Op::SwapAndClear => Box::new(|storage: &mut StorageManager| {
            storage.swap_knowledge();
            Ok(())
        }),
        Op::Insert {
            relation,
            slot,
            value,
        } => {
            let relation = *relation;
            let slot = *slot;
            let value = make_rel(value);
            Box::new(move |storage: &mut StorageManager| {
                let rel = value(storage)?;
                match slot {
                    WriteSlot::Derived => storage.reset_new_derived(relation, rel),
                    WriteSlot::Delta => storage.reset_new_delta(relation, rel),
                }
                Ok(())
            })
        }
        Op::Sequence(children) => {
            let thunks: Vec<ActThunk> = children.iter().map(make_act).collect();
            Box::new(move |storage: &mut StorageManager| {
                for thunk in &thunks {
                    thunk(storage)?;
                }
                Ok(())
            })
        }
        Op::DoWhile { test, body } => {
            let test = test.clone();
            let body = make_act(body);
            Box::new(move |storage: &mut StorageManager| {
                loop {
                    body(storage)?;
                    if test_holds(storage, &test) {
                        return Ok(());
                    }
                }
            })
        }
        // A value node in action position: evaluate and discard
        other => {
            let value = make_rel(other);
            Box::new(move |storage: &mut StorageManager| {
                value(storage)?;
                Ok(())
            })
        }
    }
}

/// Specialize a value subtree into one callable
fn make_rel(op: &Op) -> RelThunk {
    match op {
        Op::Scan(rid, slot) => {
            let rid = *rid;
            let slot = *slot;
            Box::new(move |storage: &mut StorageManager| Ok(read(storage, rid, slot)))
        }
        Op::ProjectJoinFilter { jidx, inputs, .. } => {
            let jidx = jidx.clone();
            let thunks: Vec<RelThunk> = inputs.iter().map(make_rel).collect();
            Box::new(move |storage: &mut StorageManager| {
                let rels = thunks
                    .iter()
                    .map(|t| t(storage))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&Relation> = rels.iter().collect();
                Ok(project_join_filter(&refs, &jidx))
            })
        }
        Op::Union(children) => {
            let thunks: Vec<RelThunk> = children.iter().map(make_rel).collect();
            Box::new(move |storage: &mut StorageManager| {
                let rels = thunks
                    .iter()
                    .map(|t| t(storage))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(union(rels.iter()))
            })
        }
        Op::Diff(left, right) => {
            let left = make_rel(left);
            let right = make_rel(right);
            Box::new(move |storage: &mut StorageManager| {
                let l = left(storage)?;
                let r = right(storage)?;
                Ok(diff(&l, &r))
            })
        }
        Op::Complement { relation, slots } => {
            let relation = *relation;
            let slots = slots.clone();
            Box::new(move |storage: &mut StorageManager| Ok(complement(storage, relation, &slots)))
        }
        Op::Group { input, grouping } => {
            let input = make_rel(input);
            let grouping = grouping.clone();
            Box::new(move |storage: &mut StorageManager| {
                let rel = input(storage)?;
                Ok(group_by_aggregate(&rel, &grouping)?)
            })
        }
        // An action node in value position: run it, yield nothing
        other => {
            let action = make_act(other);
            Box::new(move |storage: &mut StorageManager| {
                action(storage)?;
                Ok(Relation::new())
            })
        }
    }
}

/// Run a specialized program against live storage
pub fn run_compiled(compiled: &Compiled, storage: &mut StorageManager) -> Result<(), EvalError> {
    match compiled {
        Compiled::Act(thunk) => thunk(storage),
        Compiled::Rel(thunk) => {
            thunk(storage)?;
            Ok(())
        }
        Compiled::Sequence(children) => {
            for child in children {
                run_compiled(child, storage)?;
            }
            Ok(())
        }
        Compiled::Loop { test, body } => {
            loop {
                run_compiled(body, storage)?;
                if test_holds(storage, test) {
                    return Ok(());
                }
            }
        }
        Compiled::Insert {
            relation,
            slot,
            value,
        } => {
            let rel = eval_compiled(value, storage)?;
            match slot {
                WriteSlot::Derived => storage.reset_new_derived(*relation, rel),
                WriteSlot::Delta => storage.reset_new_delta(*relation, rel),
            }
            Ok(())
        }
        Compiled::Init => {
            storage.init_evaluation();
            Ok(())
        }
        Compiled::Seed(rids) => {
            storage.seed_delta(rids);
            Ok(())
        }
        Compiled::Swap => {
            storage.swap_knowledge();
            Ok(())
        }
        other => {
            eval_compiled(other, storage)?;
            Ok(())
        }
    }
}

fn eval_compiled(compiled: &Compiled, storage: &mut StorageManager) -> Result<Relation, EvalError> {
    match compiled {
        Compiled::Rel(thunk) => thunk(storage),
        Compiled::Union(children) => {
            let rels = children
                .iter()
                .map(|c| eval_compiled(c, storage))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(union(rels.iter()))
        }
        Compiled::Diff(left, right) => {
            let l = eval_compiled(left, storage)?;
            let r = eval_compiled(right, storage)?;
            Ok(diff(&l, &r))
        }
        Compiled::Join { jidx, inputs } => {
            let rels = inputs
                .iter()
                .map(|c| eval_compiled(c, storage))
                .collect::<Result<Vec<_>, _>>()?;
            let refs: Vec<&Relation> = rels.iter().collect();
            Ok(project_join_filter(&refs, jidx))
        }
        other => {
            run_compiled(other, storage)?;
            Ok(Relation::new())
        }
    }
}
