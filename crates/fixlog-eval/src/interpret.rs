//! Tree-walking executor
//!
//! Evaluates the IR directly against the storage manager. At join nodes it
//! may consult the planner for online reordering: the delta child is
//! identified, `presort_select` produces a new body order, and the
//! permuted `JoinIndexes` (from the permutation cache) replaces the
//! original before execution.

use std::collections::HashMap;
use std::sync::Arc;

use fixlog_core::{Atom, RelationId, Rule};
use fixlog_ir::{LoopTest, Op, ReadSlot, WriteSlot};
use fixlog_planner::{presort_select, presort_select_worst, IndexCache, JoinIndexes, SortOrder};
use fixlog_storage::{
    complement, diff, group_by_aggregate, project_join_filter, union, Relation, StorageManager,
};
use log::debug;

use crate::error::EvalError;
use crate::options::{JitOptions, OnlineSort};

/// Statistics about one solve
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EvaluationStats {
    /// Number of generation swaps performed
    pub iterations: usize,
    /// Number of join-node executions
    pub rule_firings: usize,
    /// Number of delta tuples written (new facts per iteration)
    pub tuples_derived: usize,
}

/// Read one generation of one relation as an owned value
pub(crate) fn read(storage: &StorageManager, rid: RelationId, slot: ReadSlot) -> Relation {
    match slot {
        ReadSlot::Edb => storage.edb(rid).clone(),
        ReadSlot::Known => storage.known_derived(rid).clone(),
        ReadSlot::New => storage.new_derived(rid).clone(),
        ReadSlot::Delta => storage.known_delta(rid).clone(),
        ReadSlot::NewDelta => storage.new_delta(rid).clone(),
    }
}

pub(crate) fn test_holds(storage: &StorageManager, test: &LoopTest) -> bool {
    match test {
        LoopTest::DeltaEmpty(rids) => storage.delta_known_empty(rids),
        LoopTest::FixpointReached => storage.fixpoint_reached(),
    }
}

/// Rank key for the configured sort order, over precomputed cardinalities
pub(crate) fn rank_key(
    order: SortOrder,
    sizes: &HashMap<RelationId, i64>,
    atom: &Atom,
    is_delta: bool,
) -> (bool, i64) {
    let rid = match &atom.group {
        Some(group) => group.inner.relation,
        None => atom.relation,
    };
    let size = sizes.get(&rid).copied().unwrap_or(0);
    let constants = atom.terms.iter().filter(|t| !t.is_variable()).count() as i64;
    let key = match order {
        SortOrder::Sel | SortOrder::Worst => size,
        SortOrder::Mixed => size - 8 * constants,
        SortOrder::IntMax => size * atom.arity() as i64,
        SortOrder::Unordered | SortOrder::Badluck => 0,
    };
    (!is_delta, key)
}

/// One solve's tree-walking state
pub struct Interpreter<'a> {
    storage: &'a mut StorageManager,
    cache: &'a mut IndexCache,
    options: JitOptions,
    /// Online reordering decisions, per (rule, delta slot)
    reorder_cache: HashMap<(u64, usize), Vec<usize>>,
    pub stats: EvaluationStats,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        storage: &'a mut StorageManager,
        cache: &'a mut IndexCache,
        options: JitOptions,
    ) -> Self {
        Interpreter {
            storage,
            cache,
            options,
            reorder_cache: HashMap::new(),
            stats: EvaluationStats::default(),
        }
    }

    /// Execute an action subtree
    pub fn run(&mut self, op: &Op) -> Result<(), EvalError> {
        match op {
            Op::InitEvaluation => {
                self.storage.init_evaluation();
                Ok(())
            }
            Op::SeedDelta(rids) => {
                self.storage.seed_delta(rids);
                Ok(())
            }
            Op::SwapAndClear => {
                self.storage.swap_knowledge();
                self.stats.iterations += 1;
                Ok(())
            }
            Op::Insert {
                relation,
                slot,
                value,
            } => {
                let rel = self.eval(value)?;
                match slot {
                    WriteSlot::Derived => self.storage.reset_new_derived(*relation, rel),
                    WriteSlot::Delta => {
                        self.stats.tuples_derived += rel.len();
                        self.storage.reset_new_delta(*relation, rel);
                    }
                }
                Ok(())
            }
            Op::Sequence(children) => {
                for child in children {
                    self.run(child)?;
                }
                Ok(())
            }
            Op::DoWhile { test, body } => {
                loop {
                    self.run(body)?;
                    if test_holds(self.storage, test) {
                        break;
                    }
                }
                Ok(())
            }
            // A value node in action position: evaluate and discard
            other => {
                self.eval(other)?;
                Ok(())
            }
        }
    }

    /// Evaluate a value subtree into a relation
    fn eval(&mut self, op: &Op) -> Result<Relation, EvalError> {
        match op {
            Op::Scan(rid, slot) => Ok(read(self.storage, *rid, *slot)),
            Op::ProjectJoinFilter {
                jidx,
                inputs,
                delta_idx,
            } => {
                self.stats.rule_firings += 1;
                if let Some((jidx, inputs)) = self.maybe_reorder(jidx, inputs, *delta_idx)? {
                    return self.join(&jidx, &inputs);
                }
                self.join(jidx, inputs)
            }
            Op::Union(children) => {
                let rels = children
                    .iter()
                    .map(|c| self.eval(c))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(union(rels.iter()))
            }
            Op::Diff(left, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                Ok(diff(&l, &r))
            }
            Op::Complement { relation, slots } => {
                Ok(complement(self.storage, *relation, slots))
            }
            Op::Group { input, grouping } => {
                let rel = self.eval(input)?;
                Ok(group_by_aggregate(&rel, grouping)?)
            }
            // An action node in value position: run it, yield nothing
            other => {
                self.run(other)?;
                Ok(Relation::new())
            }
        }
    }

    fn join(&mut self, jidx: &JoinIndexes, inputs: &[Op]) -> Result<Relation, EvalError> {
        let rels = inputs
            .iter()
            .map(|c| self.eval(c))
            .collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<&Relation> = rels.iter().collect();
        Ok(project_join_filter(&refs, jidx))
    }

    /// Online reordering of one join node, per the configured policy
    fn maybe_reorder(
        &mut self,
        jidx: &Arc<JoinIndexes>,
        inputs: &[Op],
        delta_idx: Option<usize>,
    ) -> Result<Option<(Arc<JoinIndexes>, Vec<Op>)>, EvalError> {
        if matches!(self.options.online_sort, OnlineSort::Off)
            || !self.options.sort_order.reorders()
            || jidx.atoms.len() <= 1
        {
            return Ok(None);
        }

        let key = (jidx.rule_hash, delta_idx.unwrap_or(usize::MAX));
        let cached = if matches!(self.options.online_sort, OnlineSort::PerRule) {
            self.reorder_cache.get(&key).cloned()
        } else {
            None
        };
        let order = match cached {
            Some(order) => order,
            None => {
                let order = self.choose_order(jidx, delta_idx);
                self.reorder_cache.insert(key, order.clone());
                order
            }
        };

        if order.iter().enumerate().all(|(i, &k)| i == k) {
            return Ok(None);
        }

        debug!(
            "reordered join of rule {:016x} (delta slot {:?}) to {:?}",
            jidx.rule_hash, delta_idx, order
        );

        // Re-plan over the original rule so the permutation cache key is
        // stable across variants and solves.
        let base = Rule::new(jidx.head.clone(), jidx.original_body());
        let composed: Vec<usize> = order.iter().map(|&k| jidx.perm[k]).collect();
        let new_jidx = self.cache.plan_permutation(&base, &composed)?;
        let new_inputs: Vec<Op> = order.iter().map(|&k| inputs[k].clone()).collect();
        Ok(Some((new_jidx, new_inputs)))
    }

    fn choose_order(&self, jidx: &JoinIndexes, delta_idx: Option<usize>) -> Vec<usize> {
        let mut sizes: HashMap<RelationId, i64> = HashMap::new();
        for atom in &jidx.atoms {
            let rid = match &atom.group {
                Some(group) => group.inner.relation,
                None => atom.relation,
            };
            sizes
                .entry(rid)
                .or_insert_with(|| self.storage.known_derived(rid).len() as i64);
        }

        let order = self.options.sort_order;
        let rank = move |atom: &Atom, is_delta: bool| rank_key(order, &sizes, atom, is_delta);
        if matches!(order, SortOrder::Worst) {
            presort_select_worst(&jidx.atoms, delta_idx, &rank)
        } else {
            presort_select(&jidx.atoms, delta_idx, &rank)
        }
    }
}
