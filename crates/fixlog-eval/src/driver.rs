//! Engine facade and solve drivers
//!
//! One engine owns a program, its storage, the planner cache and the
//! configured options. A solve validates the program, stratifies it,
//! builds the solve tree and runs it through the interpreted or the
//! staged executor; both yield the same final IDB state. A naive
//! evaluation baseline (no deltas, re-fires everything each iteration) is
//! kept for comparison and testing.

use std::collections::HashSet;
use std::time::Instant;

use fixlog_core::{RelationId, Rule, Tuple};
use fixlog_ir::{build_solve_tree, Op};
use fixlog_planner::{
    presort_select, presort_select_worst, stratify, IndexCache, SortOrder,
};
use fixlog_storage::{complement, group_by_aggregate, project_join_filter, StorageManager};
use log::debug;

use crate::error::EvalError;
use crate::interpret::{rank_key, EvaluationStats, Interpreter};
use crate::options::{JitOptions, OnlineSort};
use crate::program::Program;
use crate::staged::{run_compiled, specialize, Compiled};

/// Context a generated tree carries between the three staged surfaces
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub query: RelationId,
}

/// A built engine, ready to solve
pub struct Engine {
    program: Program,
    storage: StorageManager,
    cache: IndexCache,
    options: JitOptions,
}

impl Engine {
    pub fn new(program: Program) -> Self {
        Engine::with_options(program, JitOptions::default())
    }

    pub fn with_options(program: Program, options: JitOptions) -> Self {
        let mut engine = Engine {
            program,
            storage: StorageManager::new(),
            cache: IndexCache::new(),
            options,
        };
        engine.load_facts();
        engine
    }

    /// Move asserted facts and ground-fact rules into the EDB
    fn load_facts(&mut self) {
        let storage = &mut self.storage;
        for (rid, tuple) in self.program.facts.drain(..) {
            storage.insert_edb(rid, tuple);
        }
        self.program.rules.retain(|rule| {
            if !rule.is_ground_fact() {
                return true;
            }
            if let Some(tuple) = rule.head.to_tuple() {
                storage.insert_edb(rule.head.relation, tuple);
            }
            false
        });
    }

    pub fn options(&self) -> JitOptions {
        self.options
    }

    pub fn set_options(&mut self, options: JitOptions) {
        self.options = options;
    }

    /// The final contents of a relation after the last solve
    pub fn result(&self, query: RelationId) -> HashSet<Tuple> {
        self.storage.known_derived(query).as_set().clone()
    }

    // ===== Validation and planning =====

    fn validate(&self, query: RelationId) -> Result<(), EvalError> {
        if !self.program.catalog.is_declared(query) {
            return Err(EvalError::UnknownRelation(query));
        }
        for rid in self.program.referenced_relations() {
            if !self.program.catalog.is_declared(rid) {
                return Err(EvalError::UnknownRelation(rid));
            }
        }
        Ok(())
    }

    /// The rules a solve runs, with bodies presorted when an offline sort
    /// order is configured
    fn planned_rules(&mut self) -> Vec<Rule> {
        if !self.options.sort_order.reorders()
            || !matches!(self.options.online_sort, OnlineSort::Off)
        {
            return self.program.rules.clone();
        }

        let order = self.options.sort_order;
        let mut sizes = std::collections::HashMap::new();
        for rule in &self.program.rules {
            for atom in &rule.body {
                let rid = match &atom.group {
                    Some(group) => group.inner.relation,
                    None => atom.relation,
                };
                sizes
                    .entry(rid)
                    .or_insert_with(|| self.storage.known_derived(rid).len() as i64);
            }
        }

        self.program
            .rules
            .iter()
            .map(|rule| {
                if rule.body.len() <= 1 {
                    return rule.clone();
                }
                let rank =
                    |atom: &fixlog_core::Atom, is_delta: bool| rank_key(order, &sizes, atom, is_delta);
                let perm = if matches!(order, SortOrder::Worst) {
                    presort_select_worst(&rule.body, None, &rank)
                } else {
                    presort_select(&rule.body, None, &rank)
                };
                debug!("presorted rule {} to {:?}", rule, perm);
                let body = perm.iter().map(|&i| rule.body[i].clone()).collect();
                Rule::new(rule.head.clone(), body)
            })
            .collect()
    }

    /// Surface 1 of the staged executor: tree generation
    pub fn generate_program_tree(
        &mut self,
        query: RelationId,
    ) -> Result<(Op, EvalContext), EvalError> {
        self.validate(query)?;
        let rules = self.planned_rules();
        let stratification = stratify(&rules)?;
        let tree = build_solve_tree(&stratification.rules_by_stratum, &mut self.cache)?;
        Ok((tree, EvalContext { query }))
    }

    /// Surface 2: pure specialization of a generated tree
    pub fn specialize(&self, tree: &Op, _ctx: &EvalContext) -> Compiled {
        specialize(tree, self.options.granularity)
    }

    /// Surface 3: run an already-specialized program
    pub fn run_specialized(
        &mut self,
        compiled: &Compiled,
        ctx: &EvalContext,
    ) -> Result<HashSet<Tuple>, EvalError> {
        run_compiled(compiled, &mut self.storage)?;
        Ok(self.result(ctx.query))
    }

    // ===== Solve entry points =====

    /// Solve with the tree-walking interpreter
    pub fn solve_interpreted(&mut self, query: RelationId) -> Result<HashSet<Tuple>, EvalError> {
        self.solve_interpreted_instrumented(query).map(|(r, _)| r)
    }

    /// Interpreted solve, returning evaluation statistics
    pub fn solve_interpreted_instrumented(
        &mut self,
        query: RelationId,
    ) -> Result<(HashSet<Tuple>, EvaluationStats), EvalError> {
        let (tree, ctx) = self.generate_program_tree(query)?;
        let options = self.options;
        let mut interpreter = Interpreter::new(&mut self.storage, &mut self.cache, options);
        interpreter.run(&tree)?;
        let stats = interpreter.stats.clone();
        debug!(
            "interpreted solve of {}: {} iterations, {} joins, {} delta tuples",
            ctx.query, stats.iterations, stats.rule_firings, stats.tuples_derived
        );
        Ok((self.result(ctx.query), stats))
    }

    /// Solve with the staged executor: generate, specialize, run
    pub fn solve_compiled(&mut self, query: RelationId) -> Result<HashSet<Tuple>, EvalError> {
        let generate = Instant::now();
        let (tree, ctx) = self.generate_program_tree(query)?;
        let generated = generate.elapsed();

        let special = Instant::now();
        let compiled = self.specialize(&tree, &ctx);
        let specialized = special.elapsed();

        let exec = Instant::now();
        let result = self.run_specialized(&compiled, &ctx)?;
        debug!(
            "compiled solve of {}: generate {:?}, specialize {:?}, run {:?}",
            ctx.query,
            generated,
            specialized,
            exec.elapsed()
        );
        Ok(result)
    }

    /// Middle surface: specialization plus execution over a pre-generated
    /// tree
    pub fn solve_pre_generated(
        &mut self,
        tree: &Op,
        ctx: &EvalContext,
    ) -> Result<HashSet<Tuple>, EvalError> {
        let compiled = self.specialize(tree, ctx);
        self.run_specialized(&compiled, ctx)
    }

    /// Naive fixpoint baseline: re-fire every rule against the full known
    /// database each iteration, no deltas
    pub fn solve_naive(&mut self, query: RelationId) -> Result<HashSet<Tuple>, EvalError> {
        self.validate(query)?;
        let rules = self.program.rules.clone();
        let stratification = stratify(&rules)?;
        self.storage.init_evaluation();

        for stratum in &stratification.rules_by_stratum {
            let mut changed = true;
            while changed {
                changed = false;
                for rule in stratum {
                    let jidx = self.cache.plan_rule(rule)?;
                    let inputs: Vec<fixlog_storage::Relation> = jidx
                        .atoms
                        .iter()
                        .enumerate()
                        .map(|(k, atom)| {
                            if let Some(grouping) = jidx.grouping_indexes.get(&k) {
                                let inner =
                                    self.storage.known_derived(grouping.inner_relation).clone();
                                group_by_aggregate(&inner, grouping).map_err(EvalError::from)
                            } else if atom.negated {
                                let slots =
                                    jidx.negation_info.get(&k).cloned().unwrap_or_default();
                                Ok(complement(&self.storage, atom.relation, &slots))
                            } else {
                                Ok(self.storage.known_derived(atom.relation).clone())
                            }
                        })
                        .collect::<Result<_, EvalError>>()?;
                    let refs: Vec<&fixlog_storage::Relation> = inputs.iter().collect();
                    let derived = project_join_filter(&refs, &jidx);

                    let mut head = self.storage.known_derived(rule.head.relation).clone();
                    let mut grew = false;
                    for tuple in derived.iter() {
                        if head.insert(tuple.clone()) {
                            grew = true;
                        }
                    }
                    if grew {
                        self.storage.reset_known_derived(rule.head.relation, head);
                        changed = true;
                    }
                }
            }
        }

        Ok(self.result(query))
    }
}
