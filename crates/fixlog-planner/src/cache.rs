//! Per-rule index cache
//!
//! Planner output is memoized by rule hash, and by (rule hash, permutation
//! hash) for permuted bodies. Planning is single-threaded and happens
//! before or lazily during execution, so plain maps suffice.

use std::collections::HashMap;
use std::sync::Arc;

use fixlog_core::Rule;
use log::trace;

use crate::compile::{compile_permutation, compile_rule, PlanError};
use crate::indexes::JoinIndexes;
use crate::sort::all_permutations;

/// Memoized planner frontend
#[derive(Debug, Default)]
pub struct IndexCache {
    by_rule: HashMap<u64, Arc<JoinIndexes>>,
    by_permutation: HashMap<(u64, u64), Arc<JoinIndexes>>,
}

impl IndexCache {
    pub fn new() -> Self {
        IndexCache::default()
    }

    /// Join indexes for a rule in its user order
    pub fn plan_rule(&mut self, rule: &Rule) -> Result<Arc<JoinIndexes>, PlanError> {
        let key = rule.stable_hash();
        if let Some(jidx) = self.by_rule.get(&key) {
            return Ok(jidx.clone());
        }
        trace!("planning rule {}", rule);
        let jidx = Arc::new(compile_rule(rule)?);
        self.by_rule.insert(key, jidx.clone());
        Ok(jidx)
    }

    /// Join indexes for a body permutation of a rule
    pub fn plan_permutation(
        &mut self,
        rule: &Rule,
        perm: &[usize],
    ) -> Result<Arc<JoinIndexes>, PlanError> {
        let key = (rule.stable_hash(), rule.permutation_hash(perm));
        if let Some(jidx) = self.by_permutation.get(&key) {
            return Ok(jidx.clone());
        }
        trace!("planning permutation {:?} of rule {}", perm, rule);
        let jidx = Arc::new(compile_permutation(rule, perm)?);
        self.by_permutation.insert(key, jidx.clone());
        Ok(jidx)
    }

    /// Join indexes for every body permutation of a rule
    pub fn all_orders(&mut self, rule: &Rule) -> Result<Vec<Arc<JoinIndexes>>, PlanError> {
        all_permutations(rule)
            .iter()
            .map(|perm| self.plan_permutation(rule, perm))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_rule.len() + self.by_permutation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_rule.is_empty() && self.by_permutation.is_empty()
    }
}
