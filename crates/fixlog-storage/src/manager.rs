//! Two-generation storage manager
//!
//! Holds the EDBs, two generations of derived IDB databases ("known" and
//! "new") and two generations of deltas. At each iteration boundary the
//! generation ids swap; relation contents are never copied across the
//! swap. Derived reads fall back to the EDB when the derived side is
//! empty, so EDB tuples participate in every generation without copying.

use std::collections::HashMap;

use fixlog_core::{RelationId, Tuple, Value};
use log::trace;

use crate::relation::Relation;

type Database = HashMap<RelationId, Relation>;

/// In-memory storage for one engine instance
#[derive(Debug, Default)]
pub struct StorageManager {
    edbs: Database,
    /// Two generations of derived relations, indexed by generation id
    derived: [Database; 2],
    /// Two generations of deltas, same indexing
    delta: [Database; 2],
    /// Generation id currently read from
    known: usize,
    iteration: usize,
    /// Shared empty relation for missing entries
    empty: Relation,
}

impl StorageManager {
    pub fn new() -> Self {
        StorageManager::default()
    }

    fn new_gen(&self) -> usize {
        1 - self.known
    }

    // ===== EDB =====

    /// Append a tuple to a relation's EDB
    pub fn insert_edb(&mut self, rid: RelationId, tuple: Tuple) {
        self.edbs.entry(rid).or_default().insert(tuple);
    }

    pub fn edb(&self, rid: RelationId) -> &Relation {
        self.edbs.get(&rid).unwrap_or(&self.empty)
    }

    // ===== Generation reads =====

    /// Current-generation derived relation, falling back to the EDB when
    /// the derived side is empty
    pub fn known_derived(&self, rid: RelationId) -> &Relation {
        match self.derived[self.known].get(&rid) {
            Some(rel) if !rel.is_empty() => rel,
            _ => self.edb(rid),
        }
    }

    /// Next-generation derived relation, same EDB fallback
    pub fn new_derived(&self, rid: RelationId) -> &Relation {
        match self.derived[self.new_gen()].get(&rid) {
            Some(rel) if !rel.is_empty() => rel,
            _ => self.edb(rid),
        }
    }

    pub fn known_delta(&self, rid: RelationId) -> &Relation {
        self.delta[self.known].get(&rid).unwrap_or(&self.empty)
    }

    pub fn new_delta(&self, rid: RelationId) -> &Relation {
        self.delta[self.new_gen()].get(&rid).unwrap_or(&self.empty)
    }

    // ===== Generation writes =====

    pub fn reset_known_derived(&mut self, rid: RelationId, rel: Relation) {
        self.derived[self.known].insert(rid, rel);
    }

    pub fn reset_new_derived(&mut self, rid: RelationId, rel: Relation) {
        self.derived[self.new_gen()].insert(rid, rel);
    }

    pub fn reset_known_delta(&mut self, rid: RelationId, rel: Relation) {
        self.delta[self.known].insert(rid, rel);
    }

    pub fn reset_new_delta(&mut self, rid: RelationId, rel: Relation) {
        self.delta[self.new_gen()].insert(rid, rel);
    }

    // ===== Lifecycle =====

    /// Clear all generations and reset the iteration counter; EDBs stay
    pub fn init_evaluation(&mut self) {
        for gen in &mut self.derived {
            gen.clear();
        }
        for gen in &mut self.delta {
            gen.clear();
        }
        self.iteration = 0;
    }

    /// Seed the known delta of each listed relation with its full known
    /// view and clear its new delta. Run at stratum entry so the first
    /// iteration fires rules naively.
    pub fn seed_delta(&mut self, rids: &[RelationId]) {
        for &rid in rids {
            let seed = self.known_derived(rid).clone();
            trace!("seed delta {} with {} tuples", rid, seed.len());
            self.delta[self.known].insert(rid, seed);
            self.delta[self.new_gen()].remove(&rid);
        }
    }

    /// Swap generation ids, clear the now-writable generation, and count
    /// the iteration
    pub fn swap_knowledge(&mut self) {
        self.known = self.new_gen();
        let new = self.new_gen();
        self.derived[new].clear();
        self.delta[new].clear();
        self.iteration += 1;
        trace!("swap to generation {}, iteration {}", self.known, self.iteration);
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    // ===== Termination =====

    /// True iff the known delta of every listed relation is empty
    pub fn delta_known_empty(&self, rids: &[RelationId]) -> bool {
        rids.iter().all(|rid| self.known_delta(*rid).is_empty())
    }

    /// True iff every relation in the new delta is empty
    pub fn delta_new_empty(&self) -> bool {
        self.delta[self.new_gen()].values().all(Relation::is_empty)
    }

    /// True iff the known and new derived databases are element-equal
    pub fn fixpoint_reached(&self) -> bool {
        let keys: std::collections::HashSet<RelationId> = self.derived[0]
            .keys()
            .chain(self.derived[1].keys())
            .copied()
            .collect();
        keys.into_iter().all(|rid| {
            let known = self.derived[self.known].get(&rid).unwrap_or(&self.empty);
            let new = self.derived[self.new_gen()].get(&rid).unwrap_or(&self.empty);
            known.set_eq(new)
        })
    }

    // ===== Universe queries (for complements) =====

    /// Distinct values at one column of a relation's known view, in
    /// first-seen order
    pub fn values_at(&self, rid: RelationId, col: usize) -> Vec<Value> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for row in self.known_derived(rid).iter() {
            if let Some(v) = row.get(col) {
                if seen.insert(v.clone()) {
                    out.push(v.clone());
                }
            }
        }
        out
    }

    /// Every value occurring in any EDB or known-derived relation, in a
    /// stable order
    pub fn active_domain(&self) -> Vec<Value> {
        let mut rids: Vec<RelationId> = self
            .edbs
            .keys()
            .chain(self.derived[self.known].keys())
            .copied()
            .collect();
        rids.sort();
        rids.dedup();

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for rid in rids {
            for row in self.known_derived(rid).iter() {
                for v in row {
                    if seen.insert(v.clone()) {
                        out.push(v.clone());
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(vs: &[i64]) -> Tuple {
        vs.iter().map(|&v| Value::integer(v)).collect()
    }

    #[test]
    fn test_known_falls_back_to_edb() {
        let mut storage = StorageManager::new();
        let rid = RelationId(0);
        storage.insert_edb(rid, t(&[1, 2]));

        assert_eq!(storage.known_derived(rid).len(), 1);

        // A non-empty derived generation shadows the EDB
        storage.reset_known_derived(rid, Relation::from_tuples(vec![t(&[1, 2]), t(&[3, 4])]));
        assert_eq!(storage.known_derived(rid).len(), 2);
    }

    #[test]
    fn test_swap_flips_generations() {
        let mut storage = StorageManager::new();
        let rid = RelationId(0);
        storage.reset_new_derived(rid, Relation::from_tuples(vec![t(&[1])]));
        assert!(storage.known_derived(rid).is_empty());

        storage.swap_knowledge();
        assert_eq!(storage.known_derived(rid).len(), 1);
        assert_eq!(storage.iteration(), 1);
        // The now-writable generation was cleared by the swap
        assert!(storage.new_derived(rid).is_empty());
    }

    #[test]
    fn test_seed_delta_copies_known_view() {
        let mut storage = StorageManager::new();
        let rid = RelationId(0);
        storage.insert_edb(rid, t(&[7]));
        storage.seed_delta(&[rid]);

        assert_eq!(storage.known_delta(rid).len(), 1);
        assert!(storage.new_delta(rid).is_empty());
        assert!(!storage.delta_known_empty(&[rid]));
    }

    #[test]
    fn test_delta_new_empty() {
        let mut storage = StorageManager::new();
        let rid = RelationId(0);
        assert!(storage.delta_new_empty());
        storage.reset_new_delta(rid, Relation::from_tuples(vec![t(&[1])]));
        assert!(!storage.delta_new_empty());
    }

    #[test]
    fn test_fixpoint_reached_compares_sets() {
        let mut storage = StorageManager::new();
        let rid = RelationId(0);
        storage.reset_known_derived(rid, Relation::from_tuples(vec![t(&[1]), t(&[2])]));
        storage.reset_new_derived(rid, Relation::from_tuples(vec![t(&[2]), t(&[1])]));
        assert!(storage.fixpoint_reached());

        storage.reset_new_derived(rid, Relation::from_tuples(vec![t(&[2])]));
        assert!(!storage.fixpoint_reached());
    }

    #[test]
    fn test_values_at_and_active_domain() {
        let mut storage = StorageManager::new();
        let edge = RelationId(0);
        storage.insert_edb(edge, t(&[1, 2]));
        storage.insert_edb(edge, t(&[1, 3]));

        assert_eq!(
            storage.values_at(edge, 0),
            vec![Value::integer(1)]
        );
        assert_eq!(storage.values_at(edge, 1).len(), 2);
        assert_eq!(storage.active_domain().len(), 3);
    }

    #[test]
    fn test_init_evaluation_clears_generations() {
        let mut storage = StorageManager::new();
        let rid = RelationId(0);
        storage.insert_edb(rid, t(&[1]));
        storage.reset_new_derived(rid, Relation::from_tuples(vec![t(&[9])]));
        storage.swap_knowledge();

        storage.init_evaluation();
        assert_eq!(storage.iteration(), 0);
        // Derived generations cleared, EDB preserved
        assert_eq!(storage.known_derived(rid).rows(), &[t(&[1])]);
    }
}
