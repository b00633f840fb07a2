//! Body-ordering heuristics
//!
//! The driver supplies a `rank` cost function; the planner supplies the
//! greedy machinery. `presort_select` seeds a stack sorted by rank, then
//! repeatedly places the highest-connectivity unplaced peer of the atom
//! just placed, falling back to the stack head when nothing is connected.
//! `presort_select_worst` mirrors it but places the least-connected peer
//! first, to simulate adversarial plans. The asymmetry (ascending vs
//! descending peer selection) is deliberate.

use fixlog_core::{Atom, Rule};

use crate::compile::shared_var_count;

/// Body-ordering policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    /// Leave the user's order intact
    #[default]
    Unordered,
    /// Leave the user's order intact (benchmark control group)
    Badluck,
    /// Rank by current cardinality, smallest first
    Sel,
    /// Rank by cardinality discounted per constant position
    Mixed,
    /// Rank by cardinality weighted by arity
    IntMax,
    /// Sel's rank with worst-first peer selection
    Worst,
}

impl SortOrder {
    /// Whether this policy reorders at all
    pub fn reorders(&self) -> bool {
        !matches!(self, SortOrder::Unordered | SortOrder::Badluck)
    }
}

/// Driver-supplied cost function: `(atom, is_delta_slot) -> key`,
/// ordered ascending
pub type RankFn<'a> = dyn Fn(&Atom, bool) -> (bool, i64) + 'a;

/// Greedy best-first body ordering
///
/// Returns the new order as indexes into `atoms`.
pub fn presort_select(atoms: &[Atom], delta_idx: Option<usize>, rank: &RankFn) -> Vec<usize> {
    presort(atoms, delta_idx, rank, false)
}

/// Adversarial mirror of `presort_select`: least-connected peer first
pub fn presort_select_worst(atoms: &[Atom], delta_idx: Option<usize>, rank: &RankFn) -> Vec<usize> {
    presort(atoms, delta_idx, rank, true)
}

fn presort(atoms: &[Atom], delta_idx: Option<usize>, rank: &RankFn, worst: bool) -> Vec<usize> {
    if atoms.len() <= 1 {
        return (0..atoms.len()).collect();
    }

    // Initial stack: atoms sorted by rank, stable on the user's order.
    let mut stack: Vec<usize> = (0..atoms.len()).collect();
    stack.sort_by_key(|&i| rank(&atoms[i], delta_idx == Some(i)));

    let mut order = Vec::with_capacity(atoms.len());
    order.push(stack.remove(0));

    while !stack.is_empty() {
        let last = order[order.len() - 1];
        let connected: Vec<(usize, usize)> = stack
            .iter()
            .enumerate()
            .filter_map(|(k, &i)| {
                let shared = shared_var_count(&atoms[last], &atoms[i]);
                (shared > 0).then_some((k, shared))
            })
            .collect();

        // Ties resolve to the earlier stack entry (the better-ranked atom).
        let mut choice = 0;
        if let Some(&(first, _)) = connected.first() {
            let mut best = first;
            let mut best_shared = connected[0].1;
            for &(k, shared) in &connected[1..] {
                let better = if worst {
                    shared < best_shared
                } else {
                    shared > best_shared
                };
                if better {
                    best = k;
                    best_shared = shared;
                }
            }
            choice = best;
        }

        order.push(stack.remove(choice));
    }

    order
}

/// Every body permutation of a rule, for exhaustive planning in tests
pub fn all_permutations(rule: &Rule) -> Vec<Vec<usize>> {
    let mut base: Vec<usize> = (0..rule.body.len()).collect();
    let mut out = Vec::new();
    permute(&mut base, 0, &mut out);
    out
}

fn permute(items: &mut Vec<usize>, start: usize, out: &mut Vec<Vec<usize>>) {
    if start == items.len() {
        out.push(items.clone());
        return;
    }
    for i in start..items.len() {
        items.swap(start, i);
        permute(items, start + 1, out);
        items.swap(start, i);
    }
}
