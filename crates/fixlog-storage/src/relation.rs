//! In-memory relations
//!
//! A relation is an insertion-ordered vector of tuples plus an auxiliary
//! set for fast membership. `insert` suppresses duplicates and reports
//! newness; `push` appends unconditionally (join outputs may carry
//! duplicates, the union step eliminates them).

use std::collections::HashSet;

use fixlog_core::Tuple;

/// An unordered multiset of tuples with ordered iteration
#[derive(Debug, Clone, Default)]
pub struct Relation {
    rows: Vec<Tuple>,
    seen: HashSet<Tuple>,
}

impl Relation {
    pub fn new() -> Self {
        Relation::default()
    }

    /// Build a deduplicated relation from tuples, preserving first-seen
    /// order
    pub fn from_tuples<I: IntoIterator<Item = Tuple>>(tuples: I) -> Self {
        let mut rel = Relation::new();
        for t in tuples {
            rel.insert(t);
        }
        rel
    }

    /// Insert with duplicate suppression; true iff the tuple was new
    pub fn insert(&mut self, tuple: Tuple) -> bool {
        if self.seen.insert(tuple.clone()) {
            self.rows.push(tuple);
            true
        } else {
            false
        }
    }

    /// Append without duplicate suppression
    pub fn push(&mut self, tuple: Tuple) {
        self.seen.insert(tuple.clone());
        self.rows.push(tuple);
    }

    pub fn contains(&self, tuple: &Tuple) -> bool {
        self.seen.contains(tuple)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[Tuple] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.seen.clear();
    }

    /// Element equality, ignoring order and multiplicity
    pub fn set_eq(&self, other: &Relation) -> bool {
        self.seen == other.seen
    }

    /// The distinct tuples as a set
    pub fn as_set(&self) -> &HashSet<Tuple> {
        &self.seen
    }
}

/// Multiset union with duplicate elimination, in first-seen order
pub fn union<'a, I: IntoIterator<Item = &'a Relation>>(relations: I) -> Relation {
    let mut out = Relation::new();
    for rel in relations {
        for row in rel.iter() {
            out.insert(row.clone());
        }
    }
    out
}

/// Tuples of `left` not in `right`, preserving left order
pub fn diff(left: &Relation, right: &Relation) -> Relation {
    let mut out = Relation::new();
    for row in left.iter() {
        if !right.contains(row) {
            out.insert(row.clone());
        }
    }
    out
}
