//! Relation catalog
//!
//! Maps relation names to ids and records each relation's arity. Arity is
//! fixed by first use (an EDB insert or the first atom mentioning the
//! relation) and enforced afterwards.

use std::collections::HashMap;

use internment::Intern;

use crate::term::{RelationId, Symbol};

/// Errors raised by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// A tuple or atom does not match the relation's recorded arity
    ArityMismatch {
        relation: String,
        expected: usize,
        found: usize,
    },
    /// A relation id that was never declared
    UnknownRelation(RelationId),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::ArityMismatch {
                relation,
                expected,
                found,
            } => write!(
                f,
                "arity mismatch for {}: expected {} arguments, found {}",
                relation, expected, found
            ),
            CatalogError::UnknownRelation(rid) => {
                write!(f, "unknown relation {}", rid)
            }
        }
    }
}

impl std::error::Error for CatalogError {}

/// Registry of declared relations
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    names: Vec<Symbol>,
    by_name: HashMap<Symbol, RelationId>,
    arities: Vec<Option<usize>>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    /// Declare a relation, or return its existing id
    pub fn declare(&mut self, name: &str) -> RelationId {
        let sym = Intern::new(name.to_string());
        if let Some(rid) = self.by_name.get(&sym) {
            return *rid;
        }
        let rid = RelationId(self.names.len() as u32);
        self.names.push(sym);
        self.by_name.insert(sym, rid);
        self.arities.push(None);
        rid
    }

    pub fn lookup(&self, name: &str) -> Option<RelationId> {
        self.by_name.get(&Intern::new(name.to_string())).copied()
    }

    pub fn is_declared(&self, rid: RelationId) -> bool {
        (rid.0 as usize) < self.names.len()
    }

    pub fn name(&self, rid: RelationId) -> Result<Symbol, CatalogError> {
        self.names
            .get(rid.0 as usize)
            .copied()
            .ok_or(CatalogError::UnknownRelation(rid))
    }

    pub fn arity(&self, rid: RelationId) -> Option<usize> {
        self.arities.get(rid.0 as usize).copied().flatten()
    }

    /// Record or check the relation's arity
    pub fn bind_arity(&mut self, rid: RelationId, arity: usize) -> Result<(), CatalogError> {
        if !self.is_declared(rid) {
            return Err(CatalogError::UnknownRelation(rid));
        }
        match self.arities[rid.0 as usize] {
            None => {
                self.arities[rid.0 as usize] = Some(arity);
                Ok(())
            }
            Some(expected) if expected == arity => Ok(()),
            Some(expected) => Err(CatalogError::ArityMismatch {
                relation: self.names[rid.0 as usize].to_string(),
                expected,
                found: arity,
            }),
        }
    }

    /// All declared relation ids
    pub fn relations(&self) -> impl Iterator<Item = RelationId> + '_ {
        (0..self.names.len() as u32).map(RelationId)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
