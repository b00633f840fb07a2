//! Program builder
//!
//! The surface a host DSL drives: declare relations and variables, assert
//! EDB facts, add rules. Arity is bound on first use and validated on
//! every later use; ground-fact rules are accepted and folded into the
//! EDB when the engine is built.

use fixlog_core::{Atom, Catalog, RelationId, Rule, Tuple, Var, VarId};

use crate::error::EvalError;

/// A program under construction
#[derive(Debug, Default)]
pub struct Program {
    pub(crate) catalog: Catalog,
    pub(crate) rules: Vec<Rule>,
    pub(crate) facts: Vec<(RelationId, Tuple)>,
    next_var: u32,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    /// Declare a relation, or fetch its existing id
    pub fn declare_relation(&mut self, name: &str) -> RelationId {
        self.catalog.declare(name)
    }

    /// A fresh named variable
    pub fn declare_variable(&mut self) -> Var {
        let id = VarId(self.next_var);
        self.next_var += 1;
        Var::new(id)
    }

    /// A fresh anonymous variable; each one is distinct
    pub fn anonymous_variable(&mut self) -> Var {
        let id = VarId(self.next_var);
        self.next_var += 1;
        Var::anonymous(id)
    }

    /// Assert a ground tuple into a relation's EDB
    pub fn assert_edb(&mut self, rid: RelationId, tuple: Tuple) -> Result<(), EvalError> {
        self.catalog.bind_arity(rid, tuple.len())?;
        self.facts.push((rid, tuple));
        Ok(())
    }

    /// Add a rule; its atoms bind or check relation arities
    pub fn add_rule(&mut self, head: Atom, body: Vec<Atom>) -> Result<(), EvalError> {
        let rule = Rule::new(head, body);
        self.bind_atom(&rule.head)?;
        for atom in &rule.body {
            self.bind_atom(atom)?;
        }
        self.rules.push(rule);
        Ok(())
    }

    fn bind_atom(&mut self, atom: &Atom) -> Result<(), EvalError> {
        match &atom.group {
            Some(group) => {
                // The grouping atom's outer tuple is a derived view; only
                // the grouped sub-atom names a stored relation.
                self.catalog.bind_arity(group.inner.relation, group.inner.arity())?;
            }
            None => {
                self.catalog.bind_arity(atom.relation, atom.arity())?;
            }
        }
        Ok(())
    }

    /// Relation ids referenced anywhere in the rule set
    pub(crate) fn referenced_relations(&self) -> Vec<RelationId> {
        let mut rids = Vec::new();
        let mut visit = |rid: RelationId| {
            if !rids.contains(&rid) {
                rids.push(rid);
            }
        };
        for rule in &self.rules {
            visit(rule.head.relation);
            for atom in &rule.body {
                match &atom.group {
                    Some(group) => visit(group.inner.relation),
                    None => visit(atom.relation),
                }
            }
        }
        rids
    }

}
