//! Join-index compilation
//!
//! Builds a `JoinIndexes` record from a raw rule. Variable collection
//! scans flat body positions left to right; the first occurrence in a
//! non-negated position becomes the variable's canonical position (the
//! outer tuple of a grouping atom binds like a positive atom). Head
//! variables without a canonical position, variables that occur only under
//! negation, and unbound aggregation operands are rejected here.

use std::collections::{BTreeMap, HashMap};

use fixlog_core::{Atom, RelationId, Rule, Term, VarId};

use crate::indexes::{
    AggSource, EdgeKind, GroupingIndexes, JoinIndexes, NegSlot, ProjSlot,
};

/// Errors detected at planning time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A variable occurs only in negated body positions
    VariableOnlyInNegatedContext { rule: String, var: VarId },
    /// A head variable is not bound by any positive body position
    FreeHeadVariable { rule: String, var: VarId },
    /// The head contains an anonymous variable
    AnonymousHeadVariable { rule: String },
    /// An aggregation operand is neither a group-by variable, a local
    /// variable of the grouped sub-atom, nor a constant
    AggregationOnUnboundVariable { rule: String, var: VarId },
    /// A negated atom constrains a variable whose only binding is an
    /// aggregate result; no finite universe can be inferred for it
    NegationOverAggregateResult { rule: String, var: VarId },
    /// A grouped sub-atom is itself negated or grouping
    InvalidGroupedAtom { rule: String },
    /// A grouping atom's outer tuple does not match its key and
    /// aggregate counts
    ArityMismatch {
        rule: String,
        expected: usize,
        found: usize,
    },
    /// The rule graph has a cycle through a negated or grouping edge
    Unstratifiable { relations: Vec<RelationId> },
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::VariableOnlyInNegatedContext { rule, var } => write!(
                f,
                "variable ?{} occurs only in negated context in rule '{}'",
                var.0, rule
            ),
            PlanError::FreeHeadVariable { rule, var } => {
                write!(f, "free variable ?{} in head of rule '{}'", var.0, rule)
            }
            PlanError::AnonymousHeadVariable { rule } => {
                write!(f, "anonymous variable in head of rule '{}'", rule)
            }
            PlanError::AggregationOnUnboundVariable { rule, var } => write!(
                f,
                "aggregation over unbound variable ?{} in rule '{}'",
                var.0, rule
            ),
            PlanError::NegationOverAggregateResult { rule, var } => write!(
                f,
                "negation constrains aggregate result ?{} in rule '{}'",
                var.0, rule
            ),
            PlanError::InvalidGroupedAtom { rule } => {
                write!(f, "grouped sub-atom must be plain positive in rule '{}'", rule)
            }
            PlanError::ArityMismatch {
                rule,
                expected,
                found,
            } => write!(
                f,
                "grouping arity mismatch in rule '{}': expected {} terms, found {}",
                rule, expected, found
            ),
            PlanError::Unstratifiable { relations } => {
                write!(f, "cycle through negation or aggregation involving")?;
                for rid in relations {
                    write!(f, " {}", rid)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for PlanError {}

/// Per-variable bookkeeping during compilation
#[derive(Debug, Default)]
struct VarInfo {
    /// First non-negated flat position
    canonical: Option<usize>,
    /// Every flat position, in scan order
    positions: Vec<usize>,
    /// Occurrences usable to infer a negation universe
    scannable: Vec<(RelationId, usize)>,
    /// Bound (only) by an aggregate-result column
    from_aggregate: bool,
}

/// Compile a rule in its user-supplied body order
pub fn compile_rule(rule: &Rule) -> Result<JoinIndexes, PlanError> {
    let perm: Vec<usize> = (0..rule.body.len()).collect();
    compile_permutation(rule, &perm)
}

/// Compile a body permutation of a rule
pub fn compile_permutation(rule: &Rule, perm: &[usize]) -> Result<JoinIndexes, PlanError> {
    let label = rule.to_string();
    let atoms: Vec<Atom> = perm.iter().map(|&i| rule.body[i].clone()).collect();

    // Grouping metadata first: the flat walk needs the key-column mapping
    // of grouping atoms to resolve scannable occurrences.
    let mut grouping_indexes = HashMap::new();
    for (ai, atom) in atoms.iter().enumerate() {
        if atom.is_grouping() {
            grouping_indexes.insert(ai, compile_grouping(atom, &label)?);
        }
    }

    let mut offsets = Vec::with_capacity(atoms.len());
    let mut width = 0;
    for atom in &atoms {
        offsets.push(width);
        width += atom.arity();
    }

    let mut vars: BTreeMap<VarId, VarInfo> = BTreeMap::new();
    let mut const_indexes = Vec::new();

    for (ai, atom) in atoms.iter().enumerate() {
        let off = offsets[ai];
        let keys = grouping_indexes
            .get(&ai)
            .map(|g| g.group_by.len())
            .unwrap_or(0);
        for (ti, term) in atom.terms.iter().enumerate() {
            let p = off + ti;
            match term {
                Term::Constant(v) => const_indexes.push((p, v.clone())),
                Term::Variable(var) if var.anon => {}
                Term::Variable(var) => {
                    let info = vars.entry(var.id).or_default();
                    info.positions.push(p);
                    if !atom.negated {
                        if info.canonical.is_none() {
                            info.canonical = Some(p);
                        }
                        if let Some(g) = grouping_indexes.get(&ai) {
                            if ti < keys {
                                info.scannable.push((g.inner_relation, g.group_by[ti]));
                            } else {
                                info.from_aggregate = true;
                            }
                        } else {
                            info.scannable.push((atom.relation, ti));
                        }
                    }
                }
            }
        }
    }

    // Variables with occurrences but no positive binding.
    for (var, info) in &vars {
        if info.canonical.is_none() {
            return Err(PlanError::VariableOnlyInNegatedContext {
                rule: label.clone(),
                var: *var,
            });
        }
    }

    let var_indexes: Vec<Vec<usize>> = vars
        .values()
        .filter(|info| info.positions.len() >= 2)
        .map(|info| info.positions.clone())
        .collect();

    let mut proj_indexes = Vec::with_capacity(rule.head.arity());
    for term in &rule.head.terms {
        match term {
            Term::Constant(v) => proj_indexes.push(ProjSlot::Const(v.clone())),
            Term::Variable(var) if var.anon => {
                return Err(PlanError::AnonymousHeadVariable { rule: label.clone() });
            }
            Term::Variable(var) => match vars.get(&var.id).and_then(|i| i.canonical) {
                Some(p) => proj_indexes.push(ProjSlot::Col(p)),
                None => {
                    return Err(PlanError::FreeHeadVariable {
                        rule: label.clone(),
                        var: var.id,
                    });
                }
            },
        }
    }

    let deps = atoms
        .iter()
        .map(|atom| match &atom.group {
            Some(group) => (EdgeKind::Grouping, group.inner.relation),
            None if atom.negated => (EdgeKind::Negated, atom.relation),
            None => (EdgeKind::Positive, atom.relation),
        })
        .collect();

    let mut negation_info = HashMap::new();
    for (ai, atom) in atoms.iter().enumerate() {
        if !atom.negated {
            continue;
        }
        let mut slots = Vec::with_capacity(atom.arity());
        for term in &atom.terms {
            let slot = match term {
                Term::Constant(v) => NegSlot::Const(v.clone()),
                Term::Variable(var) if var.anon => NegSlot::Free,
                Term::Variable(var) => {
                    // Canonical binding exists (checked above); a binding
                    // that is only an aggregate output has no relation
                    // column to read a universe from.
                    let info = &vars[&var.id];
                    if info.scannable.is_empty() {
                        return Err(PlanError::NegationOverAggregateResult {
                            rule: label.clone(),
                            var: var.id,
                        });
                    }
                    NegSlot::Bound(info.scannable.clone())
                }
            };
            slots.push(slot);
        }
        negation_info.insert(ai, slots);
    }

    Ok(JoinIndexes {
        rule_hash: rule.stable_hash(),
        perm: perm.to_vec(),
        head: rule.head.clone(),
        atoms: atoms.clone(),
        offsets,
        width,
        var_indexes,
        const_indexes,
        proj_indexes,
        deps,
        cxns: connectivity(&atoms),
        negation_info,
        grouping_indexes,
        edb: rule.is_ground_fact(),
    })
}

/// Named variables of a body atom's outer tuple
fn outer_vars(atom: &Atom) -> Vec<VarId> {
    let mut seen = Vec::new();
    for term in &atom.terms {
        if let Some(var) = term.as_named_var() {
            if !seen.contains(&var.id) {
                seen.push(var.id);
            }
        }
    }
    seen
}

/// Number of named variables two atoms share. Anonymous variables never
/// create a connection.
pub fn shared_var_count(a: &Atom, b: &Atom) -> usize {
    let av = outer_vars(a);
    outer_vars(b).iter().filter(|v| av.contains(v)).count()
}

/// Exhaustive pairwise connectivity map, grouped by intersection size
fn connectivity(atoms: &[Atom]) -> HashMap<u64, BTreeMap<usize, Vec<u64>>> {
    let mut cxns: HashMap<u64, BTreeMap<usize, Vec<u64>>> = HashMap::new();
    for (i, a) in atoms.iter().enumerate() {
        for (j, b) in atoms.iter().enumerate() {
            if i == j {
                continue;
            }
            let shared = shared_var_count(a, b);
            if shared > 0 {
                cxns.entry(a.stable_hash())
                    .or_default()
                    .entry(shared)
                    .or_default()
                    .push(b.stable_hash());
            }
        }
    }
    cxns
}

/// Compile the metadata of one grouping atom
fn compile_grouping(atom: &Atom, label: &str) -> Result<GroupingIndexes, PlanError> {
    let group = atom.group.as_ref().ok_or_else(|| PlanError::InvalidGroupedAtom {
        rule: label.to_string(),
    })?;
    let inner = group.inner.as_ref();
    if inner.negated || inner.is_grouping() {
        return Err(PlanError::InvalidGroupedAtom {
            rule: label.to_string(),
        });
    }

    let expected = group.group_by.len() + group.aggregates.len();
    if atom.arity() != expected {
        return Err(PlanError::ArityMismatch {
            rule: label.to_string(),
            expected,
            found: atom.arity(),
        });
    }

    // Inner occurrences: repeated variables induce equalities, constants
    // pin columns.
    let mut occurrences: BTreeMap<VarId, Vec<usize>> = BTreeMap::new();
    let mut const_indexes = Vec::new();
    for (ti, term) in inner.terms.iter().enumerate() {
        match term {
            Term::Constant(v) => const_indexes.push((ti, v.clone())),
            Term::Variable(var) if var.anon => {}
            Term::Variable(var) => occurrences.entry(var.id).or_default().push(ti),
        }
    }

    let var_indexes = occurrences
        .values()
        .filter(|cols| cols.len() >= 2)
        .map(|cols| cols.clone())
        .collect();

    let mut group_by = Vec::with_capacity(group.group_by.len());
    for gv in &group.group_by {
        match occurrences.get(&gv.id).map(|cols| cols[0]) {
            Some(col) => group_by.push(col),
            None => {
                return Err(PlanError::AggregationOnUnboundVariable {
                    rule: label.to_string(),
                    var: gv.id,
                });
            }
        }
    }

    let mut aggregates = Vec::with_capacity(group.aggregates.len());
    for (op, term) in &group.aggregates {
        let source = match term {
            Term::Constant(v) => AggSource::Constant(v.clone()),
            Term::Variable(var) => {
                if var.anon {
                    return Err(PlanError::AggregationOnUnboundVariable {
                        rule: label.to_string(),
                        var: var.id,
                    });
                }
                if let Some(k) = group.group_by.iter().position(|g| g.id == var.id) {
                    AggSource::GroupColumn(k)
                } else if let Some(cols) = occurrences.get(&var.id) {
                    AggSource::LocalColumn(cols[0])
                } else {
                    return Err(PlanError::AggregationOnUnboundVariable {
                        rule: label.to_string(),
                        var: var.id,
                    });
                }
            }
        };
        aggregates.push((*op, source));
    }

    Ok(GroupingIndexes {
        inner_relation: inner.relation,
        inner_arity: inner.arity(),
        var_indexes,
        const_indexes,
        group_by,
        aggregates,
    })
}
