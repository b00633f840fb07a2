//! Stratification analysis
//!
//! Assigns each relation to a stratum so that negation and aggregation are
//! only ever applied to relations that are already fully computed. A
//! negated or grouping dependency bumps the consumer into a higher
//! stratum; a cycle through such an edge makes the program unstratifiable.

use std::collections::{HashMap, HashSet};

use fixlog_core::{RelationId, Rule};

use crate::compile::PlanError;
use crate::indexes::EdgeKind;

/// Result of stratification analysis
#[derive(Debug, Clone)]
pub struct Stratification {
    /// Map from relation to stratum number (0 = bottom)
    pub relation_strata: HashMap<RelationId, usize>,
    /// Rules organized by stratum of their head relation
    pub rules_by_stratum: Vec<Vec<Rule>>,
    pub num_strata: usize,
}

/// Dependency graph over relations
#[derive(Debug, Default)]
struct DependencyGraph {
    edges: HashMap<RelationId, Vec<(RelationId, EdgeKind)>>,
    relations: HashSet<RelationId>,
}

impl DependencyGraph {
    fn add(&mut self, from: RelationId, to: RelationId, kind: EdgeKind) {
        self.relations.insert(from);
        self.relations.insert(to);
        self.edges.entry(from).or_default().push((to, kind));
    }

    fn dependencies(&self, rid: RelationId) -> &[(RelationId, EdgeKind)] {
        self.edges.get(&rid).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn build_graph(rules: &[Rule]) -> DependencyGraph {
    let mut graph = DependencyGraph::default();
    for rule in rules {
        let head = rule.head.relation;
        graph.relations.insert(head);
        for atom in &rule.body {
            match &atom.group {
                Some(group) => graph.add(head, group.inner.relation, EdgeKind::Grouping),
                None if atom.negated => graph.add(head, atom.relation, EdgeKind::Negated),
                None => graph.add(head, atom.relation, EdgeKind::Positive),
            }
        }
    }
    graph
}

/// Depth-first search for a path from `from` back to `to` that passes
/// through at least one stratum-bumping edge
fn has_bump_cycle(
    graph: &DependencyGraph,
    from: RelationId,
    to: RelationId,
    visited: &mut HashSet<RelationId>,
    bumped: bool,
) -> bool {
    if from == to && bumped {
        return true;
    }
    if !visited.insert(from) {
        return false;
    }
    for &(dep, kind) in graph.dependencies(from) {
        let bumps = bumped || !matches!(kind, EdgeKind::Positive);
        if has_bump_cycle(graph, dep, to, visited, bumps) {
            return true;
        }
    }
    visited.remove(&from);
    false
}

fn detect_bump_cycle(graph: &DependencyGraph) -> Option<RelationId> {
    for &rid in &graph.relations {
        let mut visited = HashSet::new();
        if has_bump_cycle(graph, rid, rid, &mut visited, false) {
            return Some(rid);
        }
    }
    None
}

/// Iterate "stratum(head) >= stratum(dep), +1 across bumping edges" to
/// fixpoint
fn compute_strata(graph: &DependencyGraph) -> HashMap<RelationId, usize> {
    let mut strata: HashMap<RelationId, usize> =
        graph.relations.iter().map(|&r| (r, 0)).collect();

    let mut changed = true;
    while changed {
        changed = false;
        for &rid in &graph.relations {
            let mut required = 0;
            for &(dep, kind) in graph.dependencies(rid) {
                let dep_stratum = strata.get(&dep).copied().unwrap_or(0);
                let needed = match kind {
                    EdgeKind::Positive => dep_stratum,
                    EdgeKind::Negated | EdgeKind::Grouping => dep_stratum + 1,
                };
                required = required.max(needed);
            }
            if required > strata[&rid] {
                strata.insert(rid, required);
                changed = true;
            }
        }
    }

    strata
}

/// Stratify a program
pub fn stratify(rules: &[Rule]) -> Result<Stratification, PlanError> {
    if rules.is_empty() {
        return Ok(Stratification {
            relation_strata: HashMap::new(),
            rules_by_stratum: vec![],
            num_strata: 0,
        });
    }

    let graph = build_graph(rules);

    if let Some(witness) = detect_bump_cycle(&graph) {
        return Err(PlanError::Unstratifiable {
            relations: vec![witness],
        });
    }

    let relation_strata = compute_strata(&graph);
    let num_strata = relation_strata.values().max().copied().unwrap_or(0) + 1;

    let mut rules_by_stratum: Vec<Vec<Rule>> = vec![Vec::new(); num_strata];
    for rule in rules {
        let stratum = relation_strata
            .get(&rule.head.relation)
            .copied()
            .unwrap_or(0);
        rules_by_stratum[stratum].push(rule.clone());
    }

    Ok(Stratification {
        relation_strata,
        rules_by_stratum,
        num_strata,
    })
}
