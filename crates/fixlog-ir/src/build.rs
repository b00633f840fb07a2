//! Program-tree construction
//!
//! Translates stratified rules into the solve tree. Each stratum becomes a
//! seeded do-while loop; inside the loop, every head relation of the
//! stratum gets its semi-naive union of rule variants, earlier strata are
//! carried forward, and the iteration ends with a generation swap.

use std::sync::Arc;

use fixlog_core::{RelationId, Rule};
use fixlog_planner::{IndexCache, JoinIndexes, PlanError};

use crate::ir::{LoopTest, Op, ReadSlot, WriteSlot};

/// Build the full solve tree for a stratified program
///
/// `strata` is the planner's bucketing of rules by head stratum. Ground
/// fact rules must already be folded into the EDB; they produce no IR.
pub fn build_solve_tree(
    strata: &[Vec<Rule>],
    cache: &mut IndexCache,
) -> Result<Op, PlanError> {
    let mut steps = vec![Op::InitEvaluation];
    let mut carried: Vec<RelationId> = Vec::new();

    for stratum in strata {
        if stratum.is_empty() {
            continue;
        }
        steps.push(build_stratum(stratum, &carried, cache)?);
        for rid in stratum_heads(stratum) {
            if !carried.contains(&rid) {
                carried.push(rid);
            }
        }
    }

    Ok(Op::Sequence(steps))
}

/// Head relations of a stratum, in first-appearance order
fn stratum_heads(stratum: &[Rule]) -> Vec<RelationId> {
    let mut heads = Vec::new();
    for rule in stratum {
        if rule.is_ground_fact() {
            continue;
        }
        if !heads.contains(&rule.head.relation) {
            heads.push(rule.head.relation);
        }
    }
    heads
}

/// Positive body relations of a stratum: the slots semi-naive deltas
/// drive, and therefore the relations whose deltas need seeding
fn stratum_read_set(stratum: &[Rule]) -> Vec<RelationId> {
    let mut reads = Vec::new();
    for rule in stratum {
        for atom in &rule.body {
            if atom.negated || atom.is_grouping() {
                continue;
            }
            if !reads.contains(&atom.relation) {
                reads.push(atom.relation);
            }
        }
    }
    reads
}

fn build_stratum(
    stratum: &[Rule],
    carried: &[RelationId],
    cache: &mut IndexCache,
) -> Result<Op, PlanError> {
    let heads = stratum_heads(stratum);
    let mut body = Vec::new();

    for &head in &heads {
        let rules: Vec<&Rule> = stratum
            .iter()
            .filter(|r| !r.is_ground_fact() && r.head.relation == head)
            .collect();
        body.push(build_head_update(head, &rules, cache)?);
    }

    // Relations finished in earlier strata are re-inserted each iteration
    // so their contents survive the swap (their deltas stay empty).
    for &rid in carried {
        if heads.contains(&rid) {
            continue;
        }
        body.push(Op::Insert {
            relation: rid,
            slot: WriteSlot::Derived,
            value: Box::new(Op::Scan(rid, ReadSlot::Known)),
        });
    }

    body.push(Op::SwapAndClear);

    Ok(Op::Sequence(vec![
        Op::SeedDelta(stratum_read_set(stratum)),
        Op::DoWhile {
            test: LoopTest::DeltaEmpty(heads),
            body: Box::new(Op::Sequence(body)),
        },
    ]))
}

/// The per-iteration update of one head relation:
/// delta-new := union(variants) - known, then derived-new := known U delta-new
fn build_head_update(
    head: RelationId,
    rules: &[&Rule],
    cache: &mut IndexCache,
) -> Result<Op, PlanError> {
    let mut variants = Vec::new();
    for rule in rules {
        let jidx = cache.plan_rule(rule)?;
        variants.extend(rule_variants(&jidx));
    }

    Ok(Op::Sequence(vec![
        Op::Insert {
            relation: head,
            slot: WriteSlot::Delta,
            value: Box::new(Op::Diff(
                Box::new(Op::Union(variants)),
                Box::new(Op::Scan(head, ReadSlot::Known)),
            )),
        },
        Op::Insert {
            relation: head,
            slot: WriteSlot::Derived,
            value: Box::new(Op::Union(vec![
                Op::Scan(head, ReadSlot::Known),
                Op::Scan(head, ReadSlot::NewDelta),
            ])),
        },
    ]))
}

/// The semi-naive variants of one rule: one per delta-eligible body slot,
/// or a single all-known variant when the body has none
pub fn rule_variants(jidx: &Arc<JoinIndexes>) -> Vec<Op> {
    let eligible = jidx.delta_eligible();
    if eligible.is_empty() {
        return vec![build_variant(jidx, None)];
    }
    eligible
        .into_iter()
        .map(|i| build_variant(jidx, Some(i)))
        .collect()
}

fn build_variant(jidx: &Arc<JoinIndexes>, delta_idx: Option<usize>) -> Op {
    let inputs = jidx
        .atoms
        .iter()
        .enumerate()
        .map(|(k, atom)| {
            if let Some(grouping) = jidx.grouping_indexes.get(&k) {
                Op::Group {
                    input: Box::new(Op::Scan(grouping.inner_relation, ReadSlot::Known)),
                    grouping: grouping.clone(),
                }
            } else if atom.negated {
                Op::Complement {
                    relation: atom.relation,
                    slots: jidx.negation_info.get(&k).cloned().unwrap_or_default(),
                }
            } else if delta_idx == Some(k) {
                Op::Scan(atom.relation, ReadSlot::Delta)
            } else {
                Op::Scan(atom.relation, ReadSlot::Known)
            }
        })
        .collect();

    Op::ProjectJoinFilter {
        jidx: jidx.clone(),
        inputs,
        delta_idx,
    }
}
