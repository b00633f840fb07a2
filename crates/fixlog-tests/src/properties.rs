//! Property-based invariants
//!
//! Generates random programs and verifies the cross-cutting guarantees:
//! both executors agree, sort orders never change results, semi-naive
//! evaluation matches the naive baseline, evaluation is monotone in the
//! EDB, and the engine agrees with reference computations done directly
//! in the test.

use std::collections::{HashMap, HashSet};

use fixlog_core::{AggOp, Atom, RelationId, Tuple};
use fixlog_eval::{Engine, Granularity, JitOptions, OnlineSort, Program, SortOrder};
use proptest::prelude::*;

use crate::{int, v};

/// Transitive-closure program over integer-labelled edges
fn tc_program(edges: &[(i64, i64)]) -> (Program, RelationId) {
    let mut program = Program::new();
    let edge = program.declare_relation("edge");
    let path = program.declare_relation("path");
    for (from, to) in edges {
        program.assert_edb(edge, vec![int(*from), int(*to)]).unwrap();
    }

    let x = program.declare_variable();
    let y = program.declare_variable();
    program
        .add_rule(
            Atom::new(path, vec![v(x), v(y)]),
            vec![Atom::new(edge, vec![v(x), v(y)])],
        )
        .unwrap();

    let x = program.declare_variable();
    let y = program.declare_variable();
    let z = program.declare_variable();
    program
        .add_rule(
            Atom::new(path, vec![v(x), v(z)]),
            vec![
                Atom::new(edge, vec![v(x), v(y)]),
                Atom::new(path, vec![v(y), v(z)]),
            ],
        )
        .unwrap();

    (program, path)
}

/// Reference reachability by saturation over the edge list
fn reference_closure(edges: &[(i64, i64)]) -> HashSet<Tuple> {
    let mut closure: HashSet<(i64, i64)> = edges.iter().copied().collect();
    loop {
        let mut next = closure.clone();
        for &(a, b) in &closure {
            for &(c, d) in &closure {
                if b == c {
                    next.insert((a, d));
                }
            }
        }
        if next.len() == closure.len() {
            break;
        }
        closure = next;
    }
    closure.into_iter().map(|(a, b)| vec![int(a), int(b)]).collect()
}

fn edges_strategy() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((0..6i64, 0..6i64), 0..16)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn executors_agree(edges in edges_strategy()) {
        let (program, path) = tc_program(&edges);
        let mut engine = Engine::new(program);
        let interpreted = engine.solve_interpreted(path).unwrap();

        for granularity in [Granularity::Program, Granularity::Rule, Granularity::Atom] {
            let (program, path) = tc_program(&edges);
            let options = JitOptions { granularity, ..JitOptions::default() };
            let mut engine = Engine::with_options(program, options);
            let compiled = engine.solve_compiled(path).unwrap();
            prop_assert_eq!(&interpreted, &compiled, "granularity {:?}", granularity);
        }
    }

    #[test]
    fn sort_orders_do_not_change_results(edges in edges_strategy()) {
        let (program, path) = tc_program(&edges);
        let mut engine = Engine::new(program);
        let baseline = engine.solve_interpreted(path).unwrap();

        for sort_order in [
            SortOrder::Badluck,
            SortOrder::Sel,
            SortOrder::Mixed,
            SortOrder::IntMax,
            SortOrder::Worst,
        ] {
            for online_sort in [OnlineSort::Off, OnlineSort::PerRule, OnlineSort::PerStep] {
                let (program, path) = tc_program(&edges);
                let options = JitOptions {
                    sort_order,
                    online_sort,
                    ..JitOptions::default()
                };
                let mut engine = Engine::with_options(program, options);
                let result = engine.solve_interpreted(path).unwrap();
                prop_assert_eq!(
                    &baseline, &result,
                    "{:?}/{:?}", sort_order, online_sort
                );
            }
        }
    }

    #[test]
    fn semi_naive_matches_naive(edges in edges_strategy()) {
        let (program, path) = tc_program(&edges);
        let mut engine = Engine::new(program);
        let semi = engine.solve_interpreted(path).unwrap();

        let (program, path) = tc_program(&edges);
        let mut engine = Engine::new(program);
        let naive = engine.solve_naive(path).unwrap();
        prop_assert_eq!(semi, naive);
    }

    #[test]
    fn matches_reference_closure(edges in edges_strategy()) {
        let (program, path) = tc_program(&edges);
        let mut engine = Engine::new(program);
        let result = engine.solve_interpreted(path).unwrap();
        prop_assert_eq!(result, reference_closure(&edges));
    }

    #[test]
    fn monotone_in_the_edb(edges in edges_strategy(), extra in edges_strategy()) {
        let (program, path) = tc_program(&edges);
        let mut engine = Engine::new(program);
        let smaller = engine.solve_interpreted(path).unwrap();

        let mut all = edges.clone();
        all.extend(extra);
        let (program, path) = tc_program(&all);
        let mut engine = Engine::new(program);
        let bigger = engine.solve_interpreted(path).unwrap();

        prop_assert!(smaller.is_subset(&bigger));
    }

    #[test]
    fn negation_is_set_difference(
        p_vals in prop::collection::hash_set(0..12i64, 0..10),
        q_vals in prop::collection::hash_set(0..12i64, 0..10),
    ) {
        let mut program = Program::new();
        let p = program.declare_relation("p");
        let q = program.declare_relation("q");
        let r = program.declare_relation("r");
        for &i in &p_vals {
            program.assert_edb(p, vec![int(i)]).unwrap();
        }
        for &i in &q_vals {
            program.assert_edb(q, vec![int(i)]).unwrap();
        }

        let x = program.declare_variable();
        program
            .add_rule(
                Atom::new(r, vec![v(x)]),
                vec![Atom::new(p, vec![v(x)]), Atom::new(q, vec![v(x)]).negated()],
            )
            .unwrap();

        let mut engine = Engine::new(program);
        let result = engine.solve_interpreted(r).unwrap();
        let expected: HashSet<Tuple> = p_vals
            .difference(&q_vals)
            .map(|&i| vec![int(i)])
            .collect();
        prop_assert_eq!(result, expected);
    }

    #[test]
    fn group_sums_match_reference(
        sales in prop::collection::vec((0..4i64, -50..50i64), 0..20),
    ) {
        let mut program = Program::new();
        let sales_rel = program.declare_relation("sales");
        let total = program.declare_relation("total");
        // Distinct tuples only: the EDB is a set, the reference must match
        let rows: HashSet<(i64, i64)> = sales.iter().copied().collect();
        for &(g, amount) in &rows {
            program.assert_edb(sales_rel, vec![int(g), int(amount)]).unwrap();
        }

        let g = program.declare_variable();
        let amount = program.declare_variable();
        let s = program.declare_variable();
        program
            .add_rule(
                Atom::new(total, vec![v(g), v(s)]),
                vec![Atom::grouping(
                    sales_rel,
                    vec![v(g), v(s)],
                    Atom::new(sales_rel, vec![v(g), v(amount)]),
                    vec![g],
                    vec![(AggOp::Sum, v(amount))],
                )],
            )
            .unwrap();

        let mut engine = Engine::new(program);
        let result = engine.solve_interpreted(total).unwrap();

        let mut sums: HashMap<i64, i64> = HashMap::new();
        for &(g, amount) in &rows {
            *sums.entry(g).or_insert(0) += amount;
        }
        let expected: HashSet<Tuple> = sums
            .into_iter()
            .map(|(g, s)| vec![int(g), int(s)])
            .collect();
        prop_assert_eq!(result, expected);
    }

    #[test]
    fn resolving_twice_is_idempotent(edges in edges_strategy()) {
        let (program, path) = tc_program(&edges);
        let mut engine = Engine::new(program);
        let first = engine.solve_interpreted(path).unwrap();
        let second = engine.solve_interpreted(path).unwrap();
        prop_assert_eq!(first, second);
    }
}

/// After a reported fixpoint, re-firing every rule derives nothing new:
/// re-solving through the naive baseline from the solved state cannot
/// grow the result.
#[test]
fn fixpoint_is_closed_under_rules() {
    let edges = [(0, 1), (1, 2), (2, 3), (3, 0)];
    let (program, path) = tc_program(&edges);
    let mut engine = Engine::new(program);
    let solved = engine.solve_interpreted(path).unwrap();
    let re_solved = engine.solve_naive(path).unwrap();
    assert_eq!(solved, re_solved);
}
