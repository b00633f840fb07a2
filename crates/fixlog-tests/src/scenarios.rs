//! Concrete evaluation scenarios
//!
//! Each test builds a small program through the public builder and checks
//! the exact result set, through both executors where the scenario is the
//! interesting one.

use std::collections::HashSet;

use fixlog_core::{AggOp, Atom, RelationId, Tuple};
use fixlog_eval::{Engine, Program};

use crate::{atom_val, int, v};

fn edge_program(edges: &[(&str, &str)]) -> (Program, RelationId, RelationId) {
    let mut program = Program::new();
    let edge = program.declare_relation("edge");
    let path = program.declare_relation("path");
    for (from, to) in edges {
        program
            .assert_edb(edge, vec![atom_val(from), atom_val(to)])
            .unwrap();
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

    (program, edge, path)
}

fn pairs(pairs: &[(&str, &str)]) -> HashSet<Tuple> {
    pairs
        .iter()
        .map(|(a, b)| vec![atom_val(a), atom_val(b)])
        .collect()
}

// ===== Transitive closure =====

#[test]
fn transitive_closure_chain() {
    let (program, _, path) = edge_program(&[("a", "b"), ("b", "c"), ("c", "d")]);
    let mut engine = Engine::new(program);
    let expected = pairs(&[
        ("a", "b"),
        ("b", "c"),
        ("c", "d"),
        ("a", "c"),
        ("b", "d"),
        ("a", "d"),
    ]);
    assert_eq!(engine.solve_interpreted(path).unwrap(), expected);

    let (program, _, path) = edge_program(&[("a", "b"), ("b", "c"), ("c", "d")]);
    let mut engine = Engine::new(program);
    assert_eq!(engine.solve_compiled(path).unwrap(), expected);
}

#[test]
fn transitive_closure_with_cycle() {
    let (program, _, path) = edge_program(&[("a", "b"), ("b", "a")]);
    let mut engine = Engine::new(program);
    let expected = pairs(&[("a", "b"), ("b", "a"), ("a", "a"), ("b", "b")]);
    assert_eq!(engine.solve_interpreted(path).unwrap(), expected);
}

// ===== Hops-k chains =====

#[test]
fn hops_k_chain() {
    // hops1 = edge; hopsk(x, y) :- hops1(x, z), hops(k-1)(z, y).
    let mut program = Program::new();
    let edge = program.declare_relation("edge");
    let hops: Vec<RelationId> = (1..=4)
        .map(|k| program.declare_relation(&format!("hops{}", k)))
        .collect();
    for (from, to) in [("a", "b"), ("b", "c"), ("c", "d")] {
        program
            .assert_edb(edge, vec![atom_val(from), atom_val(to)])
            .unwrap();
    }

    let x = program.declare_variable();
    let y = program.declare_variable();
    program
        .add_rule(
            Atom::new(hops[0], vec![v(x), v(y)]),
            vec![Atom::new(edge, vec![v(x), v(y)])],
        )
        .unwrap();
    for k in 1..4 {
        let x = program.declare_variable();
        let y = program.declare_variable();
        let z = program.declare_variable();
        program
            .add_rule(
                Atom::new(hops[k], vec![v(x), v(y)]),
                vec![
                    Atom::new(hops[0], vec![v(x), v(z)]),
                    Atom::new(hops[k - 1], vec![v(z), v(y)]),
                ],
            )
            .unwrap();
    }

    let mut engine = Engine::new(program);
    assert_eq!(
        engine.solve_interpreted(hops[1]).unwrap(),
        pairs(&[("a", "c"), ("b", "d")])
    );
    assert_eq!(
        engine.solve_interpreted(hops[2]).unwrap(),
        pairs(&[("a", "d")])
    );
    assert!(engine.solve_interpreted(hops[3]).unwrap().is_empty());
}

// ===== Negation =====

#[test]
fn negation_filters_members() {
    // r(x) :- p(x), !q(x).  p = {1,2,3}, q = {2}  =>  r = {1,3}
    let mut program = Program::new();
    let p = program.declare_relation("p");
    let q = program.declare_relation("q");
    let r = program.declare_relation("r");
    for i in [1, 2, 3] {
        program.assert_edb(p, vec![int(i)]).unwrap();
    }
    program.assert_edb(q, vec![int(2)]).unwrap();

    let x = program.declare_variable();
    program
        .add_rule(
            Atom::new(r, vec![v(x)]),
            vec![Atom::new(p, vec![v(x)]), Atom::new(q, vec![v(x)]).negated()],
        )
        .unwrap();

    let mut engine = Engine::new(program);
    let expected: HashSet<Tuple> = [vec![int(1)], vec![int(3)]].into_iter().collect();
    assert_eq!(engine.solve_interpreted(r).unwrap(), expected);
}

#[test]
fn negation_over_derived_relation() {
    // reachable via edges; isolated(x) :- node(x), !reached(x).
    let mut program = Program::new();
    let node = program.declare_relation("node");
    let edge = program.declare_relation("edge");
    let reached = program.declare_relation("reached");
    let isolated = program.declare_relation("isolated");
    for n in ["a", "b", "c", "d"] {
        program.assert_edb(node, vec![atom_val(n)]).unwrap();
    }
    program
        .assert_edb(edge, vec![atom_val("a"), atom_val("b")])
        .unwrap();
    program
        .assert_edb(edge, vec![atom_val("b"), atom_val("c")])
        .unwrap();

    let x = program.declare_variable();
    let y = program.declare_variable();
    program
        .add_rule(
            Atom::new(reached, vec![v(y)]),
            vec![Atom::new(edge, vec![v(x), v(y)])],
        )
        .unwrap();
    let x = program.declare_variable();
    program
        .add_rule(
            Atom::new(isolated, vec![v(x)]),
            vec![
                Atom::new(node, vec![v(x)]),
                Atom::new(reached, vec![v(x)]).negated(),
            ],
        )
        .unwrap();

    let mut engine = Engine::new(program);
    let expected: HashSet<Tuple> = [vec![atom_val("a")], vec![atom_val("d")]]
        .into_iter()
        .collect();
    assert_eq!(engine.solve_interpreted(isolated).unwrap(), expected);
}

// ===== Aggregation =====

#[test]
fn sum_by_group() {
    // total(g, sum(v)) over sales = {(east,10),(east,20),(west,5)}
    let mut program = Program::new();
    let sales = program.declare_relation("sales");
    let total = program.declare_relation("total");
    for (region, amount) in [("east", 10), ("east", 20), ("west", 5)] {
        program
            .assert_edb(sales, vec![atom_val(region), int(amount)])
            .unwrap();
    }

    let g = program.declare_variable();
    let amount = program.declare_variable();
    let s = program.declare_variable();
    program
        .add_rule(
            Atom::new(total, vec![v(g), v(s)]),
            vec![Atom::grouping(
                sales,
                vec![v(g), v(s)],
                Atom::new(sales, vec![v(g), v(amount)]),
                vec![g],
                vec![(AggOp::Sum, v(amount))],
            )],
        )
        .unwrap();

    let mut engine = Engine::new(program);
    let expected: HashSet<Tuple> = [
        vec![atom_val("east"), int(30)],
        vec![atom_val("west"), int(5)],
    ]
    .into_iter()
    .collect();
    assert_eq!(engine.solve_interpreted(total).unwrap(), expected);

    // And identically through the staged executor
    let mut program = Program::new();
    let sales = program.declare_relation("sales");
    let total = program.declare_relation("total");
    for (region, amount) in [("east", 10), ("east", 20), ("west", 5)] {
        program
            .assert_edb(sales, vec![atom_val(region), int(amount)])
            .unwrap();
    }
    let g = program.declare_variable();
    let amount = program.declare_variable();
    let s = program.declare_variable();
    program
        .add_rule(
            Atom::new(total, vec![v(g), v(s)]),
            vec![Atom::grouping(
                sales,
                vec![v(g), v(s)],
                Atom::new(sales, vec![v(g), v(amount)]),
                vec![g],
                vec![(AggOp::Sum, v(amount))],
            )],
        )
        .unwrap();
    let mut engine = Engine::new(program);
    assert_eq!(engine.solve_compiled(total).unwrap(), expected);
}

#[test]
fn count_min_max_by_group() {
    let mut program = Program::new();
    let sales = program.declare_relation("sales");
    let stats = program.declare_relation("stats");
    for (region, amount) in [("east", 10), ("east", 20), ("west", 5)] {
        program
            .assert_edb(sales, vec![atom_val(region), int(amount)])
            .unwrap();
    }

    let g = program.declare_variable();
    let amount = program.declare_variable();
    let n = program.declare_variable();
    let lo = program.declare_variable();
    let hi = program.declare_variable();
    program
        .add_rule(
            Atom::new(stats, vec![v(g), v(n), v(lo), v(hi)]),
            vec![Atom::grouping(
                sales,
                vec![v(g), v(n), v(lo), v(hi)],
                Atom::new(sales, vec![v(g), v(amount)]),
                vec![g],
                vec![
                    (AggOp::Count, v(amount)),
                    (AggOp::Min, v(amount)),
                    (AggOp::Max, v(amount)),
                ],
            )],
        )
        .unwrap();

    let mut engine = Engine::new(program);
    let expected: HashSet<Tuple> = [
        vec![atom_val("east"), int(2), int(10), int(20)],
        vec![atom_val("west"), int(1), int(5), int(5)],
    ]
    .into_iter()
    .collect();
    assert_eq!(engine.solve_interpreted(stats).unwrap(), expected);
}

#[test]
fn aggregation_over_derived_relation() {
    // Count the out-degree of each node over the derived path relation
    let (mut program, _, path) = {
        let mut program = Program::new();
        let edge = program.declare_relation("edge");
        let path = program.declare_relation("path");
        for (from, to) in [("a", "b"), ("b", "c")] {
            program
                .assert_edb(edge, vec![atom_val(from), atom_val(to)])
                .unwrap();
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
        (program, edge, path)
    };

    let degree = program.declare_relation("degree");
    let x = program.declare_variable();
    let y = program.declare_variable();
    let n = program.declare_variable();
    program
        .add_rule(
            Atom::new(degree, vec![v(x), v(n)]),
            vec![Atom::grouping(
                path,
                vec![v(x), v(n)],
                Atom::new(path, vec![v(x), v(y)]),
                vec![x],
                vec![(AggOp::Count, v(y))],
            )],
        )
        .unwrap();

    let mut engine = Engine::new(program);
    // path = {(a,b),(b,c),(a,c)}; out-degrees: a=2, b=1
    let expected: HashSet<Tuple> = [
        vec![atom_val("a"), int(2)],
        vec![atom_val("b"), int(1)],
    ]
    .into_iter()
    .collect();
    assert_eq!(engine.solve_interpreted(degree).unwrap(), expected);
}

// ===== Self-join with constant filter =====

#[test]
fn siblings_via_self_join() {
    // kin = {(a,b),(b,c),(a,d)}
    // same(x, x) :- kin(p, x).
    // sib(x, y) :- kin(p, x), kin(p, y), !same(x, y).
    let mut program = Program::new();
    let kin = program.declare_relation("kin");
    let same = program.declare_relation("same");
    let sib = program.declare_relation("sib");
    for (parent, child) in [("a", "b"), ("b", "c"), ("a", "d")] {
        program
            .assert_edb(kin, vec![atom_val(parent), atom_val(child)])
            .unwrap();
    }

    let p = program.anonymous_variable();
    let x = program.declare_variable();
    program
        .add_rule(
            Atom::new(same, vec![v(x), v(x)]),
            vec![Atom::new(kin, vec![v(p), v(x)])],
        )
        .unwrap();

    let p = program.declare_variable();
    let x = program.declare_variable();
    let y = program.declare_variable();
    program
        .add_rule(
            Atom::new(sib, vec![v(x), v(y)]),
            vec![
                Atom::new(kin, vec![v(p), v(x)]),
                Atom::new(kin, vec![v(p), v(y)]),
                Atom::new(same, vec![v(x), v(y)]).negated(),
            ],
        )
        .unwrap();

    let mut engine = Engine::new(program);
    assert_eq!(
        engine.solve_interpreted(sib).unwrap(),
        pairs(&[("b", "d"), ("d", "b")])
    );
}

#[test]
fn constant_filter_in_body() {
    // child_of_a(x) :- kin(a, x).
    let mut program = Program::new();
    let kin = program.declare_relation("kin");
    let child_of_a = program.declare_relation("child_of_a");
    for (parent, child) in [("a", "b"), ("b", "c"), ("a", "d")] {
        program
            .assert_edb(kin, vec![atom_val(parent), atom_val(child)])
            .unwrap();
    }

    let x = program.declare_variable();
    program
        .add_rule(
            Atom::new(child_of_a, vec![v(x)]),
            vec![Atom::new(
                kin,
                vec![fixlog_core::Term::constant(atom_val("a")), v(x)],
            )],
        )
        .unwrap();

    let mut engine = Engine::new(program);
    let expected: HashSet<Tuple> = [vec![atom_val("b")], vec![atom_val("d")]]
        .into_iter()
        .collect();
    assert_eq!(engine.solve_interpreted(child_of_a).unwrap(), expected);
}

// ===== Empty fixpoint =====

#[test]
fn empty_edb_terminates_immediately() {
    let (program, _, path) = edge_program(&[]);
    let mut engine = Engine::new(program);
    assert!(engine.solve_interpreted(path).unwrap().is_empty());

    let (program, _, path) = edge_program(&[]);
    let mut engine = Engine::new(program);
    assert!(engine.solve_compiled(path).unwrap().is_empty());
}

// ===== Longer chains =====

#[test]
fn long_chain_full_closure() {
    let names: Vec<String> = (0..30).map(|i| format!("n{}", i)).collect();
    let edges: Vec<(&str, &str)> = names
        .windows(2)
        .map(|w| (w[0].as_str(), w[1].as_str()))
        .collect();
    let (program, _, path) = edge_program(&edges);
    let mut engine = Engine::new(program);
    let result = engine.solve_interpreted(path).unwrap();
    // 29 edges give 29 + 28 + ... + 1 paths
    assert_eq!(result.len(), 29 * 30 / 2);
    assert!(result.contains(&vec![atom_val("n0"), atom_val("n29")]));
}
