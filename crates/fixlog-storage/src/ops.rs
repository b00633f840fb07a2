//! Relational primitives driven by planner metadata
//!
//! `project_join_filter` executes a multi-way equi-join as a nested scan
//! over its inputs: a cross-product candidate survives iff every variable
//! group holds a single value and every constant position matches, and the
//! survivors are projected to head arity. Constraints are checked as early
//! as their positions become available, so mismatching prefixes prune the
//! scan. Duplicates are not eliminated here; union does that.

use fixlog_core::{AggOp, RelationId, Tuple, Value};
use fixlog_planner::{AggSource, GroupingIndexes, JoinIndexes, NegSlot, ProjSlot};

use crate::manager::StorageManager;
use crate::relation::Relation;

/// Runtime storage errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// SUM applied to a non-integer operand
    SumOnNonInteger(Value),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::SumOnNonInteger(v) => {
                write!(f, "sum over non-integer value {}", v)
            }
        }
    }
}

impl std::error::Error for StorageError {}

/// Constraints that become checkable once input `i` is appended
#[derive(Debug, Default)]
struct LevelChecks {
    /// (flat position, required constant)
    consts: Vec<(usize, Value)>,
    /// (earlier flat position, flat position in this level)
    eqs: Vec<(usize, usize)>,
}

fn build_levels(jidx: &JoinIndexes) -> Vec<LevelChecks> {
    let mut levels: Vec<LevelChecks> = (0..jidx.atoms.len())
        .map(|_| LevelChecks::default())
        .collect();

    // The last level whose offset is <= pos owns the position (levels of
    // width zero contribute no positions).
    let level_of = |pos: usize| {
        let mut level = 0;
        for (i, &off) in jidx.offsets.iter().enumerate() {
            if off <= pos {
                level = i;
            } else {
                break;
            }
        }
        level
    };

    for (pos, value) in &jidx.const_indexes {
        levels[level_of(*pos)].consts.push((*pos, value.clone()));
    }
    for group in &jidx.var_indexes {
        let first = group[0];
        for &pos in &group[1..] {
            levels[level_of(pos)].eqs.push((first, pos));
        }
    }
    levels
}

/// Multi-way equi-join, filter and project per the join indexes
pub fn project_join_filter(inputs: &[&Relation], jidx: &JoinIndexes) -> Relation {
    let levels = build_levels(jidx);
    let mut out = Relation::new();
    let mut flat: Vec<&Value> = Vec::with_capacity(jidx.width);
    descend(0, inputs, jidx, &levels, &mut flat, &mut out);
    out
}

fn descend<'a>(
    level: usize,
    inputs: &[&'a Relation],
    jidx: &JoinIndexes,
    levels: &[LevelChecks],
    flat: &mut Vec<&'a Value>,
    out: &mut Relation,
) {
    if level == inputs.len() {
        out.push(project(jidx, flat));
        return;
    }

    let base = flat.len();
    'rows: for row in inputs[level].iter() {
        flat.extend(row.iter());
        for (pos, value) in &levels[level].consts {
            if flat[*pos] != value {
                flat.truncate(base);
                continue 'rows;
            }
        }
        for (first, pos) in &levels[level].eqs {
            if flat[*first] != flat[*pos] {
                flat.truncate(base);
                continue 'rows;
            }
        }
        descend(level + 1, inputs, jidx, levels, flat, out);
        flat.truncate(base);
    }
}

fn project(jidx: &JoinIndexes, flat: &[&Value]) -> Tuple {
    jidx.proj_indexes
        .iter()
        .map(|slot| match slot {
            ProjSlot::Const(v) => v.clone(),
            ProjSlot::Col(p) => flat[*p].clone(),
        })
        .collect()
}

/// Materialize the complement of a negated atom against its inferred
/// universe
///
/// Each column's universe comes from its `NegSlot`: a pinned constant, the
/// values occurring at the positive occurrences of the same variable, or
/// the full active domain for anonymous slots. The result is the cartesian
/// product of the universes minus the tuples of the negated relation.
pub fn complement(storage: &StorageManager, rid: RelationId, slots: &[NegSlot]) -> Relation {
    let universes: Vec<Vec<Value>> = slots
        .iter()
        .map(|slot| match slot {
            NegSlot::Const(v) => vec![v.clone()],
            NegSlot::Bound(occurrences) => {
                let mut seen = std::collections::HashSet::new();
                let mut values = Vec::new();
                for (source, col) in occurrences {
                    for v in storage.values_at(*source, *col) {
                        if seen.insert(v.clone()) {
                            values.push(v);
                        }
                    }
                }
                values
            }
            NegSlot::Free => storage.active_domain(),
        })
        .collect();

    let present = storage.known_derived(rid);
    let mut out = Relation::new();
    let mut candidate = Vec::with_capacity(slots.len());
    product(&universes, &mut candidate, &mut |tuple: &Tuple| {
        if !present.contains(tuple) {
            out.push(tuple.clone());
        }
    });
    out
}

fn product(universes: &[Vec<Value>], prefix: &mut Tuple, emit: &mut impl FnMut(&Tuple)) {
    if prefix.len() == universes.len() {
        emit(prefix);
        return;
    }
    let depth = prefix.len();
    for v in &universes[depth] {
        prefix.push(v.clone());
        product(universes, prefix, emit);
        prefix.pop();
    }
}

/// The aggregation operand of one row
fn operand<'a>(source: &'a AggSource, key: &'a [Value], row: &'a Tuple) -> &'a Value {
    match source {
        AggSource::GroupColumn(k) => &key[*k],
        AggSource::LocalColumn(c) => &row[*c],
        AggSource::Constant(v) => v,
    }
}

/// Partition the input by its group-by columns and aggregate each
/// partition, preserving first-seen group order
pub fn group_by_aggregate(
    input: &Relation,
    g: &GroupingIndexes,
) -> Result<Relation, StorageError> {
    let mut order: Vec<Tuple> = Vec::new();
    let mut partitions: std::collections::HashMap<Tuple, Vec<&Tuple>> =
        std::collections::HashMap::new();

    'rows: for row in input.iter() {
        for (col, value) in &g.const_indexes {
            if row.get(*col) != Some(value) {
                continue 'rows;
            }
        }
        for group in &g.var_indexes {
            let first = &row[group[0]];
            if group[1..].iter().any(|&col| &row[col] != first) {
                continue 'rows;
            }
        }

        let key: Tuple = g.group_by.iter().map(|&col| row[col].clone()).collect();
        if !partitions.contains_key(&key) {
            order.push(key.clone());
        }
        partitions.entry(key).or_default().push(row);
    }

    let mut out = Relation::new();
    for key in order {
        let rows = &partitions[&key];
        let mut tuple = key.clone();
        for (op, source) in &g.aggregates {
            tuple.push(aggregate(*op, source, &key, rows)?);
        }
        out.insert(tuple);
    }
    Ok(out)
}

fn aggregate(
    op: AggOp,
    source: &AggSource,
    key: &[Value],
    rows: &[&Tuple],
) -> Result<Value, StorageError> {
    match op {
        AggOp::Count => Ok(Value::Integer(rows.len() as i64)),
        AggOp::Sum => {
            let mut total = 0i64;
            for row in rows {
                let v = operand(source, key, row);
                match v.as_integer() {
                    Some(i) => total += i,
                    None => return Err(StorageError::SumOnNonInteger(v.clone())),
                }
            }
            Ok(Value::Integer(total))
        }
        AggOp::Min => Ok(rows
            .iter()
            .map(|row| operand(source, key, row))
            .min()
            .cloned()
            .unwrap_or(Value::Integer(0))),
        AggOp::Max => Ok(rows
            .iter()
            .map(|row| operand(source, key, row))
            .max()
            .cloned()
            .unwrap_or(Value::Integer(0))),
    }
}
