//! Grouping and aggregation stage.
//!
//! Partitions the upstream binding stream by grouping-key tuples
//! (groups in first-occurrence order, contributor order preserved),
//! folds every aggregate node per group, binds the folded values into a
//! representative group binding, and filters whole groups through the
//! having clauses.
//!
//! Without grouping keys the whole upstream stream folds as a single
//! group, which may be empty - aggregates then emit their defaults.

use indexmap::IndexMap;

use tracing::trace;

use crate::binding::Binding;
use crate::ir::{NodeId, NodeKind};
use crate::value::Value;

use super::{EvalResult, Evaluator};

/// Group, fold and filter. Returns one binding per surviving group.
pub fn apply(
    ev: &Evaluator<'_>,
    group_keys: &[NodeId],
    aggregates: &[NodeId],
    havings: &[NodeId],
    upstream: Vec<Binding>,
) -> EvalResult<Vec<Binding>> {
    let mut groups: IndexMap<Vec<Value>, Vec<Binding>> = IndexMap::new();
    if group_keys.is_empty() {
        // single whole-stream group, possibly empty
        groups.insert(Vec::new(), upstream);
    } else {
        for binding in upstream {
            let mut key = Vec::with_capacity(group_keys.len());
            for key_node in group_keys {
                key.push(ev.resolve_value(*key_node, &binding)?);
            }
            groups.entry(key).or_default().push(binding);
        }
    }
    trace!(groups = groups.len(), "grouping stage");

    let mut out = Vec::with_capacity(groups.len());
    'groups: for (key, contributors) in groups {
        let mut rep = contributors.first().cloned().unwrap_or_default();
        for aggregate in aggregates {
            let node = ev.dag().node(*aggregate);
            let NodeKind::Aggregate { val_id, .. } = &node.kind else {
                continue;
            };
            let folded = fold_aggregate(ev, *aggregate, &contributors)?;
            if let Some(bound) = rep.bind(*val_id, folded) {
                rep = bound;
            }
        }
        for having in havings {
            if !ev.eval_truth(*having, rep.clone())? {
                trace!(key = ?key, "group filtered by having");
                continue 'groups;
            }
        }
        out.push(rep);
    }
    Ok(out)
}

/// Fold one aggregate node over a group's contributor bindings
fn fold_aggregate(
    ev: &Evaluator<'_>,
    id: NodeId,
    contributors: &[Binding],
) -> EvalResult<Value> {
    let node = ev.dag().node(id);
    let NodeKind::Aggregate {
        kind,
        distinct,
        default,
        has_key,
        ..
    } = &node.kind
    else {
        return Err(ev.resolution(id, "aggregate", "not an aggregate node"));
    };
    let arg = node.children[0];
    let key_node = has_key.then(|| node.children[1]);

    // One contribution per true emission of the argument expression
    let mut contributions: Vec<(Value, Option<Value>)> = Vec::new();
    for binding in contributors {
        for (value, extended) in ev.eval_values(arg, binding)? {
            let key_value = match key_node {
                Some(key) => {
                    let mut resolved = ev.eval_values(key, &extended)?;
                    if resolved.is_empty() {
                        return Err(ev.resolution(id, "aggregate key", "key produced no value"));
                    }
                    Some(resolved.swap_remove(0).0)
                }
                None => None,
            };
            contributions.push((value, key_value));
        }
    }

    if *distinct {
        let mut seen: Vec<Value> = Vec::new();
        contributions.retain(|(value, _)| {
            if seen.contains(value) {
                false
            } else {
                seen.push(value.clone());
                true
            }
        });
    }

    if contributions.is_empty() {
        return Ok(default.clone().unwrap_or(match kind {
            crate::ast::AggKind::Count => Value::Int(0),
            crate::ast::AggKind::Sum => Value::Int(0),
            _ => Value::Null,
        }));
    }

    use crate::ast::AggKind;
    match kind {
        AggKind::Count => Ok(Value::Int(contributions.len() as i64)),
        AggKind::Sum => numeric_sum(ev, id, &contributions),
        AggKind::Avg => {
            let total = numeric_sum(ev, id, &contributions)?;
            let total = total
                .as_f64()
                .ok_or_else(|| ev.resolution(id, "average", "non-numeric sum"))?;
            Ok(Value::Float(total / contributions.len() as f64))
        }
        AggKind::Min => Ok(extremum(&contributions, std::cmp::Ordering::Less)),
        AggKind::Max => Ok(extremum(&contributions, std::cmp::Ordering::Greater)),
    }
}

fn numeric_sum(
    ev: &Evaluator<'_>,
    id: NodeId,
    contributions: &[(Value, Option<Value>)],
) -> EvalResult<Value> {
    let all_int = contributions
        .iter()
        .all(|(value, _)| matches!(value, Value::Int(_)));
    if all_int {
        let mut total = 0_i64;
        for (value, _) in contributions {
            if let Value::Int(i) = value {
                total = total
                    .checked_add(*i)
                    .ok_or_else(|| ev.resolution(id, "sum", "integer overflow"))?;
            }
        }
        return Ok(Value::Int(total));
    }
    let mut total = 0.0_f64;
    for (value, _) in contributions {
        match value.as_f64() {
            Some(f) => total += f,
            None => {
                return Err(ev.resolution(
                    id,
                    "sum",
                    format!("non-numeric contribution of type {}", value.type_label()),
                ))
            }
        }
    }
    Ok(Value::Float(total))
}

/// Contribution achieving the extremum of its comparison key. With a
/// key transform the *argument value* is returned, not the key. Ties
/// and incomparable candidates keep the earliest contribution.
fn extremum(contributions: &[(Value, Option<Value>)], wanted: std::cmp::Ordering) -> Value {
    let mut best: Option<(&Value, &Value)> = None;
    for (value, key) in contributions {
        let candidate_key = key.as_ref().unwrap_or(value);
        match best {
            None => best = Some((candidate_key, value)),
            Some((best_key, _)) => {
                if candidate_key.compare(best_key) == Some(wanted) {
                    best = Some((candidate_key, value));
                }
            }
        }
    }
    best.map(|(_, value)| value.clone()).unwrap_or(Value::Null)
}
