//! Result shaping: ordering, distinct and limit.
//!
//! `ordered_by` materialises the binding stream and sorts it stably;
//! multiple clauses form a lexicographic ordering in attachment order.
//! `distinct` deduplicates by the projected result value. `limit` is
//! O(1) extra memory and stops pulling upstream after the nth result.

use std::collections::HashSet;

use crate::binding::Binding;
use crate::ir::NodeId;
use crate::value::Value;

use super::{EvalResult, Evaluator, RowStream};

/// Stable lexicographic sort by the resolved order keys
pub fn sort_bindings(
    ev: &Evaluator<'_>,
    order: &[(NodeId, bool)],
    bindings: Vec<Binding>,
) -> EvalResult<Vec<Binding>> {
    let mut keyed = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let mut keys = Vec::with_capacity(order.len());
        for (node, _) in order {
            keys.push(ev.resolve_value(*node, &binding)?);
        }
        keyed.push((keys, binding));
    }
    keyed.sort_by(|(a, _), (b, _)| {
        for (index, (_, descending)) in order.iter().enumerate() {
            // incomparable keys keep prior order
            let mut ord = a[index].compare(&b[index]).unwrap_or(std::cmp::Ordering::Equal);
            if *descending {
                ord = ord.reverse();
            }
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
    Ok(keyed.into_iter().map(|(_, binding)| binding).collect())
}

/// Deduplicate rows by the projected value, keeping first occurrences
pub fn distinct_rows(rows: RowStream<'_>) -> RowStream<'_> {
    let mut seen: HashSet<Value> = HashSet::new();
    Box::new(rows.filter(move |item| match item {
        Ok(value) => seen.insert(value.clone()),
        Err(_) => true,
    }))
}

/// At most `n` rows; upstream is not pulled past the nth
pub fn limit_rows(rows: RowStream<'_>, n: usize) -> RowStream<'_> {
    Box::new(rows.take(n))
}
