//! # Product Planning
//!
//! Orders the children of a product node before evaluation so that the
//! most constraining children run first:
//!
//! 1. Children introducing no variables (pure truth tests) come first
//! 2. Then children introducing fewer distinct variables
//! 3. Ties keep attachment order (the sort is stable)
//!
//! The ordering is deterministic and part of the evaluation contract,
//! not an optimisation flag: output order is defined over the
//! post-reorder child sequence.

use std::collections::BTreeSet;

use tracing::debug;

use crate::binding::VarId;
use crate::ir::{ExprDag, NodeId, NodeKind};

/// Distinct leaf variables reachable from `id`
pub fn variable_footprint(dag: &ExprDag, id: NodeId) -> BTreeSet<VarId> {
    let mut vars = BTreeSet::new();
    let mut stack = vec![id];
    let mut seen = vec![false; dag.len()];
    while let Some(node_id) = stack.pop() {
        if seen[node_id.index()] {
            continue;
        }
        seen[node_id.index()] = true;
        let node = dag.node(node_id);
        if let NodeKind::Var(decl) = &node.kind {
            vars.insert(decl.id);
        }
        stack.extend(node.children.iter().copied());
    }
    vars
}

/// Stable reorder of product children by constraining power
pub fn order_children(dag: &ExprDag, children: &[NodeId]) -> Vec<NodeId> {
    let mut keyed: Vec<(usize, usize, NodeId)> = children
        .iter()
        .enumerate()
        .map(|(position, &id)| (variable_footprint(dag, id).len(), position, id))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    let ordered: Vec<NodeId> = keyed.into_iter().map(|(_, _, id)| id).collect();
    if ordered.as_slice() != children {
        debug!(
            before = ?children,
            after = ?ordered,
            "reordered product children"
        );
    }
    ordered
}
