//! Rule-tree evaluation.
//!
//! For every binding produced by the query root, the scope tree is
//! walked outer-to-inner, earlier-sibling-first:
//!
//! - a *refinement* fires when its condition holds in addition to the
//!   outer conditions; a fired child in the first sibling chain
//!   supersedes the parent's own conclusions;
//! - an *alternative* fires only when no earlier sibling of its chain
//!   fired for the current binding;
//! - *next_rule* starts a fresh sibling chain evaluated regardless of
//!   what fired before it.
//!
//! Conclusions append their evaluated value (inference constructors run
//! once per firing binding) to their target log, and the stream of
//! concluded values is the query's result.

use indexmap::IndexMap;

use tracing::trace;

use crate::ast::clauses::ScopeKind;
use crate::binding::Binding;
use crate::ir::{NodeId, NodeKind};
use crate::ir_builder::RuleScopeIr;
use crate::value::Value;

use super::{EvalError, EvalResult, Evaluator, RowStream};

/// Concluded values, in firing order, for every binding reaching the
/// query root
pub fn conclusion_stream<'q>(
    ev: Evaluator<'q>,
    root: NodeId,
    rules: &'q RuleScopeIr,
) -> RowStream<'q> {
    let base = ev.eval_node(root, Binding::new());
    Box::new(base.flat_map(move |item| -> RowStream<'q> {
        match item {
            Err(e) => Box::new(std::iter::once(Err(e))),
            Ok(r) if !r.truth => Box::new(std::iter::empty()),
            Ok(r) => {
                let mut fired = Vec::new();
                match fire_scope(&ev, rules, &r.binding, &mut fired) {
                    Ok(_) => Box::new(fired.into_iter().map(Ok)),
                    Err(e) => Box::new(std::iter::once(Err(e))),
                }
            }
        }
    }))
}

/// Evaluate one scope for one outer binding. Returns whether the scope
/// fired (its condition held for at least one extension of the binding).
fn fire_scope(
    ev: &Evaluator<'_>,
    scope: &RuleScopeIr,
    binding: &Binding,
    out: &mut Vec<Value>,
) -> EvalResult<bool> {
    let firing_bindings: Vec<Binding> = match scope.cond {
        None => vec![binding.clone()],
        Some(cond) => {
            let mut extensions = Vec::new();
            for item in ev.eval_node(cond, binding.clone()) {
                let r = item?;
                if r.truth {
                    extensions.push(r.binding);
                }
            }
            extensions
        }
    };
    if firing_bindings.is_empty() {
        return Ok(false);
    }

    for firing in &firing_bindings {
        // Sibling chains: refinements and alternatives until the next
        // next_rule; a fired child of the first chain supersedes this
        // scope's own conclusions. Child conclusions are buffered so
        // the emission order stays outer-to-inner.
        let mut child_out = Vec::new();
        let mut chain_fired = false;
        let mut first_chain = true;
        let mut suppress_own = false;
        for child in &scope.children {
            match child.kind {
                ScopeKind::NextRule => {
                    first_chain = false;
                    chain_fired = fire_scope(ev, child, firing, &mut child_out)?;
                }
                ScopeKind::Alternative if chain_fired => {}
                ScopeKind::Refinement | ScopeKind::Alternative => {
                    let fired = fire_scope(ev, child, firing, &mut child_out)?;
                    chain_fired |= fired;
                    if first_chain && fired {
                        suppress_own = true;
                    }
                }
                ScopeKind::Root => {}
            }
        }
        if !suppress_own {
            for conclusion in &scope.conclusions {
                if let Some(value) = materialise(ev, conclusion.value, firing)? {
                    trace!(value = ?value, "conclusion fired");
                    conclusion.target.push(value.clone());
                    out.push(value);
                }
            }
        }
        out.extend(child_out);
    }
    Ok(true)
}

/// Evaluate a conclusion value under the firing binding. Inference
/// constructors resolve their kwargs and build the instance here, once
/// per firing binding.
fn materialise(
    ev: &Evaluator<'_>,
    value_node: NodeId,
    binding: &Binding,
) -> EvalResult<Option<Value>> {
    let node = ev.dag().node(value_node);
    if let NodeKind::Inference { name, keys, ctor, .. } = &node.kind {
        // bind kwarg navigations, then resolve each child by name
        let mut extended = None;
        for item in ev.product(&node.children, binding.clone()) {
            let r = item?;
            if r.truth {
                extended = Some(r.binding);
                break;
            }
        }
        let Some(extended) = extended else {
            return Ok(None);
        };
        let mut resolved = IndexMap::with_capacity(keys.len());
        for (key, child) in keys.iter().zip(node.children.iter()) {
            resolved.insert(key.clone(), ev.resolve_value(*child, &extended)?);
        }
        let value = ctor(&resolved).map_err(|reason| EvalError::UserCallable {
            name: name.clone(),
            path: ev.dag().path_of(value_node),
            reason,
        })?;
        return Ok(Some(value));
    }
    let mut values = ev.eval_values(value_node, binding)?;
    if values.is_empty() {
        return Ok(None);
    }
    Ok(Some(values.swap_remove(0).0))
}
