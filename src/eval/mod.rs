//! # Streaming Evaluation Engine
//!
//! Pull-based, single-threaded evaluation over the frozen expression
//! DAG. Every node evaluates to a lazy sequence of
//! [`OperationResult`]s - `(binding, truth)` pairs - and composition
//! happens through the generalised cartesian-product combinator in
//! [`product`], which short-circuits on false emissions and drops
//! incompatible binding merges.
//!
//! The [`Evaluator`] is a cheap-clone handle (a borrow of the DAG plus
//! a shared evaluation context), so node streams can recursively spawn
//! child streams without self-referential lifetimes. Suspension points
//! check the evaluation deadline and resource limits cooperatively.

pub mod aggregate;
mod error;
mod product;
pub mod quantifier;
pub mod rules;
pub mod shaping;

pub use error::{EvalError, EvalResult};
pub use quantifier::Quantifier;

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::ast::{ArithOp, CmpOp, DomainSpec, VarDecl};
use crate::binding::{Binding, OperationResult, VarId};
use crate::execution::{EvalDeadline, ExecutionConfig, ResourceTracker};
use crate::ir::{ExprDag, MapOp, NodeId, NodeKind};
use crate::symbol::SymbolRegistry;
use crate::value::Value;

/// Lazy sequence of operation results
pub type ResultStream<'a> = Box<dyn Iterator<Item = EvalResult<OperationResult>> + 'a>;

/// Lazy sequence of final result rows
pub type RowStream<'a> = Box<dyn Iterator<Item = EvalResult<Value>> + 'a>;

/// Single-result stream
pub(crate) fn once_ok<'a>(result: OperationResult) -> ResultStream<'a> {
    Box::new(std::iter::once(Ok(result)))
}

/// Single-error stream
pub(crate) fn once_err<'a>(error: EvalError) -> ResultStream<'a> {
    Box::new(std::iter::once(Err(error)))
}

/// Empty stream
pub(crate) fn empty<'a>() -> ResultStream<'a> {
    Box::new(std::iter::empty())
}

/// Shared per-evaluation state: registry handle, domain snapshots,
/// limits and deadline
pub struct EvalContext {
    registry: Option<SymbolRegistry>,
    snapshots: RefCell<HashMap<NodeId, Rc<Vec<Value>>>>,
    pub(crate) tracker: ResourceTracker,
    deadline: EvalDeadline,
}

/// Evaluation driver over one frozen DAG
pub struct Evaluator<'q> {
    dag: &'q ExprDag,
    ctx: Rc<EvalContext>,
}

impl<'q> Clone for Evaluator<'q> {
    fn clone(&self) -> Self {
        Evaluator {
            dag: self.dag,
            ctx: Rc::clone(&self.ctx),
        }
    }
}

impl<'q> Evaluator<'q> {
    /// Evaluator for one evaluation pass
    pub fn new(dag: &'q ExprDag, registry: Option<SymbolRegistry>, config: &ExecutionConfig) -> Self {
        Evaluator {
            dag,
            ctx: Rc::new(EvalContext {
                registry,
                snapshots: RefCell::new(HashMap::new()),
                tracker: ResourceTracker::new(config.limits.clone()),
                deadline: EvalDeadline::new(config.timeout),
            }),
        }
    }

    /// The DAG under evaluation
    pub fn dag(&self) -> &'q ExprDag {
        self.dag
    }

    /// External cancellation handle for this evaluation
    pub fn cancel_handle(&self) -> crate::execution::CancelHandle {
        self.ctx.deadline.cancel_handle()
    }

    /// Count one final result against the resource limits
    pub fn count_result(&self) -> EvalResult<()> {
        self.ctx.tracker.check_result().map_err(Into::into)
    }

    /// Evaluate one node under an input binding: the public driver that
    /// applies bookkeeping (deadline, limits, tracing) around the
    /// per-kind step algorithm.
    pub fn eval_node(&self, id: NodeId, input: Binding) -> ResultStream<'q> {
        if let Err(e) = self.ctx.deadline.check() {
            return once_err(e.into());
        }
        if let Err(e) = self.ctx.tracker.check_intermediate() {
            return once_err(e.into());
        }
        let node = self.dag.node(id);
        trace!(node = %id, kind = %node.kind.label(), "step");
        match &node.kind {
            NodeKind::Var(decl) => self.step_var(id, decl, input),
            NodeKind::Mapped { .. } => self.step_mapped(id, input),
            NodeKind::Cmp(op) => self.step_cmp(id, *op, input),
            NodeKind::Or => self.step_or(id, input),
            NodeKind::Not => self.step_not(id, input),
            NodeKind::In => self.step_in(id, input),
            NodeKind::HasType(tag) => {
                let tag = *tag;
                let ev = self.clone();
                let target = node.children[0];
                Box::new(self.product(&node.children, input).map(move |item| {
                    let r = item?;
                    let value = ev.resolve_value(target, &r.binding)?;
                    Ok(OperationResult {
                        binding: r.binding,
                        truth: tag.is_instance(&value),
                    })
                }))
            }
            NodeKind::Predicate { .. } => self.step_predicate(id, input),
            NodeKind::Aggregate { val_id, .. } => {
                if input.contains(*val_id) {
                    once_ok(OperationResult::holds(input))
                } else {
                    once_err(self.resolution(id, "aggregate", "aggregate value is not bound here"))
                }
            }
            // Value producers and conjunctions share the product driver:
            // Literal has no children and passes the input through.
            NodeKind::Literal(_)
            | NodeKind::Arith(_)
            | NodeKind::Function { .. }
            | NodeKind::Inference { .. }
            | NodeKind::And
            | NodeKind::Product => self.product(&node.children, input),
        }
    }

    /// Evaluate a value node to completion under `binding`: one
    /// `(value, extended binding)` pair per true emission
    pub fn eval_values(&self, id: NodeId, binding: &Binding) -> EvalResult<Vec<(Value, Binding)>> {
        let mut out = Vec::new();
        for item in self.eval_node(id, binding.clone()) {
            let r = item?;
            if !r.truth {
                continue;
            }
            out.push((self.resolve_value(id, &r.binding)?, r.binding));
        }
        Ok(out)
    }

    /// Any true emission for this input?
    pub fn eval_truth(&self, id: NodeId, input: Binding) -> EvalResult<bool> {
        for item in self.eval_node(id, input) {
            if item?.truth {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ------------------------------------------------------------------
    // Per-kind step algorithms
    // ------------------------------------------------------------------

    fn step_var(&self, id: NodeId, decl: &'q VarDecl, input: Binding) -> ResultStream<'q> {
        // An already-bound variable unifies with its binding
        if input.contains(decl.id) {
            return once_ok(OperationResult::holds(input));
        }
        let candidates: Rc<Vec<Value>> = match &decl.domain {
            DomainSpec::Explicit(values) => self.snapshot(id, || values.as_ref().clone()),
            DomainSpec::Registry => {
                let Some(registry) = &self.ctx.registry else {
                    return once_err(self.resolution(
                        id,
                        "domain",
                        format!("variable '{}' has no symbol registry", decl.name),
                    ));
                };
                let Some(tag) = decl.tag else {
                    return once_err(self.resolution(
                        id,
                        "domain",
                        format!("variable '{}' has no type for registry lookup", decl.name),
                    ));
                };
                self.snapshot(id, || registry.instances_of_tag(&tag))
            }
            // Deduced domains accumulate: read the pool at every pull
            DomainSpec::Deduced(log) => Rc::new(log.snapshot()),
        };
        let tag = decl.tag;
        let var_id = decl.id;
        let mut index = 0;
        Box::new(std::iter::from_fn(move || {
            while index < candidates.len() {
                let value = candidates[index].clone();
                index += 1;
                // Implicit type check: off-type domain elements are
                // suppressed, not errors
                if let Some(tag) = tag {
                    if !tag.is_instance(&value) {
                        continue;
                    }
                }
                if let Some(bound) = input.bind(var_id, value) {
                    return Some(Ok(OperationResult::holds(bound)));
                }
            }
            None
        }))
    }

    fn step_mapped(&self, id: NodeId, input: Binding) -> ResultStream<'q> {
        let node = self.dag.node(id);
        let NodeKind::Mapped { op, val_id } = &node.kind else {
            return empty();
        };
        let val_id = *val_id;
        if input.contains(val_id) {
            return once_ok(OperationResult::holds(input));
        }
        let children: &'q [NodeId] = &node.children;
        let ev = self.clone();
        Box::new(
            self.product(children, input)
                .flat_map(move |item| match item {
                    Err(e) => once_err(e),
                    Ok(r) => ev.apply_map(id, op, val_id, children, r.binding),
                }),
        )
    }

    fn apply_map(
        &self,
        id: NodeId,
        op: &MapOp,
        val_id: VarId,
        children: &[NodeId],
        binding: Binding,
    ) -> ResultStream<'q> {
        let base = match self.resolve_value(children[0], &binding) {
            Ok(value) => value,
            Err(e) => return once_err(e),
        };
        match op {
            MapOp::Attr(name) => {
                let out = match &base {
                    Value::Object(obj) => obj.attr(name),
                    _ => None,
                };
                match out {
                    Some(value) => self.emit_bound(binding, val_id, value),
                    None => once_err(self.resolution(
                        id,
                        format!("attr({name})"),
                        format!("no attribute '{}' on {}", name, base.type_label()),
                    )),
                }
            }
            MapOp::Index(key) => {
                let out = match &base {
                    Value::List(items) => index_list(items, key),
                    Value::Object(obj) => obj.index(key),
                    _ => None,
                };
                match out {
                    Some(value) => self.emit_bound(binding, val_id, value),
                    None => once_err(self.resolution(
                        id,
                        format!("index({key:?})"),
                        format!("no element {:?} in {}", key, base.type_label()),
                    )),
                }
            }
            MapOp::Call(method) => {
                let mut args = Vec::with_capacity(children.len() - 1);
                for child in &children[1..] {
                    match self.resolve_value(*child, &binding) {
                        Ok(value) => args.push(value),
                        Err(e) => return once_err(e),
                    }
                }
                let out = match &base {
                    Value::Object(obj) => obj.invoke(method, &args),
                    _ => None,
                };
                match out {
                    Some(value) => self.emit_bound(binding, val_id, value),
                    None => once_err(self.resolution(
                        id,
                        format!("call({method})"),
                        format!("no method '{}' on {}", method, base.type_label()),
                    )),
                }
            }
            MapOp::Flat => match &base {
                Value::List(items) => {
                    let items = std::sync::Arc::clone(items);
                    let mut index = 0;
                    Box::new(std::iter::from_fn(move || {
                        while index < items.len() {
                            let element = items[index].clone();
                            index += 1;
                            if let Some(bound) = binding.bind(val_id, element) {
                                return Some(Ok(OperationResult::holds(bound)));
                            }
                        }
                        None
                    }))
                }
                other => once_err(self.resolution(
                    id,
                    "flatten",
                    format!("cannot flatten {}", other.type_label()),
                )),
            },
        }
    }

    fn emit_bound(&self, binding: Binding, val_id: VarId, value: Value) -> ResultStream<'q> {
        match binding.bind(val_id, value) {
            Some(bound) => once_ok(OperationResult::holds(bound)),
            None => empty(),
        }
    }

    fn step_cmp(&self, id: NodeId, op: CmpOp, input: Binding) -> ResultStream<'q> {
        let node = self.dag.node(id);
        let lhs = node.children[0];
        let rhs = node.children[1];
        let ev = self.clone();
        Box::new(self.product(&node.children, input).map(move |item| {
            let r = item?;
            let a = ev.resolve_value(lhs, &r.binding)?;
            let b = ev.resolve_value(rhs, &r.binding)?;
            let truth = match op {
                CmpOp::Eq => a == b,
                CmpOp::Ne => a != b,
                CmpOp::Lt => matches!(a.compare(&b), Some(Ordering::Less)),
                CmpOp::Le => matches!(a.compare(&b), Some(Ordering::Less | Ordering::Equal)),
                CmpOp::Gt => matches!(a.compare(&b), Some(Ordering::Greater)),
                CmpOp::Ge => matches!(a.compare(&b), Some(Ordering::Greater | Ordering::Equal)),
            };
            Ok(OperationResult {
                binding: r.binding,
                truth,
            })
        }))
    }

    /// OR: pass left's true emissions through; only when the left side
    /// produced none, evaluate the right side.
    fn step_or(&self, id: NodeId, input: Binding) -> ResultStream<'q> {
        let node = self.dag.node(id);
        let lhs = node.children[0];
        let rhs = node.children[1];
        let ev = self.clone();
        let mut left = self.eval_node(lhs, input.clone());
        let mut left_done = false;
        let mut right: Option<ResultStream<'q>> = None;
        let mut any_true = false;
        Box::new(std::iter::from_fn(move || loop {
            if !left_done {
                match left.next() {
                    Some(Err(e)) => return Some(Err(e)),
                    Some(Ok(r)) if r.truth => {
                        any_true = true;
                        return Some(Ok(r));
                    }
                    // false left emissions are superseded by the right arm
                    Some(Ok(_)) => continue,
                    None => {
                        left_done = true;
                        if !any_true {
                            right = Some(ev.eval_node(rhs, input.clone()));
                        }
                    }
                }
            }
            return match &mut right {
                Some(stream) => stream.next(),
                None => None,
            };
        }))
    }

    /// NOT: true iff the child produced no true emission; absorbs
    /// resolution and callable failures as false child emissions.
    /// Emits the outer binding - negation introduces no variables.
    fn step_not(&self, id: NodeId, input: Binding) -> ResultStream<'q> {
        let child = self.dag.node(id).children[0];
        let ev = self.clone();
        let mut done = false;
        Box::new(std::iter::from_fn(move || {
            if done {
                return None;
            }
            done = true;
            let mut truth_seen = false;
            for item in ev.eval_node(child, input.clone()) {
                match item {
                    Ok(r) if r.truth => {
                        truth_seen = true;
                        break;
                    }
                    Ok(_) => {}
                    Err(e) if e.is_absorbable() => {}
                    Err(e) => return Some(Err(e)),
                }
            }
            Some(Ok(if truth_seen {
                OperationResult::fails(input.clone())
            } else {
                OperationResult::holds(input.clone())
            }))
        }))
    }

    fn step_in(&self, id: NodeId, input: Binding) -> ResultStream<'q> {
        let node = self.dag.node(id);
        let item_id = node.children[0];
        let collection_id = node.children[1];
        let ev = self.clone();
        Box::new(self.product(&node.children, input).map(move |item| {
            let r = item?;
            let needle = ev.resolve_value(item_id, &r.binding)?;
            let collection = ev.resolve_value(collection_id, &r.binding)?;
            let truth = match &collection {
                Value::List(items) => items.iter().any(|element| *element == needle),
                other => {
                    return Err(ev.resolution(
                        id,
                        "membership",
                        format!("cannot test membership in {}", other.type_label()),
                    ))
                }
            };
            Ok(OperationResult {
                binding: r.binding,
                truth,
            })
        }))
    }

    fn step_predicate(&self, id: NodeId, input: Binding) -> ResultStream<'q> {
        let node = self.dag.node(id);
        let NodeKind::Predicate {
            name,
            func,
            absorbing,
        } = &node.kind
        else {
            return empty();
        };
        let absorbing = *absorbing;
        let children: &'q [NodeId] = &node.children;
        let ev = self.clone();
        Box::new(
            self.product(children, input.clone())
                .map(move |item| match item {
                    Err(e) if absorbing && e.is_absorbable() => {
                        Ok(OperationResult::fails(input.clone()))
                    }
                    Err(e) => Err(e),
                    Ok(r) => {
                        let mut args = Vec::with_capacity(children.len());
                        for child in children {
                            match ev.resolve_value(*child, &r.binding) {
                                Ok(value) => args.push(value),
                                Err(e) if absorbing && e.is_absorbable() => {
                                    return Ok(OperationResult::fails(r.binding));
                                }
                                Err(e) => return Err(e),
                            }
                        }
                        match func(&args) {
                            Ok(truth) => Ok(OperationResult {
                                binding: r.binding,
                                truth,
                            }),
                            Err(_) if absorbing => Ok(OperationResult::fails(r.binding)),
                            Err(reason) => Err(EvalError::UserCallable {
                                name: name.clone(),
                                path: ev.dag.path_of(id),
                                reason,
                            }),
                        }
                    }
                }),
        )
    }

    // ------------------------------------------------------------------
    // Value resolution
    // ------------------------------------------------------------------

    /// Value of a value-producing node under an (already extended)
    /// binding
    pub fn resolve_value(&self, id: NodeId, binding: &Binding) -> EvalResult<Value> {
        let node = self.dag.node(id);
        match &node.kind {
            NodeKind::Literal(value) => Ok(value.clone()),
            NodeKind::Var(decl) => binding
                .get(decl.id)
                .cloned()
                .ok_or_else(|| self.resolution(id, "variable", "unbound variable")),
            NodeKind::Mapped { val_id, .. } | NodeKind::Aggregate { val_id, .. } => binding
                .get(*val_id)
                .cloned()
                .ok_or_else(|| self.resolution(id, "value", "value is not bound")),
            NodeKind::Arith(op) => {
                let a = self.resolve_value(node.children[0], binding)?;
                let b = self.resolve_value(node.children[1], binding)?;
                apply_arith(*op, &a, &b).map_err(|reason| self.resolution(id, op.as_str(), reason))
            }
            NodeKind::Function { name, func } => {
                let mut args = Vec::with_capacity(node.children.len());
                for child in &node.children {
                    args.push(self.resolve_value(*child, binding)?);
                }
                func(&args).map_err(|reason| EvalError::UserCallable {
                    name: name.clone(),
                    path: self.dag.path_of(id),
                    reason,
                })
            }
            NodeKind::Inference { .. } => Err(self.resolution(
                id,
                "inference",
                "inference constructors are only valid as conclusion values",
            )),
            _ => Err(self.resolution(id, "value", "not a value-producing expression")),
        }
    }

    fn snapshot(&self, id: NodeId, make: impl FnOnce() -> Vec<Value>) -> Rc<Vec<Value>> {
        let mut cache = self.ctx.snapshots.borrow_mut();
        Rc::clone(cache.entry(id).or_insert_with(|| Rc::new(make())))
    }

    pub(crate) fn resolution(
        &self,
        id: NodeId,
        op: impl Into<String>,
        reason: impl Into<String>,
    ) -> EvalError {
        EvalError::Resolution {
            op: op.into(),
            path: self.dag.path_of(id),
            reason: reason.into(),
        }
    }
}

/// Integer-preserving arithmetic with float fallback
fn apply_arith(op: ArithOp, a: &Value, b: &Value) -> Result<Value, String> {
    if let (Value::Int(x), Value::Int(y)) = (a, b) {
        let out = match op {
            ArithOp::Add => x.checked_add(*y),
            ArithOp::Sub => x.checked_sub(*y),
            ArithOp::Mul => x.checked_mul(*y),
            ArithOp::Div => {
                if *y == 0 {
                    return Err("division by zero".to_string());
                }
                x.checked_div(*y)
            }
            ArithOp::Mod => {
                if *y == 0 {
                    return Err("modulo by zero".to_string());
                }
                x.checked_rem(*y)
            }
        };
        return out.map(Value::Int).ok_or_else(|| "integer overflow".to_string());
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok(Value::Float(match op {
            ArithOp::Add => x + y,
            ArithOp::Sub => x - y,
            ArithOp::Mul => x * y,
            ArithOp::Div => x / y,
            ArithOp::Mod => x % y,
        })),
        _ => Err(format!(
            "non-numeric operands: {} {} {}",
            a.type_label(),
            op.as_str(),
            b.type_label()
        )),
    }
}

/// List index lookup with negative-from-end semantics
fn index_list(items: &[Value], key: &Value) -> Option<Value> {
    match key {
        Value::Int(i) => {
            let index = if *i < 0 {
                items.len().checked_sub(i.unsigned_abs() as usize)?
            } else {
                *i as usize
            };
            items.get(index).cloned()
        }
        _ => None,
    }
}
