//! Cartesian-product combinator.
//!
//! The shared driver behind conjunction, comparator argument binding,
//! grouping keys and the query root: nested iteration over an ordered
//! child sequence, where each child is evaluated under the binding
//! accumulated so far. A false child emission short-circuits its branch
//! (later children are never evaluated under that partial binding), and
//! merges that disagree on a shared variable identity are dropped.
//!
//! Output order is depth-first over the child emission indices, which
//! makes the overall stream deterministic for a fixed domain order.

use crate::binding::{Binding, OperationResult};
use crate::ir::NodeId;

use super::{empty, once_err, once_ok, Evaluator, ResultStream};

impl<'q> Evaluator<'q> {
    /// All compatible binding merges across `children`, in
    /// depth-first emission order
    pub fn product(&self, children: &'q [NodeId], input: Binding) -> ResultStream<'q> {
        let Some((&first, rest)) = children.split_first() else {
            return once_ok(OperationResult::holds(input));
        };
        let ev = self.clone();
        Box::new(
            self.eval_node(first, input.clone())
                .flat_map(move |item| -> ResultStream<'q> {
                    match item {
                        Err(e) => once_err(e),
                        // short-circuit: a failing branch contributes nothing
                        Ok(r) if !r.truth => empty(),
                        Ok(r) => match input.merge(&r.binding) {
                            Some(merged) => ev.product(rest, merged),
                            None => empty(),
                        },
                    }
                }),
        )
    }
}
