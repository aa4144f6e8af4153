//! # Query Façade
//!
//! The user-facing query object. A [`Query`] collects clauses in
//! mutable slots while *building*; `build()` lowers the slots into a
//! frozen DAG ([`BuiltQuery`]) and caches it. Any clause added after
//! the build fails with [`BuildError::Frozen`].
//!
//! Quantifiers wrap a query with a cardinality contract:
//!
//! ```rust
//! use std::sync::Arc;
//! use entiql::prelude::*;
//!
//! # use std::any::Any;
//! # #[derive(Debug)]
//! # struct Robot { name: &'static str, battery: i64 }
//! # impl Entity for Robot {
//! #     fn as_any(&self) -> &dyn Any { self }
//! #     fn attr(&self, name: &str) -> Option<Value> {
//! #         match name {
//! #             "name" => Some(Value::from(self.name)),
//! #             "battery" => Some(Value::Int(self.battery)),
//! #             _ => None,
//! #         }
//! #     }
//! # }
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let robots = vec![
//!     Arc::new(Robot { name: "R2D2", battery: 100 }),
//!     Arc::new(Robot { name: "C3PO", battery: 20 }),
//! ];
//! let r = variable_over("r", robots);
//! let strong = an(entity(r.clone()).where_(r.attr("battery").gt(lit(50)))?).tolist()?;
//! assert_eq!(strong.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod rules;

pub use rules::RuleBuilder;

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::ast::clauses::QuerySpec;
use crate::ast::Expr;
use crate::binding::Binding;
use crate::eval::{aggregate, quantifier, rules as rule_eval, shaping};
use crate::eval::{EvalResult, Evaluator, Quantifier, RowStream};
use crate::execution::ExecutionConfig;
use crate::ir::{BuildError, BuildResult, NodeId};
use crate::ir_builder::{IrBuilder, LoweredQuery};
use crate::symbol::SymbolRegistry;
use crate::value::Value;

/// Query over a single selected expression
pub fn entity(select: impl Into<Expr>) -> Query {
    Query::new(vec![select.into()])
}

/// Query over a tuple of selected expressions, deduplicated
pub fn set_of(selects: impl IntoIterator<Item = Expr>) -> Query {
    let query = Query::new(selects.into_iter().collect());
    query.state.borrow_mut().spec.distinct = true;
    query
}

/// All results, lazily
pub fn an(query: Query) -> Quantified {
    Quantified {
        query,
        quantifier: Quantifier::An,
    }
}

/// Exactly one result; raises on zero or two
pub fn the(query: Query) -> Quantified {
    Quantified {
        query,
        quantifier: Quantifier::The,
    }
}

/// Exactly `k` results
pub fn exactly(k: usize, query: Query) -> Quantified {
    Quantified {
        query,
        quantifier: Quantifier::Exactly(k),
    }
}

/// At least `k` results
pub fn at_least(k: usize, query: Query) -> Quantified {
    Quantified {
        query,
        quantifier: Quantifier::AtLeast(k),
    }
}

/// At most `k` results
pub fn at_most(k: usize, query: Query) -> Quantified {
    Quantified {
        query,
        quantifier: Quantifier::AtMost(k),
    }
}

struct QueryState {
    spec: QuerySpec,
    registry: Option<SymbolRegistry>,
    exec: ExecutionConfig,
    built: Option<Rc<BuiltQuery>>,
}

/// A query handle. Clones share the same clause slots, so a handle
/// captured before `build()` still observes the frozen state after.
#[derive(Clone)]
pub struct Query {
    state: Rc<RefCell<QueryState>>,
}

impl Query {
    fn new(selects: Vec<Expr>) -> Self {
        Query {
            state: Rc::new(RefCell::new(QueryState {
                spec: QuerySpec {
                    selects,
                    ..QuerySpec::default()
                },
                registry: None,
                exec: ExecutionConfig::default(),
                built: None,
            })),
        }
    }

    fn mutate(&self, apply: impl FnOnce(&mut QueryState)) -> BuildResult<Query> {
        let mut state = self.state.borrow_mut();
        if state.built.is_some() {
            return Err(BuildError::Frozen);
        }
        apply(&mut state);
        Ok(self.clone())
    }

    /// Attach the symbol registry implicit-domain variables read from
    pub fn using(&self, registry: &SymbolRegistry) -> BuildResult<Query> {
        let registry = registry.clone();
        self.mutate(move |state| state.registry = Some(registry))
    }

    /// Execution limits and timeout for evaluations of this query
    pub fn with_execution(&self, config: ExecutionConfig) -> BuildResult<Query> {
        self.mutate(move |state| state.exec = config)
    }

    /// Add one condition to the where-conjunction
    pub fn where_(&self, cond: impl Into<Expr>) -> BuildResult<Query> {
        let cond = cond.into();
        self.mutate(move |state| state.spec.wheres.push(cond))
    }

    /// Add several conditions at once
    pub fn where_all(&self, conds: impl IntoIterator<Item = Expr>) -> BuildResult<Query> {
        let conds: Vec<Expr> = conds.into_iter().collect();
        self.mutate(move |state| state.spec.wheres.extend(conds))
    }

    /// Add a grouping key
    pub fn grouped_by(&self, key: impl Into<Expr>) -> BuildResult<Query> {
        let key = key.into();
        self.mutate(move |state| state.spec.group_keys.push(key))
    }

    /// Filter whole groups after aggregation
    pub fn having(&self, cond: impl Into<Expr>) -> BuildResult<Query> {
        let cond = cond.into();
        self.mutate(move |state| state.spec.havings.push(cond))
    }

    /// Add a sort key; repeated calls form a lexicographic ordering
    pub fn ordered_by(&self, key: impl Into<Expr>, descending: bool) -> BuildResult<Query> {
        let key = key.into();
        self.mutate(move |state| state.spec.order.push((key, descending)))
    }

    /// Emit at most `n` results
    pub fn limit(&self, n: usize) -> BuildResult<Query> {
        self.mutate(move |state| state.spec.limit = Some(n))
    }

    /// Deduplicate by the tuple of selected values
    pub fn distinct(&self) -> BuildResult<Query> {
        self.mutate(|state| state.spec.distinct = true)
    }

    /// Attach a rule tree; the query's results become the concluded
    /// values, in firing order
    pub fn rule_tree(&self, build: impl FnOnce(&mut RuleBuilder)) -> BuildResult<Query> {
        {
            let state = self.state.borrow();
            if state.spec.rules.is_some() {
                return Err(BuildError::ConflictingClauses {
                    feature: "a second rule tree",
                });
            }
        }
        let mut builder = RuleBuilder::root();
        build(&mut builder);
        let scope = builder.into_scope();
        self.mutate(move |state| state.spec.rules = Some(scope))
    }

    /// Lower the clause slots into a frozen DAG. Idempotent: the first
    /// build is cached, later calls return the same [`BuiltQuery`].
    pub fn build(&self) -> BuildResult<Rc<BuiltQuery>> {
        {
            let state = self.state.borrow();
            if let Some(built) = &state.built {
                return Ok(Rc::clone(built));
            }
        }
        let mut state = self.state.borrow_mut();
        let lowered =
            IrBuilder::new().lower_query(&state.spec, state.registry.is_some())?;
        debug!(nodes = lowered.dag.len(), "query built");
        let built = Rc::new(BuiltQuery {
            lowered,
            registry: state.registry.clone(),
            exec: state.exec.clone(),
        });
        state.built = Some(Rc::clone(&built));
        Ok(built)
    }

    /// All results as a list (an-quantified)
    pub fn tolist(&self) -> EvalResult<Vec<Value>> {
        an(self.clone()).tolist()
    }

    /// First result; empty streams are an observable failure
    pub fn first(&self) -> EvalResult<Value> {
        an(self.clone()).first()
    }

    /// Textual dump of the built DAG
    pub fn explain(&self) -> BuildResult<String> {
        Ok(self.build()?.explain())
    }
}

/// A query wrapped with a cardinality contract
pub struct Quantified {
    query: Query,
    quantifier: Quantifier,
}

impl Quantified {
    /// The underlying query
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Build (or reuse) the underlying frozen query
    pub fn build(&self) -> BuildResult<Rc<BuiltQuery>> {
        self.query.build()
    }

    /// Materialise every result under the contract
    pub fn tolist(&self) -> EvalResult<Vec<Value>> {
        let built = self.query.build()?;
        built.evaluate_quantified(self.quantifier).collect()
    }

    /// Pull the first result under the contract
    pub fn first(&self) -> EvalResult<Value> {
        let built = self.query.build()?;
        let result = match built.evaluate_quantified(self.quantifier).next() {
            Some(item) => item,
            None => Err(crate::eval::EvalError::NoSolutionFound),
        };
        result
    }

    /// First result, or `default` when the stream is empty
    pub fn first_or(&self, default: impl Into<Value>) -> EvalResult<Value> {
        let built = self.query.build()?;
        let result = match built.evaluate_quantified(self.quantifier).next() {
            Some(item) => item,
            None => Ok(default.into()),
        };
        result
    }

    /// Does at least one result exist?
    pub fn exists(&self) -> EvalResult<bool> {
        let built = self.query.build()?;
        let result = match built.evaluate_quantified(self.quantifier).next() {
            Some(Ok(_)) => Ok(true),
            Some(Err(e)) => Err(e),
            None => Ok(false),
        };
        result
    }
}

/// A built (frozen) query ready for evaluation
pub struct BuiltQuery {
    lowered: LoweredQuery,
    registry: Option<SymbolRegistry>,
    exec: ExecutionConfig,
}

impl BuiltQuery {
    /// Lazy result stream (an-quantified)
    pub fn evaluate(&self) -> RowStream<'_> {
        self.evaluate_quantified(Quantifier::An)
    }

    /// Lazy result stream under a cardinality contract
    pub fn evaluate_quantified(&self, q: Quantifier) -> RowStream<'_> {
        quantifier::apply(q, self.rows())
    }

    /// Textual tree of the built DAG and shaping clauses
    pub fn explain(&self) -> String {
        let plan = &self.lowered;
        let mut out = format!("dag: {} nodes (frozen)\n", plan.dag.len());
        out.push_str(&plan.dag.dump(plan.root));
        for (node, descending) in &plan.order {
            out.push_str(&format!(
                "ordered_by {} {}\n",
                node,
                if *descending { "desc" } else { "asc" }
            ));
        }
        if let Some(n) = plan.limit {
            out.push_str(&format!("limit {n}\n"));
        }
        if plan.distinct {
            out.push_str("distinct\n");
        }
        if plan.rules.is_some() {
            out.push_str("rule tree attached\n");
        }
        out
    }

    fn rows(&self) -> RowStream<'_> {
        let ev = Evaluator::new(&self.lowered.dag, self.registry.clone(), &self.exec);
        let plan = &self.lowered;

        if let Some(limit) = self.exec.limits.max_depth {
            let depth = dag_depth(&plan.dag, plan.root);
            if depth > limit {
                let err = crate::execution::ResourceError::DepthLimitExceeded {
                    limit,
                    actual: depth,
                };
                return Box::new(std::iter::once(Err(err.into())));
            }
        }

        let stream: RowStream<'_> = if let Some(rule_tree) = &plan.rules {
            rule_eval::conclusion_stream(ev.clone(), plan.root, rule_tree)
        } else {
            let needs_buffering =
                !plan.group_keys.is_empty() || !plan.aggregates.is_empty() || !plan.order.is_empty();
            if needs_buffering {
                match self.buffered_bindings(&ev) {
                    Ok(bindings) => {
                        let selects: &[NodeId] = &plan.selects;
                        let ev_project = ev.clone();
                        Box::new(
                            bindings
                                .into_iter()
                                .map(move |binding| project(&ev_project, selects, &binding)),
                        )
                    }
                    Err(e) => Box::new(std::iter::once(Err(e))),
                }
            } else {
                let selects: &[NodeId] = &plan.selects;
                let ev_project = ev.clone();
                Box::new(ev.eval_node(plan.root, Binding::new()).filter_map(
                    move |item| match item {
                        Err(e) => Some(Err(e)),
                        Ok(r) if !r.truth => None,
                        Ok(r) => Some(project(&ev_project, selects, &r.binding)),
                    },
                ))
            }
        };

        let stream = if plan.distinct {
            shaping::distinct_rows(stream)
        } else {
            stream
        };
        let stream = match plan.limit {
            Some(n) => shaping::limit_rows(stream, n),
            None => stream,
        };

        // final result accounting
        let ev_count = ev;
        Box::new(stream.map(move |item| {
            let value = item?;
            ev_count.count_result()?;
            Ok(value)
        }))
    }

    /// Materialising path: grouping, aggregation, having and ordering
    fn buffered_bindings(&self, ev: &Evaluator<'_>) -> EvalResult<Vec<Binding>> {
        let plan = &self.lowered;
        let mut bindings = Vec::new();
        for item in ev.eval_node(plan.root, Binding::new()) {
            let r = item?;
            if r.truth {
                bindings.push(r.binding);
            }
        }
        if !plan.group_keys.is_empty() || !plan.aggregates.is_empty() {
            bindings = aggregate::apply(
                ev,
                &plan.group_keys,
                &plan.aggregates,
                &plan.havings,
                bindings,
            )?;
        }
        if !plan.order.is_empty() {
            bindings = shaping::sort_bindings(ev, &plan.order, bindings)?;
        }
        Ok(bindings)
    }
}

/// Project the selected values out of a binding: a single select is the
/// value itself, several selects form a list
fn project(ev: &Evaluator<'_>, selects: &[NodeId], binding: &Binding) -> EvalResult<Value> {
    if selects.len() == 1 {
        return ev.resolve_value(selects[0], binding);
    }
    let mut row = Vec::with_capacity(selects.len());
    for select in selects {
        row.push(ev.resolve_value(*select, binding)?);
    }
    Ok(Value::list(row))
}

/// Static nesting depth of the DAG under `root`
fn dag_depth(dag: &crate::ir::ExprDag, root: NodeId) -> usize {
    fn depth_of(dag: &crate::ir::ExprDag, id: NodeId) -> usize {
        1 + dag
            .node(id)
            .children
            .iter()
            .map(|child| depth_of(dag, *child))
            .max()
            .unwrap_or(0)
    }
    depth_of(dag, root)
}
