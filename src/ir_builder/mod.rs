//! # IR Builder - Clause Lowering
//!
//! Lowers the builder-layer clause slots into the frozen expression
//! DAG. Lowering is where variable identity is enforced:
//!
//! - the same leaf variable always lowers to the same arena node;
//! - the same symbolic path (base node, operation, key) always lowers
//!   to the same mapped-variable node, so cross-constraint unification
//!   works through shared `VarId`s.
//!
//! Lowering also validates placement (aggregates only in select,
//! having or ordered_by), checks that having/ordering expressions do
//! not introduce unbound variables, reorders product children through
//! the planner, and freezes the DAG before handing it to evaluation.
//! A lowering error returns no partial DAG.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::ast::clauses::{ConclusionSpec, QuerySpec, RuleScopeSpec, ScopeKind};
use crate::ast::{DomainSpec, Expr, ExprKind};
use crate::binding::VarId;
use crate::ir::{BuildError, BuildResult, ExprDag, MapOp, NodeId, NodeKind};
use crate::planner;
use crate::symbol::ConclusionLog;
use crate::value::Value;

/// Where an expression is being lowered from; controls aggregate
/// placement rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClauseCtx {
    Where,
    Select,
    GroupKey,
    Having,
    OrderKey,
    RuleCond,
    Conclusion,
}

impl ClauseCtx {
    fn allows_aggregates(self) -> bool {
        matches!(self, ClauseCtx::Select | ClauseCtx::Having | ClauseCtx::OrderKey)
    }
}

/// Cache key identifying a symbolic path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MapKey {
    Attr(NodeId, String),
    Index(NodeId, Value),
    Call(NodeId, String, Vec<NodeId>),
    Flat(NodeId),
}

/// A lowered rule scope
#[derive(Debug)]
pub struct RuleScopeIr {
    pub kind: ScopeKind,
    pub cond: Option<NodeId>,
    pub conclusions: Vec<ConclusionIr>,
    pub children: Vec<RuleScopeIr>,
}

/// A lowered conclusion
#[derive(Debug)]
pub struct ConclusionIr {
    pub target: ConclusionLog,
    pub value: NodeId,
}

/// The built query: frozen DAG plus the node sets evaluation needs
#[derive(Debug)]
pub struct LoweredQuery {
    pub dag: ExprDag,
    /// Root product: where clauses, then selects, group keys and
    /// non-aggregate order keys, in post-reorder order
    pub root: NodeId,
    pub selects: Vec<NodeId>,
    pub group_keys: Vec<NodeId>,
    pub havings: Vec<NodeId>,
    /// Sort keys with descending flags, attachment order
    pub order: Vec<(NodeId, bool)>,
    /// Every aggregate node in the query
    pub aggregates: Vec<NodeId>,
    pub limit: Option<usize>,
    pub distinct: bool,
    pub rules: Option<RuleScopeIr>,
}

/// Lowers one [`QuerySpec`] into a [`LoweredQuery`]
pub struct IrBuilder {
    dag: ExprDag,
    var_nodes: HashMap<VarId, NodeId>,
    mapped_cache: HashMap<MapKey, NodeId>,
    aggregates: Vec<NodeId>,
    /// First implicit-domain variable seen, for the missing-registry error
    implicit_var: Option<String>,
}

impl IrBuilder {
    pub fn new() -> Self {
        IrBuilder {
            dag: ExprDag::new(),
            var_nodes: HashMap::new(),
            mapped_cache: HashMap::new(),
            aggregates: Vec::new(),
            implicit_var: None,
        }
    }

    /// Lower every clause slot, validate, reorder and freeze
    pub fn lower_query(mut self, spec: &QuerySpec, has_registry: bool) -> BuildResult<LoweredQuery> {
        let mut where_ids = Vec::with_capacity(spec.wheres.len());
        for cond in &spec.wheres {
            where_ids.push(self.lower_expr(cond, ClauseCtx::Where)?);
        }

        let mut select_ids = Vec::with_capacity(spec.selects.len());
        for select in &spec.selects {
            select_ids.push(self.lower_expr(select, ClauseCtx::Select)?);
        }

        let mut group_key_ids = Vec::with_capacity(spec.group_keys.len());
        for key in &spec.group_keys {
            group_key_ids.push(self.lower_expr(key, ClauseCtx::GroupKey)?);
        }

        // Variables the product binds; having and ordering may not
        // reach outside this set
        let mut bound: BTreeSet<VarId> = BTreeSet::new();
        for id in where_ids
            .iter()
            .chain(select_ids.iter())
            .chain(group_key_ids.iter())
        {
            bound.extend(planner::variable_footprint(&self.dag, *id));
        }

        let mut having_ids = Vec::with_capacity(spec.havings.len());
        for having in &spec.havings {
            let id = self.lower_expr(having, ClauseCtx::Having)?;
            self.check_bound(id, &bound, having)?;
            having_ids.push(id);
        }

        let mut order_ids = Vec::with_capacity(spec.order.len());
        for (key, descending) in &spec.order {
            let id = self.lower_expr(key, ClauseCtx::OrderKey)?;
            self.check_bound(id, &bound, key)?;
            order_ids.push((id, *descending));
        }

        let rules = match &spec.rules {
            Some(scope) => {
                // conclusion streams have no binding context left for
                // grouping, having or ordering
                if !spec.group_keys.is_empty() {
                    return Err(BuildError::ConflictingClauses {
                        feature: "grouped_by",
                    });
                }
                if !spec.havings.is_empty() {
                    return Err(BuildError::ConflictingClauses { feature: "having" });
                }
                if !spec.order.is_empty() {
                    return Err(BuildError::ConflictingClauses {
                        feature: "ordered_by",
                    });
                }
                Some(self.lower_scope(scope)?)
            }
            None => None,
        };

        if let Some(name) = &self.implicit_var {
            if !has_registry {
                return Err(BuildError::MissingRegistry { name: name.clone() });
            }
        }

        // Root product in clause order: selects bind the result
        // variables before the where conjunction tests them. Nodes
        // containing aggregates stay off the root - their values only
        // exist once the grouping stage has bound them. The planner
        // settles the final order.
        let root = self.dag.add(NodeKind::Product)?;
        let mut root_children: Vec<NodeId> = select_ids
            .iter()
            .copied()
            .filter(|id| !subtree_has_aggregate(&self.dag, *id))
            .collect();
        root_children.extend(where_ids);
        root_children.extend(group_key_ids.iter().copied());
        for (id, _) in &order_ids {
            if !subtree_has_aggregate(&self.dag, *id) {
                root_children.push(*id);
            }
        }
        let mut seen = BTreeSet::new();
        root_children.retain(|id| seen.insert(*id));
        for child in planner::order_children(&self.dag, &root_children) {
            self.dag.attach(root, child)?;
        }

        self.dag.freeze();
        debug!(
            nodes = self.dag.len(),
            selects = select_ids.len(),
            aggregates = self.aggregates.len(),
            "query lowered and frozen"
        );

        Ok(LoweredQuery {
            dag: self.dag,
            root,
            selects: select_ids,
            group_keys: group_key_ids,
            havings: having_ids,
            order: order_ids,
            aggregates: self.aggregates,
            limit: spec.limit,
            distinct: spec.distinct,
            rules,
        })
    }

    fn check_bound(&self, id: NodeId, bound: &BTreeSet<VarId>, expr: &Expr) -> BuildResult<()> {
        let footprint = planner::variable_footprint(&self.dag, id);
        if footprint.iter().any(|v| !bound.contains(v)) {
            return Err(BuildError::DanglingSelectable {
                expr: expr.label(),
            });
        }
        Ok(())
    }

    fn lower_scope(&mut self, scope: &RuleScopeSpec) -> BuildResult<RuleScopeIr> {
        let cond = match &scope.cond {
            Some(cond) => Some(self.lower_expr(cond, ClauseCtx::RuleCond)?),
            None => None,
        };
        let mut conclusions = Vec::with_capacity(scope.conclusions.len());
        for ConclusionSpec { target, value } in &scope.conclusions {
            conclusions.push(ConclusionIr {
                target: target.clone(),
                value: self.lower_expr(value, ClauseCtx::Conclusion)?,
            });
        }
        let mut children = Vec::with_capacity(scope.children.len());
        for child in &scope.children {
            children.push(self.lower_scope(child)?);
        }
        Ok(RuleScopeIr {
            kind: scope.kind,
            cond,
            conclusions,
            children,
        })
    }

    fn lower_mapped(&mut self, key: MapKey, op: MapOp, children: Vec<NodeId>) -> BuildResult<NodeId> {
        if let Some(existing) = self.mapped_cache.get(&key) {
            return Ok(*existing);
        }
        let id = self.dag.add(NodeKind::Mapped {
            op,
            val_id: VarId::fresh(),
        })?;
        for child in children {
            self.dag.attach(id, child)?;
        }
        self.mapped_cache.insert(key, id);
        Ok(id)
    }

    fn lower_expr(&mut self, expr: &Expr, ctx: ClauseCtx) -> BuildResult<NodeId> {
        match expr.kind() {
            ExprKind::Literal(value) => self.dag.add(NodeKind::Literal(value.clone())),
            ExprKind::Var(decl) => {
                if let Some(existing) = self.var_nodes.get(&decl.id) {
                    return Ok(*existing);
                }
                if matches!(decl.domain, DomainSpec::Registry) && self.implicit_var.is_none() {
                    self.implicit_var = Some(decl.name.to_string());
                }
                let id = self.dag.add(NodeKind::Var(decl.clone()))?;
                self.var_nodes.insert(decl.id, id);
                Ok(id)
            }
            ExprKind::Attr { base, name } => {
                let base_id = self.lower_expr(base, ctx)?;
                self.lower_mapped(
                    MapKey::Attr(base_id, name.clone()),
                    MapOp::Attr(name.clone()),
                    vec![base_id],
                )
            }
            ExprKind::Index { base, key } => {
                let base_id = self.lower_expr(base, ctx)?;
                self.lower_mapped(
                    MapKey::Index(base_id, key.clone()),
                    MapOp::Index(key.clone()),
                    vec![base_id],
                )
            }
            ExprKind::Call { base, method, args } => {
                let base_id = self.lower_expr(base, ctx)?;
                let mut child_ids = vec![base_id];
                for arg in args {
                    child_ids.push(self.lower_expr(arg, ctx)?);
                }
                self.lower_mapped(
                    MapKey::Call(base_id, method.clone(), child_ids[1..].to_vec()),
                    MapOp::Call(method.clone()),
                    child_ids,
                )
            }
            ExprKind::Flat { base } => {
                let base_id = self.lower_expr(base, ctx)?;
                self.lower_mapped(MapKey::Flat(base_id), MapOp::Flat, vec![base_id])
            }
            ExprKind::Cmp { op, lhs, rhs } => {
                let lhs_id = self.lower_expr(lhs, ctx)?;
                let rhs_id = self.lower_expr(rhs, ctx)?;
                let id = self.dag.add(NodeKind::Cmp(*op))?;
                self.dag.attach(id, lhs_id)?;
                self.dag.attach(id, rhs_id)?;
                Ok(id)
            }
            ExprKind::Arith { op, lhs, rhs } => {
                let lhs_id = self.lower_expr(lhs, ctx)?;
                let rhs_id = self.lower_expr(rhs, ctx)?;
                let id = self.dag.add(NodeKind::Arith(*op))?;
                self.dag.attach(id, lhs_id)?;
                self.dag.attach(id, rhs_id)?;
                Ok(id)
            }
            ExprKind::And { lhs, rhs } => {
                let lhs_id = self.lower_expr(lhs, ctx)?;
                let rhs_id = self.lower_expr(rhs, ctx)?;
                let id = self.dag.add(NodeKind::And)?;
                for child in planner::order_children(&self.dag, &[lhs_id, rhs_id]) {
                    self.dag.attach(id, child)?;
                }
                Ok(id)
            }
            ExprKind::Or { lhs, rhs } => {
                // OR is order-significant: left short-circuits right
                let lhs_id = self.lower_expr(lhs, ctx)?;
                let rhs_id = self.lower_expr(rhs, ctx)?;
                let id = self.dag.add(NodeKind::Or)?;
                self.dag.attach(id, lhs_id)?;
                self.dag.attach(id, rhs_id)?;
                Ok(id)
            }
            ExprKind::Not { inner } => {
                let inner_id = self.lower_expr(inner, ctx)?;
                let id = self.dag.add(NodeKind::Not)?;
                self.dag.attach(id, inner_id)?;
                Ok(id)
            }
            ExprKind::In { item, collection } => {
                let item_id = self.lower_expr(item, ctx)?;
                let collection_id = self.lower_expr(collection, ctx)?;
                let id = self.dag.add(NodeKind::In)?;
                self.dag.attach(id, item_id)?;
                self.dag.attach(id, collection_id)?;
                Ok(id)
            }
            ExprKind::HasType { target, tag } => {
                let target_id = self.lower_expr(target, ctx)?;
                let id = self.dag.add(NodeKind::HasType(*tag))?;
                self.dag.attach(id, target_id)?;
                Ok(id)
            }
            ExprKind::Predicate(pred) => {
                let mut arg_ids = Vec::with_capacity(pred.args.len());
                for arg in &pred.args {
                    arg_ids.push(self.lower_expr(arg, ctx)?);
                }
                let id = self.dag.add(NodeKind::Predicate {
                    name: pred.name.clone(),
                    func: pred.func.clone(),
                    absorbing: pred.absorbing,
                })?;
                for arg_id in arg_ids {
                    self.dag.attach(id, arg_id)?;
                }
                Ok(id)
            }
            ExprKind::Function(func) => {
                let mut arg_ids = Vec::with_capacity(func.args.len());
                for arg in &func.args {
                    arg_ids.push(self.lower_expr(arg, ctx)?);
                }
                let id = self.dag.add(NodeKind::Function {
                    name: func.name.clone(),
                    func: func.func.clone(),
                })?;
                for arg_id in arg_ids {
                    self.dag.attach(id, arg_id)?;
                }
                Ok(id)
            }
            ExprKind::Aggregate(agg) => {
                if !ctx.allows_aggregates() {
                    return Err(match ctx {
                        ClauseCtx::GroupKey => BuildError::AggregateInGroupKey {
                            name: agg.kind.as_str().to_string(),
                        },
                        _ => BuildError::AggregateInWhere {
                            name: agg.kind.as_str().to_string(),
                        },
                    });
                }
                if agg.arg.contains_aggregate() {
                    return Err(BuildError::AggregateInWhere {
                        name: agg.kind.as_str().to_string(),
                    });
                }
                // Contributions are evaluated per contributor binding,
                // so the argument lowers in where context
                let arg_id = self.lower_expr(&agg.arg, ClauseCtx::Where)?;
                let key_id = match &agg.key {
                    Some(key) => Some(self.lower_expr(key, ClauseCtx::Where)?),
                    None => None,
                };
                let id = self.dag.add(NodeKind::Aggregate {
                    kind: agg.kind,
                    distinct: agg.distinct,
                    default: agg.default.clone(),
                    has_key: key_id.is_some(),
                    val_id: VarId::fresh(),
                })?;
                self.dag.attach(id, arg_id)?;
                if let Some(key_id) = key_id {
                    self.dag.attach(id, key_id)?;
                }
                self.aggregates.push(id);
                Ok(id)
            }
            ExprKind::Inference(inf) => {
                let mut kwarg_ids = Vec::with_capacity(inf.kwargs.len());
                for (_, arg) in &inf.kwargs {
                    kwarg_ids.push(self.lower_expr(arg, ClauseCtx::Conclusion)?);
                }
                let id = self.dag.add(NodeKind::Inference {
                    name: inf.name.clone(),
                    tag: inf.tag,
                    keys: inf.kwargs.iter().map(|(k, _)| k.clone()).collect(),
                    ctor: inf.ctor.clone(),
                })?;
                for kwarg_id in kwarg_ids {
                    self.dag.attach(id, kwarg_id)?;
                }
                Ok(id)
            }
        }
    }
}

impl Default for IrBuilder {
    fn default() -> Self {
        IrBuilder::new()
    }
}

/// Does the subtree under `id` contain an aggregate node?
fn subtree_has_aggregate(dag: &ExprDag, id: NodeId) -> bool {
    let mut stack = vec![id];
    while let Some(node_id) = stack.pop() {
        let node = dag.node(node_id);
        if matches!(node.kind, NodeKind::Aggregate { .. }) {
            return true;
        }
        stack.extend(node.children.iter().copied());
    }
    false
}
