//! # Query AST - Builder Expression Layer
//!
//! Symbolic expressions as the user writes them, before `build()` lowers
//! them into the frozen expression DAG. Builder nodes are cheap-clone
//! `Rc` trees; variables carry their stable identity from the moment
//! they are created, so the same variable used in several clauses
//! unifies across all of them.
//!
//! ## Builders
//!
//! Expressions compose through explicit constructors and fluent
//! methods rather than operator overloading:
//!
//! ```rust
//! use entiql::prelude::*;
//!
//! # use std::any::Any;
//! # #[derive(Debug)]
//! # struct Robot { battery: i64 }
//! # impl Entity for Robot {
//! #     fn as_any(&self) -> &dyn Any { self }
//! #     fn attr(&self, name: &str) -> Option<Value> {
//! #         match name { "battery" => Some(Value::Int(self.battery)), _ => None }
//! #     }
//! # }
//! let r = variable::<Robot>("r");
//! let cond = r.attr("battery").gt(lit(50));
//! ```

pub mod clauses;
pub mod pattern;

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::binding::VarId;
use crate::entity::{Entity, TypeTag};
use crate::symbol::ConclusionLog;
use crate::value::Value;

// ============================================================================
// Operator Types
// ============================================================================

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    /// Equality (host equality semantics)
    Eq,
    /// Inequality
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
}

impl CmpOp {
    /// String representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// Arithmetic operators for symbolic value expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    /// Addition (+)
    Add,
    /// Subtraction (-)
    Sub,
    /// Multiplication (*)
    Mul,
    /// Division (/)
    Div,
    /// Modulo (%)
    Mod,
}

impl ArithOp {
    /// String representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }
}

/// Aggregate function kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggKind {
    /// String representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AggKind::Count => "count",
            AggKind::Sum => "sum",
            AggKind::Avg => "average",
            AggKind::Min => "min",
            AggKind::Max => "max",
        }
    }
}

// ============================================================================
// Variables
// ============================================================================

/// Where a variable draws its candidate values from
#[derive(Clone)]
pub enum DomainSpec {
    /// The symbol registry slice for the variable's type, read at
    /// evaluation time (never at build time)
    Registry,
    /// An explicit iterable supplied at creation
    Explicit(Arc<Vec<Value>>),
    /// The conclusions accumulated so far in a rule evaluation
    Deduced(ConclusionLog),
}

impl fmt::Debug for DomainSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainSpec::Registry => write!(f, "registry"),
            DomainSpec::Explicit(values) => write!(f, "explicit[{}]", values.len()),
            DomainSpec::Deduced(log) => write!(f, "deduced[{}]", log.len()),
        }
    }
}

/// A typed variable declaration: identity, display name, optional type
/// tag and domain
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub id: VarId,
    pub name: Arc<str>,
    pub tag: Option<TypeTag>,
    pub domain: DomainSpec,
}

// ============================================================================
// Expression Tree
// ============================================================================

/// User callable lifted into a truth-valued node
pub type PredicateFn = Arc<dyn Fn(&[Value]) -> Result<bool, String>>;
/// User callable lifted into a value-producing node
pub type FunctionFn = Arc<dyn Fn(&[Value]) -> Result<Value, String>>;
/// Deferred constructor invoked once per firing binding
pub type InferenceFn = Arc<dyn Fn(&IndexMap<String, Value>) -> Result<Value, String>>;

/// Predicate payload: name, symbolic arguments and the callable
#[derive(Clone)]
pub struct PredicateExpr {
    pub name: String,
    pub args: Vec<Expr>,
    pub func: PredicateFn,
    /// Absorbing predicates turn resolution and callable failures into
    /// false emissions instead of aborting the stream
    pub absorbing: bool,
}

/// Symbolic function payload
#[derive(Clone)]
pub struct FunctionExpr {
    pub name: String,
    pub args: Vec<Expr>,
    pub func: FunctionFn,
}

/// Aggregate payload: kind, folded expression and fold options
#[derive(Clone)]
pub struct AggregateExpr {
    pub kind: AggKind,
    pub arg: Expr,
    /// Optional transform: min/max with a key return the argument value
    /// achieving the extremum, not the extremum itself
    pub key: Option<Expr>,
    /// Value to emit when the group is empty
    pub default: Option<Value>,
    /// Deduplicate by host equality before folding
    pub distinct: bool,
}

/// Inference-constructor payload: evaluated kwargs feed a deferred
/// constructor that materialises a fresh host instance
#[derive(Clone)]
pub struct InferenceExpr {
    pub name: String,
    pub tag: TypeTag,
    pub kwargs: Vec<(String, Expr)>,
    pub ctor: InferenceFn,
}

/// Builder expression node kinds
#[derive(Clone)]
pub enum ExprKind {
    /// Constant value
    Literal(Value),
    /// Typed variable over a domain
    Var(VarDecl),
    /// Attribute navigation `base.name`
    Attr { base: Expr, name: String },
    /// Index navigation `base[key]`
    Index { base: Expr, key: Value },
    /// Method invocation `base.method(args…)` with symbolic arguments
    Call {
        base: Expr,
        method: String,
        args: Vec<Expr>,
    },
    /// Element-wise flattening of an iterable value (multiplies bindings)
    Flat { base: Expr },
    /// Comparison of two value-producing subexpressions
    Cmp { op: CmpOp, lhs: Expr, rhs: Expr },
    /// Arithmetic over two value-producing subexpressions
    Arith { op: ArithOp, lhs: Expr, rhs: Expr },
    /// Conjunction
    And { lhs: Expr, rhs: Expr },
    /// Disjunction
    Or { lhs: Expr, rhs: Expr },
    /// Negation
    Not { inner: Expr },
    /// Membership: item equals some element of collection
    In { item: Expr, collection: Expr },
    /// Runtime type test
    HasType { target: Expr, tag: TypeTag },
    /// Lifted user predicate
    Predicate(PredicateExpr),
    /// Lifted user function
    Function(FunctionExpr),
    /// Aggregate over a grouped (or whole) stream
    Aggregate(AggregateExpr),
    /// Deferred constructor for rule conclusions
    Inference(InferenceExpr),
}

/// A symbolic expression handle (cheap clone, shared subtrees)
#[derive(Clone)]
pub struct Expr {
    node: Rc<ExprKind>,
}

impl Expr {
    pub(crate) fn new(kind: ExprKind) -> Self {
        Expr {
            node: Rc::new(kind),
        }
    }

    /// The node kind
    pub fn kind(&self) -> &ExprKind {
        &self.node
    }

    /// Short label for diagnostics
    pub fn label(&self) -> String {
        match self.kind() {
            ExprKind::Literal(v) => format!("lit({v:?})"),
            ExprKind::Var(decl) => format!("var({})", decl.name),
            ExprKind::Attr { name, .. } => format!("attr({name})"),
            ExprKind::Index { key, .. } => format!("index({key:?})"),
            ExprKind::Call { method, .. } => format!("call({method})"),
            ExprKind::Flat { .. } => "flat".to_string(),
            ExprKind::Cmp { op, .. } => format!("cmp({})", op.as_str()),
            ExprKind::Arith { op, .. } => format!("arith({})", op.as_str()),
            ExprKind::And { .. } => "and".to_string(),
            ExprKind::Or { .. } => "or".to_string(),
            ExprKind::Not { .. } => "not".to_string(),
            ExprKind::In { .. } => "in".to_string(),
            ExprKind::HasType { tag, .. } => format!("has_type({})", tag.name()),
            ExprKind::Predicate(p) => format!("predicate({})", p.name),
            ExprKind::Function(func) => format!("function({})", func.name),
            ExprKind::Aggregate(agg) => format!("{}(…)", agg.kind.as_str()),
            ExprKind::Inference(inf) => format!("inference({})", inf.name),
        }
    }

    /// Does any node of this subtree contain an aggregate?
    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.visit(&mut |kind| {
            if matches!(kind, ExprKind::Aggregate(_)) {
                found = true;
            }
        });
        found
    }

    /// Collect the identities of every leaf variable in the subtree
    pub fn leaf_vars(&self) -> Vec<VarId> {
        let mut ids = Vec::new();
        self.visit(&mut |kind| {
            if let ExprKind::Var(decl) = kind {
                if !ids.contains(&decl.id) {
                    ids.push(decl.id);
                }
            }
        });
        ids
    }

    fn visit(&self, f: &mut impl FnMut(&ExprKind)) {
        f(self.kind());
        match self.kind() {
            ExprKind::Literal(_) | ExprKind::Var(_) => {}
            ExprKind::Attr { base, .. }
            | ExprKind::Index { base, .. }
            | ExprKind::Flat { base } => base.visit(f),
            ExprKind::Call { base, args, .. } => {
                base.visit(f);
                for arg in args {
                    arg.visit(f);
                }
            }
            ExprKind::Cmp { lhs, rhs, .. }
            | ExprKind::Arith { lhs, rhs, .. }
            | ExprKind::And { lhs, rhs }
            | ExprKind::Or { lhs, rhs } => {
                lhs.visit(f);
                rhs.visit(f);
            }
            ExprKind::Not { inner } => inner.visit(f),
            ExprKind::In { item, collection } => {
                item.visit(f);
                collection.visit(f);
            }
            ExprKind::HasType { target, .. } => target.visit(f),
            ExprKind::Predicate(p) => {
                for arg in &p.args {
                    arg.visit(f);
                }
            }
            ExprKind::Function(func) => {
                for arg in &func.args {
                    arg.visit(f);
                }
            }
            ExprKind::Aggregate(agg) => {
                agg.arg.visit(f);
                if let Some(key) = &agg.key {
                    key.visit(f);
                }
            }
            ExprKind::Inference(inf) => {
                for (_, arg) in &inf.kwargs {
                    arg.visit(f);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Attribute navigation `self.name`
    pub fn attr(&self, name: impl Into<String>) -> Expr {
        Expr::new(ExprKind::Attr {
            base: self.clone(),
            name: name.into(),
        })
    }

    /// Index navigation `self[key]`
    pub fn at(&self, key: impl Into<Value>) -> Expr {
        Expr::new(ExprKind::Index {
            base: self.clone(),
            key: key.into(),
        })
    }

    /// Method invocation `self.method(args…)`
    pub fn call(&self, method: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::new(ExprKind::Call {
            base: self.clone(),
            method: method.into(),
            args,
        })
    }

    /// One binding per element of the (iterable) value
    pub fn flat(&self) -> Expr {
        Expr::new(ExprKind::Flat { base: self.clone() })
    }

    // ------------------------------------------------------------------
    // Comparison
    // ------------------------------------------------------------------

    fn cmp_with(&self, op: CmpOp, rhs: impl Into<Expr>) -> Expr {
        Expr::new(ExprKind::Cmp {
            op,
            lhs: self.clone(),
            rhs: rhs.into(),
        })
    }

    /// `self == rhs`
    pub fn eq(&self, rhs: impl Into<Expr>) -> Expr {
        self.cmp_with(CmpOp::Eq, rhs)
    }

    /// `self != rhs`
    pub fn ne(&self, rhs: impl Into<Expr>) -> Expr {
        self.cmp_with(CmpOp::Ne, rhs)
    }

    /// `self < rhs`
    pub fn lt(&self, rhs: impl Into<Expr>) -> Expr {
        self.cmp_with(CmpOp::Lt, rhs)
    }

    /// `self <= rhs`
    pub fn le(&self, rhs: impl Into<Expr>) -> Expr {
        self.cmp_with(CmpOp::Le, rhs)
    }

    /// `self > rhs`
    pub fn gt(&self, rhs: impl Into<Expr>) -> Expr {
        self.cmp_with(CmpOp::Gt, rhs)
    }

    /// `self >= rhs`
    pub fn ge(&self, rhs: impl Into<Expr>) -> Expr {
        self.cmp_with(CmpOp::Ge, rhs)
    }

    // ------------------------------------------------------------------
    // Arithmetic
    // ------------------------------------------------------------------

    fn arith_with(&self, op: ArithOp, rhs: impl Into<Expr>) -> Expr {
        Expr::new(ExprKind::Arith {
            op,
            lhs: self.clone(),
            rhs: rhs.into(),
        })
    }

    /// `self + rhs`
    pub fn add(&self, rhs: impl Into<Expr>) -> Expr {
        self.arith_with(ArithOp::Add, rhs)
    }

    /// `self - rhs`
    pub fn sub(&self, rhs: impl Into<Expr>) -> Expr {
        self.arith_with(ArithOp::Sub, rhs)
    }

    /// `self * rhs`
    pub fn mul(&self, rhs: impl Into<Expr>) -> Expr {
        self.arith_with(ArithOp::Mul, rhs)
    }

    /// `self / rhs`
    pub fn div(&self, rhs: impl Into<Expr>) -> Expr {
        self.arith_with(ArithOp::Div, rhs)
    }

    /// `self % rhs`
    pub fn rem(&self, rhs: impl Into<Expr>) -> Expr {
        self.arith_with(ArithOp::Mod, rhs)
    }

    // ------------------------------------------------------------------
    // Boolean composition
    // ------------------------------------------------------------------

    /// `self ∧ rhs`
    pub fn and(&self, rhs: impl Into<Expr>) -> Expr {
        Expr::new(ExprKind::And {
            lhs: self.clone(),
            rhs: rhs.into(),
        })
    }

    /// `self ∨ rhs`
    pub fn or(&self, rhs: impl Into<Expr>) -> Expr {
        Expr::new(ExprKind::Or {
            lhs: self.clone(),
            rhs: rhs.into(),
        })
    }

    /// Variable declaration, when this expression is a leaf variable
    pub fn as_var(&self) -> Option<&VarDecl> {
        match self.kind() {
            ExprKind::Var(decl) => Some(decl),
            _ => None,
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        lit(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        lit(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        lit(value)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        lit(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        lit(value)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        lit(value)
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        lit(value)
    }
}

// ============================================================================
// Constructors
// ============================================================================

/// Constant expression
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::new(ExprKind::Literal(value.into()))
}

/// Typed variable drawing its domain from the symbol registry at
/// evaluation time
pub fn variable<T: Entity>(name: impl Into<String>) -> Expr {
    Expr::new(ExprKind::Var(VarDecl {
        id: VarId::fresh(),
        name: Arc::from(name.into().as_str()),
        tag: Some(TypeTag::of::<T>()),
        domain: DomainSpec::Registry,
    }))
}

/// Typed variable over an explicit domain. Elements failing the type
/// check are suppressed during enumeration.
pub fn variable_over<T: Entity>(
    name: impl Into<String>,
    domain: impl IntoIterator<Item = Arc<T>>,
) -> Expr {
    let values = domain.into_iter().map(Value::object).collect();
    Expr::new(ExprKind::Var(VarDecl {
        id: VarId::fresh(),
        name: Arc::from(name.into().as_str()),
        tag: Some(TypeTag::of::<T>()),
        domain: DomainSpec::Explicit(Arc::new(values)),
    }))
}

/// Untyped variable over explicit values (no implicit type check)
pub fn value_variable(name: impl Into<String>, values: Vec<Value>) -> Expr {
    Expr::new(ExprKind::Var(VarDecl {
        id: VarId::fresh(),
        name: Arc::from(name.into().as_str()),
        tag: None,
        domain: DomainSpec::Explicit(Arc::new(values)),
    }))
}

/// Variable whose domain is the conclusions accumulated so far,
/// filtered to instances of `T`
pub fn deduced_variable<T: Entity>(name: impl Into<String>, log: &ConclusionLog) -> Expr {
    Expr::new(ExprKind::Var(VarDecl {
        id: VarId::fresh(),
        name: Arc::from(name.into().as_str()),
        tag: Some(TypeTag::of::<T>()),
        domain: DomainSpec::Deduced(log.clone()),
    }))
}

/// Conjunction
pub fn and_(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
    lhs.into().and(rhs)
}

/// Disjunction
pub fn or_(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
    lhs.into().or(rhs)
}

/// Negation. Holds iff the inner expression produced no true emission
/// for the input binding; introduces no new variables outward.
pub fn not_(inner: impl Into<Expr>) -> Expr {
    Expr::new(ExprKind::Not {
        inner: inner.into(),
    })
}

/// Membership: the value of `item` equals some element of `collection`
pub fn in_(item: impl Into<Expr>, collection: impl Into<Expr>) -> Expr {
    Expr::new(ExprKind::In {
        item: item.into(),
        collection: collection.into(),
    })
}

/// Dual of [`in_`]
pub fn contains(collection: impl Into<Expr>, item: impl Into<Expr>) -> Expr {
    in_(item, collection)
}

/// Runtime type test: the value of `target` is an instance of `T`
pub fn has_type<T: Entity>(target: impl Into<Expr>) -> Expr {
    has_type_tag(target, TypeTag::of::<T>())
}

/// Runtime type test against an already-resolved tag
pub fn has_type_tag(target: impl Into<Expr>, tag: TypeTag) -> Expr {
    Expr::new(ExprKind::HasType {
        target: target.into(),
        tag,
    })
}

/// Registry-domain variable for an already-resolved tag
pub(crate) fn variable_tagged(name: String, tag: TypeTag) -> Expr {
    Expr::new(ExprKind::Var(VarDecl {
        id: VarId::fresh(),
        name: Arc::from(name.as_str()),
        tag: Some(tag),
        domain: DomainSpec::Registry,
    }))
}

/// One binding per element of an iterable value
pub fn flat_variable(base: impl Into<Expr>) -> Expr {
    base.into().flat()
}

/// Collection size as a symbolic value (list length or string chars)
pub fn length(collection: impl Into<Expr>) -> Expr {
    symbolic_function("length", vec![collection.into()], |args| match args.first() {
        Some(Value::List(items)) => Ok(Value::Int(items.len() as i64)),
        Some(Value::Str(s)) => Ok(Value::Int(s.chars().count() as i64)),
        Some(other) => Err(format!(
            "length() expects a collection, got {}",
            other.type_label()
        )),
        None => Err("length() expects one argument".to_string()),
    })
}

/// Lift a pure user function into a value-producing node
pub fn symbolic_function(
    name: impl Into<String>,
    args: Vec<Expr>,
    func: impl Fn(&[Value]) -> Result<Value, String> + 'static,
) -> Expr {
    Expr::new(ExprKind::Function(FunctionExpr {
        name: name.into(),
        args,
        func: Arc::new(func),
    }))
}

// ============================================================================
// Predicate Builder
// ============================================================================

/// Builder for a lifted boolean predicate
pub struct PredicateBuilder {
    inner: PredicateExpr,
}

/// Lift a pure boolean callable into a truth-valued node
pub fn predicate(
    name: impl Into<String>,
    args: Vec<Expr>,
    func: impl Fn(&[Value]) -> Result<bool, String> + 'static,
) -> PredicateBuilder {
    PredicateBuilder {
        inner: PredicateExpr {
            name: name.into(),
            args,
            func: Arc::new(func),
            absorbing: false,
        },
    }
}

impl PredicateBuilder {
    /// Absorb resolution and callable failures into false emissions
    pub fn absorbing(mut self) -> Self {
        self.inner.absorbing = true;
        self
    }

    /// Finish the builder
    pub fn build(self) -> Expr {
        Expr::new(ExprKind::Predicate(self.inner))
    }
}

impl From<PredicateBuilder> for Expr {
    fn from(b: PredicateBuilder) -> Expr {
        b.build()
    }
}

// ============================================================================
// Aggregate Builders
// ============================================================================

/// Builder for an aggregate expression
pub struct AggregateBuilder {
    inner: AggregateExpr,
}

fn aggregate(kind: AggKind, arg: Expr) -> AggregateBuilder {
    AggregateBuilder {
        inner: AggregateExpr {
            kind,
            arg,
            key: None,
            default: None,
            distinct: false,
        },
    }
}

/// Number of contributions per group
pub fn count(arg: impl Into<Expr>) -> AggregateBuilder {
    aggregate(AggKind::Count, arg.into())
}

/// Numeric sum per group
pub fn sum(arg: impl Into<Expr>) -> AggregateBuilder {
    aggregate(AggKind::Sum, arg.into())
}

/// Numeric mean per group
pub fn average(arg: impl Into<Expr>) -> AggregateBuilder {
    aggregate(AggKind::Avg, arg.into())
}

/// Minimum per group; with a key, returns the argument value achieving
/// the minimum key
pub fn min_of(arg: impl Into<Expr>) -> AggregateBuilder {
    aggregate(AggKind::Min, arg.into())
}

/// Maximum per group; with a key, returns the argument value achieving
/// the maximum key
pub fn max_of(arg: impl Into<Expr>) -> AggregateBuilder {
    aggregate(AggKind::Max, arg.into())
}

impl AggregateBuilder {
    /// Transform applied before comparison (min/max only)
    pub fn with_key(mut self, key: impl Into<Expr>) -> Self {
        self.inner.key = Some(key.into());
        self
    }

    /// Value emitted when the group is empty
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.inner.default = Some(value.into());
        self
    }

    /// Deduplicate contributions by host equality before folding
    pub fn distinct(mut self) -> Self {
        self.inner.distinct = true;
        self
    }

    /// Finish the builder
    pub fn build(self) -> Expr {
        Expr::new(ExprKind::Aggregate(self.inner))
    }
}

impl From<AggregateBuilder> for Expr {
    fn from(b: AggregateBuilder) -> Expr {
        b.build()
    }
}

// ============================================================================
// Inference Constructor
// ============================================================================

/// Deferred constructor: evaluates `kwargs` under the firing binding and
/// materialises a fresh `T`, once per firing binding.
pub fn inference<T, F>(kwargs: Vec<(&str, Expr)>, ctor: F) -> Expr
where
    T: Entity,
    F: Fn(&IndexMap<String, Value>) -> T + 'static,
{
    let tag = TypeTag::of::<T>();
    Expr::new(ExprKind::Inference(InferenceExpr {
        name: tag.name().to_string(),
        tag,
        kwargs: kwargs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        ctor: Arc::new(move |resolved| Ok(Value::object(Arc::new(ctor(resolved))))),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Thing;

    impl Entity for Thing {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn test_variable_identity_is_stable_across_clones() {
        let v = variable::<Thing>("t");
        let id = v.as_var().expect("var").id;
        let clone = v.clone();
        assert_eq!(clone.as_var().expect("var").id, id);
        assert_ne!(variable::<Thing>("t").as_var().expect("var").id, id);
    }

    #[test]
    fn test_leaf_vars_deduplicates_shared_subtrees() {
        let v = variable::<Thing>("t");
        let cond = v.attr("a").gt(lit(1)).and(v.attr("b").lt(lit(2)));
        assert_eq!(cond.leaf_vars().len(), 1);
    }

    #[test]
    fn test_contains_aggregate_sees_nested_aggregates() {
        let v = variable::<Thing>("t");
        let agg: Expr = sum(v.attr("x")).into();
        assert!(agg.contains_aggregate());
        assert!(agg.gt(lit(5)).contains_aggregate());
        assert!(!v.attr("x").contains_aggregate());
    }

    #[test]
    fn test_labels_are_compact() {
        let v = variable::<Thing>("t");
        assert_eq!(v.attr("x").label(), "attr(x)");
        assert_eq!(v.attr("x").gt(lit(1)).label(), "cmp(>)");
    }
}
