//! # Expression DAG
//!
//! The built form of a query: an arena of immutable-after-build nodes.
//! Children and parents are arena indices, which breaks the shared
//! ownership cycle a parent/child pointer graph would create and makes
//! freezing the whole DAG a single flag flip.
//!
//! Nodes are attached through exactly one mutation path, [`ExprDag::attach`],
//! which maintains the parent back-links and rejects cycles. Once
//! [`ExprDag::freeze`] runs, any further structural change fails with
//! [`BuildError::Frozen`].

use std::fmt;

use thiserror::Error;

use crate::ast::{AggKind, ArithOp, CmpOp, FunctionFn, InferenceFn, PredicateFn, VarDecl};
use crate::binding::VarId;
use crate::entity::TypeTag;
use crate::value::Value;

/// Build-time structural errors
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// Mutation attempted after build() froze the query
    #[error("query structure is frozen after build()")]
    Frozen,

    /// Aggregates may only appear in select, having or ordered_by
    #[error("aggregate '{name}' is not allowed in a where clause")]
    AggregateInWhere { name: String },

    /// Aggregates cannot key the grouping they feed on
    #[error("aggregate '{name}' cannot be used as a grouping key")]
    AggregateInGroupKey { name: String },

    /// A having or ordering expression references variables the query
    /// never binds
    #[error("expression '{expr}' references variables not bound by the query")]
    DanglingSelectable { expr: String },

    /// Attaching the child would make the DAG cyclic
    #[error("attaching '{child}' under '{parent}' would create a cycle")]
    CycleDetected { parent: String, child: String },

    /// An implicit-domain variable needs a registry to read from
    #[error("variable '{name}' has an implicit domain but no symbol registry is attached")]
    MissingRegistry { name: String },

    /// Rule conclusions only make sense on a rule-tree query
    #[error("conclusion clauses cannot be combined with {feature}")]
    ConflictingClauses { feature: &'static str },
}

/// Result alias for build-time operations
pub type BuildResult<T> = Result<T, BuildError>;

/// Arena index of a DAG node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Navigation operation of a mapped variable
#[derive(Clone)]
pub enum MapOp {
    /// Attribute read by name
    Attr(String),
    /// Index lookup by key
    Index(Value),
    /// Method invocation; argument expressions are the node's children
    /// after the base
    Call(String),
    /// Element-wise flattening (the only navigation that multiplies
    /// bindings)
    Flat,
}

impl MapOp {
    /// Short label for diagnostics
    pub fn label(&self) -> String {
        match self {
            MapOp::Attr(name) => format!("attr({name})"),
            MapOp::Index(key) => format!("index({key:?})"),
            MapOp::Call(method) => format!("call({method})"),
            MapOp::Flat => "flat".to_string(),
        }
    }
}

/// DAG node kinds
#[derive(Clone)]
pub enum NodeKind {
    /// Constant value
    Literal(Value),
    /// Leaf variable over a domain
    Var(VarDecl),
    /// Navigation from the base child; binds its result under `val_id`
    Mapped { op: MapOp, val_id: VarId },
    /// Comparison of two value children
    Cmp(CmpOp),
    /// Arithmetic over two value children
    Arith(ArithOp),
    /// Conjunction of two truth children
    And,
    /// Disjunction of two truth children
    Or,
    /// Negation of one truth child
    Not,
    /// Membership: children are [item, collection]
    In,
    /// Runtime type test on one value child
    HasType(TypeTag),
    /// Lifted user predicate over value children
    Predicate {
        name: String,
        func: PredicateFn,
        absorbing: bool,
    },
    /// Lifted user function over value children
    Function { name: String, func: FunctionFn },
    /// Aggregate over a value child (plus optional key child); its
    /// folded value is bound under `val_id` by the grouping stage
    Aggregate {
        kind: AggKind,
        distinct: bool,
        default: Option<Value>,
        has_key: bool,
        val_id: VarId,
    },
    /// Deferred constructor; children are the kwarg value expressions
    Inference {
        name: String,
        tag: TypeTag,
        keys: Vec<String>,
        ctor: InferenceFn,
    },
    /// Order-significant conjunction of arbitrarily many children
    Product,
}

impl NodeKind {
    /// Short label for diagnostics and explain output
    pub fn label(&self) -> String {
        match self {
            NodeKind::Literal(v) => format!("lit({v:?})"),
            NodeKind::Var(decl) => format!("var({})", decl.name),
            NodeKind::Mapped { op, .. } => op.label(),
            NodeKind::Cmp(op) => format!("cmp({})", op.as_str()),
            NodeKind::Arith(op) => format!("arith({})", op.as_str()),
            NodeKind::And => "and".to_string(),
            NodeKind::Or => "or".to_string(),
            NodeKind::Not => "not".to_string(),
            NodeKind::In => "in".to_string(),
            NodeKind::HasType(tag) => format!("has_type({})", tag.name()),
            NodeKind::Predicate { name, .. } => format!("predicate({name})"),
            NodeKind::Function { name, .. } => format!("function({name})"),
            NodeKind::Aggregate { kind, .. } => format!("{}(…)", kind.as_str()),
            NodeKind::Inference { name, .. } => format!("inference({name})"),
            NodeKind::Product => "product".to_string(),
        }
    }

    /// Does evaluation of this node yield meaningful truth values?
    pub fn is_truth_valued(&self) -> bool {
        matches!(
            self,
            NodeKind::Cmp(_)
                | NodeKind::And
                | NodeKind::Or
                | NodeKind::Not
                | NodeKind::In
                | NodeKind::HasType(_)
                | NodeKind::Predicate { .. }
                | NodeKind::Product
        )
    }

    /// Is this a derived (computed) value rather than a leaf?
    pub fn is_derived(&self) -> bool {
        matches!(
            self,
            NodeKind::Mapped { .. }
                | NodeKind::Arith(_)
                | NodeKind::Function { .. }
                | NodeKind::Aggregate { .. }
                | NodeKind::Inference { .. }
        )
    }

    /// Can this node appear in a select clause?
    pub fn is_selectable(&self) -> bool {
        !self.is_truth_valued()
    }

    /// Identity this node binds its value under, if it binds one
    pub fn val_id(&self) -> Option<VarId> {
        match self {
            NodeKind::Var(decl) => Some(decl.id),
            NodeKind::Mapped { val_id, .. } | NodeKind::Aggregate { val_id, .. } => Some(*val_id),
            _ => None,
        }
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A single DAG node: kind plus child and parent arena links
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
    pub parents: Vec<NodeId>,
}

/// Node arena with a whole-DAG freeze flag
#[derive(Debug, Default)]
pub struct ExprDag {
    nodes: Vec<Node>,
    frozen: bool,
}

impl ExprDag {
    /// Empty, unfrozen arena
    pub fn new() -> Self {
        ExprDag::default()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no node has been added
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Has the DAG been frozen?
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Node accessor
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Add a detached node
    pub fn add(&mut self, kind: NodeKind) -> BuildResult<NodeId> {
        if self.frozen {
            return Err(BuildError::Frozen);
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            kind,
            children: Vec::new(),
            parents: Vec::new(),
        });
        Ok(id)
    }

    /// Attach `child` as the next child slot of `parent`.
    ///
    /// The sole structural mutation path: maintains the parent
    /// back-link and rejects attachments that would create a cycle.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> BuildResult<()> {
        if self.frozen {
            return Err(BuildError::Frozen);
        }
        if parent == child || self.reaches(child, parent) {
            return Err(BuildError::CycleDetected {
                parent: self.node(parent).kind.label(),
                child: self.node(child).kind.label(),
            });
        }
        self.nodes[parent.index()].children.push(child);
        if !self.nodes[child.index()].parents.contains(&parent) {
            self.nodes[child.index()].parents.push(parent);
        }
        Ok(())
    }

    /// Freeze the whole arena; every later add/attach fails
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Is `to` reachable from `from` through child edges?
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        if from == to {
            return true;
        }
        let mut stack = vec![from];
        let mut seen = vec![false; self.nodes.len()];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if seen[id.index()] {
                continue;
            }
            seen[id.index()] = true;
            stack.extend(self.node(id).children.iter().copied());
        }
        false
    }

    /// Expression path from the root down to `id`, for diagnostics
    pub fn path_of(&self, id: NodeId) -> String {
        let mut labels = Vec::new();
        let mut cursor = Some(id);
        while let Some(node_id) = cursor {
            let node = self.node(node_id);
            labels.push(format!("{}:{}", node.id, node.kind.label()));
            cursor = node.parents.first().copied();
        }
        labels.reverse();
        labels.join(" / ")
    }

    /// Indented textual dump of the subtree under `root`
    pub fn dump(&self, root: NodeId) -> String {
        let mut out = String::new();
        self.dump_into(root, 0, &mut out);
        out
    }

    fn dump_into(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        out.push_str(&"  ".repeat(depth));
        out.push_str(&format!("{} {}\n", node.id, node.kind.label()));
        for child in &node.children {
            self.dump_into(*child, depth + 1, out);
        }
    }
}
