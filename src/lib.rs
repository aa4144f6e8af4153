//! # EntiQL - In-Memory Entity Query Engine
//!
//! Declarative queries over live, user-defined object graphs: typed
//! variables over domains, attribute and index navigation, comparisons,
//! boolean composition, grouping and aggregation, sorting,
//! quantification, structural matching and rule-tree inference - all
//! evaluated as a lazy stream of `(binding, truth)` emissions.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Builder expressions (ast)
//!     ↓
//! [Clause Slots]             → QuerySpec (select / where / grouped_by / …)
//!     ↓
//! [IR Builder]               → frozen expression DAG (arena)
//!     ↓
//! [Planner]                  → product children reordered
//!     ↓
//! [Streaming Evaluator]      → cartesian product, short-circuit, lazy
//!     ↓
//! [Grouping & Shaping]       → aggregates, having, ordered_by, distinct, limit
//!     ↓
//! [Quantifier]               → an / the / exactly / at_least / at_most
//!     ↓
//! Results
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use entiql::prelude::*;
//!
//! # use std::any::Any;
//! #[derive(Debug)]
//! struct Robot {
//!     name: &'static str,
//!     battery: i64,
//! }
//!
//! impl Entity for Robot {
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//!
//!     fn attr(&self, name: &str) -> Option<Value> {
//!         match name {
//!             "name" => Some(Value::from(self.name)),
//!             "battery" => Some(Value::Int(self.battery)),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SymbolRegistry::new();
//! registry.symbol(Robot { name: "R2D2", battery: 100 });
//! registry.symbol(Robot { name: "C3PO", battery: 20 });
//! registry.symbol(Robot { name: "BB8", battery: 80 });
//!
//! let r = variable::<Robot>("r");
//! let strong = an(entity(r.clone())
//!     .using(&registry)?
//!     .where_(r.attr("battery").gt(lit(50)))?)
//! .tolist()?;
//! assert_eq!(strong.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `value` | Host value model (numbers, strings, lists, entities) |
//! | `entity` | Reflection bridge trait and runtime type tags |
//! | `symbol` | Symbol registry and conclusion logs |
//! | `binding` | Bindings and operation results |
//! | `ast` | Builder expression layer and clause slots |
//! | `ir` | Frozen expression DAG (arena) |
//! | `ir_builder` | Clause lowering, path caching, validation |
//! | `planner` | Product child reordering |
//! | `eval` | Streaming evaluation engine |
//! | `query` | Query façade, quantifiers, rule trees |
//! | `execution` | Timeouts and resource limits |
//! | `config` | Figment-based configuration |

pub mod ast;
pub mod binding;
pub mod config;
pub mod entity;
pub mod eval;
pub mod execution;
pub mod ir;
pub mod ir_builder;
pub mod planner;
pub mod query;
pub mod symbol;
pub mod value;

// Re-export the primary API surface
pub use ast::pattern::{match_entity, match_variable, Match};
pub use ast::{
    and_, average, contains, count, deduced_variable, flat_variable, has_type, in_, inference,
    length, lit, max_of, min_of, not_, or_, predicate, sum, symbolic_function, value_variable,
    variable, variable_over, AggKind, ArithOp, CmpOp, Expr,
};
pub use binding::{Binding, OperationResult, VarId};
pub use config::{EngineConfig, EvaluationConfig, LoggingConfig};
pub use entity::{Entity, TypeTag};
pub use eval::{EvalError, EvalResult, Quantifier};
pub use execution::{CancelHandle, ExecutionConfig, ResourceError, ResourceLimits, TimeoutError};
pub use ir::{BuildError, BuildResult};
pub use query::{an, at_least, at_most, entity, exactly, set_of, the, BuiltQuery, Quantified, Query, RuleBuilder};
pub use symbol::{ConclusionLog, SymbolRegistry};
pub use value::Value;

/// Everything a query author typically needs
pub mod prelude {
    pub use crate::ast::pattern::{match_entity, match_variable};
    pub use crate::ast::{
        and_, average, contains, count, deduced_variable, flat_variable, has_type, in_, inference,
        length, lit, max_of, min_of, not_, or_, predicate, sum, symbolic_function, value_variable,
        variable, variable_over, Expr,
    };
    pub use crate::entity::Entity;
    pub use crate::query::{an, at_least, at_most, entity, exactly, set_of, the, Query};
    pub use crate::symbol::{ConclusionLog, SymbolRegistry};
    pub use crate::value::Value;
}
