//! Rule-tree builder.
//!
//! Scopes nest through closures instead of context managers: each
//! `refinement` / `alternative` / `next_rule` call opens a child scope,
//! hands a builder for it to the closure, and attaches it in order.
//!
//! ```rust,ignore
//! let q = entity(c.clone()).using(&registry)?.rule_tree(|r| {
//!     r.add(&views, view_of(&c));
//!     r.refinement(c.attr("kind").eq(lit(1)), |s| {
//!         s.add(&views, fixed_view_of(&c));
//!     });
//!     r.alternative(c.attr("kind").eq(lit(2)), |s| {
//!         s.add(&views, revolute_view_of(&c));
//!     });
//! })?;
//! ```

use crate::ast::clauses::{ConclusionSpec, RuleScopeSpec, ScopeKind};
use crate::ast::Expr;
use crate::symbol::ConclusionLog;

/// Builder for one rule scope
pub struct RuleBuilder {
    scope: RuleScopeSpec,
}

impl RuleBuilder {
    pub(crate) fn root() -> Self {
        RuleBuilder {
            scope: RuleScopeSpec::new(ScopeKind::Root, None),
        }
    }

    pub(crate) fn into_scope(self) -> RuleScopeSpec {
        self.scope
    }

    /// Conclude `value` into `target` for every binding reaching this
    /// scope (unless a refinement or alternative supersedes it)
    pub fn add(&mut self, target: &ConclusionLog, value: impl Into<Expr>) -> &mut Self {
        self.scope.conclusions.push(ConclusionSpec {
            target: target.clone(),
            value: value.into(),
        });
        self
    }

    /// Open a scope whose conclusions apply only when `cond` also
    /// holds; when it fires, it supersedes this scope's own conclusions
    pub fn refinement(
        &mut self,
        cond: impl Into<Expr>,
        build: impl FnOnce(&mut RuleBuilder),
    ) -> &mut Self {
        self.child(ScopeKind::Refinement, Some(cond.into()), build)
    }

    /// Open a scope that fires only when no earlier sibling of the
    /// current chain fired (else-if)
    pub fn alternative(
        &mut self,
        cond: impl Into<Expr>,
        build: impl FnOnce(&mut RuleBuilder),
    ) -> &mut Self {
        self.child(ScopeKind::Alternative, Some(cond.into()), build)
    }

    /// Start a new sibling rule, evaluated unconditionally after the
    /// previous one regardless of firing
    pub fn next_rule(&mut self, build: impl FnOnce(&mut RuleBuilder)) -> &mut Self {
        self.child(ScopeKind::NextRule, None, build)
    }

    fn child(
        &mut self,
        kind: ScopeKind,
        cond: Option<Expr>,
        build: impl FnOnce(&mut RuleBuilder),
    ) -> &mut Self {
        let mut builder = RuleBuilder {
            scope: RuleScopeSpec::new(kind, cond),
        };
        build(&mut builder);
        self.scope.children.push(builder.scope);
        self
    }
}
