//! Structural match builder.
//!
//! `match_entity::<T>()` describes an instance of `T` by its attribute
//! values and lowers to the conjunction
//! `has_type(target, T) ∧ target.k == v ∧ …`. Nested matches introduce
//! a fresh anonymous variable for the inner entity and recurse.

use crate::ast::{has_type_tag, variable_tagged, Expr};
use crate::entity::{Entity, TypeTag};

/// A structural pattern over one entity
pub struct Match {
    target: Expr,
    tag: TypeTag,
    fields: Vec<(String, FieldPattern)>,
}

enum FieldPattern {
    Value(Expr),
    Nested(Match),
}

/// Pattern over an anonymous instance of `T` drawn from the registry
pub fn match_entity<T: Entity>() -> Match {
    let tag = TypeTag::of::<T>();
    Match {
        target: variable_tagged(format!("_{}", tag.name()), tag),
        tag,
        fields: Vec::new(),
    }
}

/// Pattern whose target is bound to a named variable
pub fn match_variable<T: Entity>(target: Expr) -> Match {
    Match {
        target,
        tag: TypeTag::of::<T>(),
        fields: Vec::new(),
    }
}

impl Match {
    /// Require `target.name == value`
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.fields
            .push((name.into(), FieldPattern::Value(value.into())));
        self
    }

    /// Require `target.name` to structurally match a nested pattern
    pub fn field_match(mut self, name: impl Into<String>, nested: Match) -> Self {
        self.fields
            .push((name.into(), FieldPattern::Nested(nested)));
        self
    }

    /// The matched entity variable
    pub fn target(&self) -> Expr {
        self.target.clone()
    }

    /// Lower the pattern to its conjunction
    pub fn cond(self) -> Expr {
        let target = self.target.clone();
        let mut conj = has_type_tag(target.clone(), self.tag);
        for (name, pattern) in self.fields {
            match pattern {
                FieldPattern::Value(value) => {
                    conj = conj.and(target.attr(&name).eq(value));
                }
                FieldPattern::Nested(nested) => {
                    let inner = nested.target();
                    conj = conj
                        .and(target.attr(&name).eq(inner))
                        .and(nested.cond());
                }
            }
        }
        conj
    }
}

impl From<Match> for Expr {
    fn from(m: Match) -> Expr {
        m.cond()
    }
}
