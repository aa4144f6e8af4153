//! # Host Entity Bridge
//!
//! The engine never inspects host objects directly. It navigates them
//! through the [`Entity`] trait: attribute reads, index lookups, method
//! invocation and runtime type tests. Implementations must be pure -
//! the same call with the same arguments returns the same value and has
//! no side effects.
//!
//! ## Example
//!
//! ```rust
//! use std::any::Any;
//! use entiql::entity::Entity;
//! use entiql::value::Value;
//!
//! #[derive(Debug)]
//! struct Robot {
//!     name: String,
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
//!             "name" => Some(Value::from(self.name.as_str())),
//!             "battery" => Some(Value::Int(self.battery)),
//!             _ => None,
//!         }
//!     }
//! }
//! ```

use std::any::{Any, TypeId};
use std::fmt;

use crate::value::Value;

/// A host object the engine can navigate.
///
/// `attr`, `index` and `invoke` return `None` when the member does not
/// exist or the operation fails; the evaluator turns that into a
/// resolution error carrying the expression path.
pub trait Entity: fmt::Debug + Send + Sync + 'static {
    /// Runtime type name, used in diagnostics and type labels
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Upcast for runtime type tests (`self` in every implementation)
    fn as_any(&self) -> &dyn Any;

    /// Read a named attribute
    fn attr(&self, name: &str) -> Option<Value> {
        let _ = name;
        None
    }

    /// Look up by key (integer position or hashable key)
    fn index(&self, key: &Value) -> Option<Value> {
        let _ = key;
        None
    }

    /// Invoke a named method with already-resolved arguments
    fn invoke(&self, method: &str, args: &[Value]) -> Option<Value> {
        let _ = (method, args);
        None
    }
}

/// Runtime token for a concrete entity type
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Tag for the concrete type `T`
    pub fn of<T: Entity>() -> Self {
        TypeTag {
            id: TypeId::of::<T>(),
            name: short_type_name(std::any::type_name::<T>()),
        }
    }

    /// Short type name for display
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Is the value an instance of this type?
    pub fn is_instance(&self, value: &Value) -> bool {
        match value {
            Value::Object(obj) => obj.as_any().type_id() == self.id,
            _ => false,
        }
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Strip the module path from a fully qualified type name
fn short_type_name(full: &'static str) -> &'static str {
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Widget {
        size: i64,
    }

    impl Entity for Widget {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn attr(&self, name: &str) -> Option<Value> {
            match name {
                "size" => Some(Value::Int(self.size)),
                _ => None,
            }
        }
    }

    #[derive(Debug)]
    struct Gadget;

    impl Entity for Gadget {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_type_tag_matches_concrete_type_only() {
        let w = Value::object(Arc::new(Widget { size: 3 }));
        assert!(TypeTag::of::<Widget>().is_instance(&w));
        assert!(!TypeTag::of::<Gadget>().is_instance(&w));
        assert!(!TypeTag::of::<Widget>().is_instance(&Value::Int(1)));
    }

    #[test]
    fn test_attr_read_goes_through_bridge() {
        let w = Value::object(Arc::new(Widget { size: 7 }));
        let Value::Object(obj) = &w else { unreachable!() };
        assert_eq!(obj.attr("size"), Some(Value::Int(7)));
        assert_eq!(obj.attr("missing"), None);
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("a::b::Widget"), "Widget");
        assert_eq!(short_type_name("Widget"), "Widget");
    }
}
