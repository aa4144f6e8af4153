//! # Bindings and Operation Results
//!
//! The in-flight currency of evaluation. A [`Binding`] maps variable
//! identities to concrete host values; an [`OperationResult`] pairs a
//! binding with the truth value a node assigned to it. False results
//! still carry their binding so logical composition can observe the
//! context that failed.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::value::Value;

static NEXT_VAR_ID: AtomicU64 = AtomicU64::new(1);

/// Stable opaque identity of a variable, assigned at creation.
///
/// Identity - not name, not value - is what bindings key on; two
/// variables with the same name are still distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u64);

impl VarId {
    /// Allocate a fresh identity
    pub fn fresh() -> Self {
        VarId(NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Partial assignment from variable identity to host value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binding {
    slots: HashMap<VarId, Value>,
}

impl Binding {
    /// Empty binding
    pub fn new() -> Self {
        Binding::default()
    }

    /// Value bound to `id`, if any
    pub fn get(&self, id: VarId) -> Option<&Value> {
        self.slots.get(&id)
    }

    /// Is `id` bound?
    pub fn contains(&self, id: VarId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Number of bound identities
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when nothing is bound
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// New binding extended with `id ↦ value`.
    ///
    /// Rebinding an identity to an incompatible value returns None;
    /// rebinding to an equal value is a no-op.
    pub fn bind(&self, id: VarId, value: Value) -> Option<Binding> {
        if let Some(existing) = self.slots.get(&id) {
            return (*existing == value).then(|| self.clone());
        }
        let mut next = self.clone();
        next.slots.insert(id, value);
        Some(next)
    }

    /// Merge two bindings. Compatible iff every shared identity maps to
    /// host-equal values; incompatible merges return None.
    pub fn merge(&self, other: &Binding) -> Option<Binding> {
        let (small, large) = if self.slots.len() <= other.slots.len() {
            (self, other)
        } else {
            (other, self)
        };
        let mut merged = large.clone();
        for (id, value) in &small.slots {
            match merged.slots.get(id) {
                Some(existing) if existing != value => return None,
                Some(_) => {}
                None => {
                    merged.slots.insert(*id, value.clone());
                }
            }
        }
        Some(merged)
    }
}

/// A `(binding, truth)` emission flowing between expression nodes
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    /// The binding context of this emission
    pub binding: Binding,
    /// Whether the node holds under that binding
    pub truth: bool,
}

impl OperationResult {
    /// A true emission
    pub fn holds(binding: Binding) -> Self {
        OperationResult {
            binding,
            truth: true,
        }
    }

    /// A false emission (context preserved)
    pub fn fails(binding: Binding) -> Self {
        OperationResult {
            binding,
            truth: false,
        }
    }
}
