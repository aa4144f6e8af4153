//! # Symbol Registry
//!
//! Process-visible index from entity type to the live instances that
//! opted in. Variables without an explicit domain draw their candidates
//! from here. The registry is an explicit, injected handle - there is no
//! process-global state - and the engine only ever reads it.
//!
//! Reads taken during evaluation are snapshots: a variable captures the
//! current slice for its type at first pull and keeps it for that
//! evaluation. Concurrent mutation during an evaluation is the caller's
//! problem to serialise.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::entity::{Entity, TypeTag};
use crate::value::Value;

/// Shared type → instances index. Cloning the handle shares the index.
#[derive(Clone, Default)]
pub struct SymbolRegistry {
    inner: Arc<RwLock<HashMap<TypeId, Vec<Value>>>>,
}

impl SymbolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        SymbolRegistry::default()
    }

    /// Register a live instance; returns the handle back for chaining.
    ///
    /// This is the opt-in point: construction-time registration mirrors
    /// extending a `Symbol` base in a dynamic host.
    pub fn register<T: Entity>(&self, obj: Arc<T>) -> Arc<T> {
        self.inner
            .write()
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Value::object(Arc::clone(&obj)));
        obj
    }

    /// Construct, register and return a new symbol in one step
    pub fn symbol<T: Entity>(&self, obj: T) -> Arc<T> {
        self.register(Arc::new(obj))
    }

    /// Snapshot of the instances registered for `T`, in registration order
    pub fn instances_of<T: Entity>(&self) -> Vec<Value> {
        self.inner
            .read()
            .get(&TypeId::of::<T>())
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot by runtime tag (registration order preserved)
    pub fn instances_of_tag(&self, tag: &TypeTag) -> Vec<Value> {
        let instances = self.inner.read();
        for values in instances.values() {
            if let Some(first) = values.first() {
                if tag.is_instance(first) {
                    return values.clone();
                }
            }
        }
        Vec::new()
    }

    /// Total registered instance count across all types
    pub fn len(&self) -> usize {
        self.inner.read().values().map(Vec::len).sum()
    }

    /// True when nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SymbolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymbolRegistry({} instances)", self.len())
    }
}

/// Append-only pool of values produced by rule conclusions.
///
/// Conclusions append here as rules fire; deduced variables range over
/// the contents accumulated so far, so later rules can reason over
/// earlier conclusions within the same evaluation.
#[derive(Clone, Default)]
pub struct ConclusionLog {
    entries: Rc<RefCell<Vec<Value>>>,
}

impl ConclusionLog {
    /// Create an empty log
    pub fn new() -> Self {
        ConclusionLog::default()
    }

    /// Append a concluded value
    pub fn push(&self, value: Value) {
        self.entries.borrow_mut().push(value);
    }

    /// Values accumulated so far, in firing order
    pub fn snapshot(&self) -> Vec<Value> {
        self.entries.borrow().clone()
    }

    /// Number of concluded values
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// True when no conclusion has fired yet
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Discard all conclusions (between evaluations)
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl std::fmt::Debug for ConclusionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConclusionLog({} entries)", self.len())
    }
}
