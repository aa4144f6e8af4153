//! Evaluation Error Types

use thiserror::Error;

use crate::execution::{ResourceError, TimeoutError};
use crate::ir::BuildError;

/// Evaluation-time errors
///
/// Surfaced errors carry the expression path (chain of node identities
/// from the root to the failure site) in their `path` field. Normal
/// stream exhaustion is not an error - a drained domain simply ends the
/// lazy sequence.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// Attribute, index, call or flatten failed during navigation
    #[error("failed to resolve {op} at {path}: {reason}")]
    Resolution {
        op: String,
        path: String,
        reason: String,
    },

    /// An embedded user predicate or function raised
    #[error("user callable '{name}' failed at {path}: {reason}")]
    UserCallable {
        name: String,
        path: String,
        reason: String,
    },

    /// `the` (or `first`) observed an empty stream
    #[error("no solution found")]
    NoSolutionFound,

    /// `the` observed a second result
    #[error("more than one solution found")]
    MoreThanOneSolutionFound,

    /// A cardinality quantifier observed fewer results than required
    #[error("expected at least {required} solutions, found {found}")]
    TooFewSolutions { required: usize, found: usize },

    /// A cardinality quantifier observed more results than allowed
    #[error("expected at most {limit} solutions")]
    TooManySolutions { limit: usize },

    /// A resource limit tripped
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// The evaluation deadline tripped
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// A lazily-triggered build failed
    #[error(transparent)]
    Build(#[from] BuildError),
}

impl EvalError {
    /// May an enclosing NOT or absorbing predicate turn this error into
    /// a false emission?
    pub fn is_absorbable(&self) -> bool {
        matches!(
            self,
            EvalError::Resolution { .. } | EvalError::UserCallable { .. }
        )
    }
}

/// Result alias for evaluation operations
pub type EvalResult<T> = Result<T, EvalError>;
