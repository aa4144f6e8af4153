//! Resource Limits Module
//!
//! Resource limit enforcement for query evaluation:
//! - Result count limits
//! - Intermediate binding limits
//! - Product nesting depth limits
//!
//! ## Design
//!
//! Uses cooperative checking - the evaluator calls `check_*` methods at
//! its suspension points and aborts the stream on breach.

use std::cell::Cell;

/// Resource limit error
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResourceError {
    /// Result count limit exceeded
    #[error("result limit exceeded: {actual} results, limit {limit}")]
    ResultLimitExceeded { limit: usize, actual: usize },

    /// Intermediate binding count exceeded
    #[error("intermediate binding limit exceeded: {actual} bindings, limit {limit}")]
    IntermediateLimitExceeded { limit: usize, actual: usize },

    /// Product nesting depth exceeded
    #[error("product depth limit exceeded: depth {actual}, limit {limit}")]
    DepthLimitExceeded { limit: usize, actual: usize },
}

/// Resource limits configuration (None = unlimited)
#[derive(Debug, Clone, Default)]
pub struct ResourceLimits {
    /// Maximum number of results the final stream may emit
    pub max_results: Option<usize>,

    /// Maximum number of intermediate bindings produced across the
    /// whole evaluation
    pub max_intermediate: Option<usize>,

    /// Maximum product nesting depth
    pub max_depth: Option<usize>,
}

impl ResourceLimits {
    /// No limits
    pub fn unlimited() -> Self {
        ResourceLimits::default()
    }
}

/// Per-evaluation counters checked against the limits
#[derive(Debug, Default)]
pub struct ResourceTracker {
    limits: ResourceLimits,
    results: Cell<usize>,
    intermediate: Cell<usize>,
}

impl ResourceTracker {
    /// Tracker for one evaluation
    pub fn new(limits: ResourceLimits) -> Self {
        ResourceTracker {
            limits,
            results: Cell::new(0),
            intermediate: Cell::new(0),
        }
    }

    /// Count one final result
    pub fn check_result(&self) -> Result<(), ResourceError> {
        let actual = self.results.get() + 1;
        self.results.set(actual);
        match self.limits.max_results {
            Some(limit) if actual > limit => {
                Err(ResourceError::ResultLimitExceeded { limit, actual })
            }
            _ => Ok(()),
        }
    }

    /// Count one intermediate binding
    pub fn check_intermediate(&self) -> Result<(), ResourceError> {
        let actual = self.intermediate.get() + 1;
        self.intermediate.set(actual);
        match self.limits.max_intermediate {
            Some(limit) if actual > limit => {
                Err(ResourceError::IntermediateLimitExceeded { limit, actual })
            }
            _ => Ok(()),
        }
    }

    /// Check a product nesting depth
    pub fn check_depth(&self, actual: usize) -> Result<(), ResourceError> {
        match self.limits.max_depth {
            Some(limit) if actual > limit => {
                Err(ResourceError::DepthLimitExceeded { limit, actual })
            }
            _ => Ok(()),
        }
    }
}
