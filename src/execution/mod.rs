//! Evaluation Hardening Module
//!
//! Production-grade evaluation controls:
//! - Timeout enforcement with external cancellation
//! - Resource limits (result count, intermediate bindings, depth)
//!
//! ## Example
//!
//! ```rust
//! use entiql::execution::ExecutionConfig;
//! use std::time::Duration;
//!
//! let config = ExecutionConfig::default()
//!     .with_timeout(Duration::from_secs(30))
//!     .with_max_results(100_000);
//! ```

mod deadline;
mod limits;

pub use deadline::{CancelHandle, EvalDeadline, TimeoutError};
pub use limits::{ResourceError, ResourceLimits, ResourceTracker};

use std::time::Duration;

/// Configuration for one query evaluation
#[derive(Debug, Clone, Default)]
pub struct ExecutionConfig {
    /// Evaluation timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Resource limits
    pub limits: ResourceLimits,
}

impl ExecutionConfig {
    /// Set the evaluation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Cap the number of results
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.limits.max_results = Some(max);
        self
    }

    /// Cap the number of intermediate bindings
    pub fn with_max_intermediate(mut self, max: usize) -> Self {
        self.limits.max_intermediate = Some(max);
        self
    }

    /// Cap the product nesting depth
    pub fn with_max_depth(mut self, max: usize) -> Self {
        self.limits.max_depth = Some(max);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let config = ExecutionConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_max_results(10)
            .with_max_depth(3);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.limits.max_results, Some(10));
        assert_eq!(config.limits.max_depth, Some(3));
        assert_eq!(config.limits.max_intermediate, None);
    }
}
