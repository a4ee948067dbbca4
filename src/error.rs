//! Error types for modelwalk.
//!
//! All errors are strongly typed using thiserror. Value operations fail with
//! [`ValueError`]; everything the controller surfaces is an [`EngineError`].
//! The split matters: a [`InvariantViolation`] is the only failure that the
//! invariant checker catches, every other variant is fatal for the operation
//! that raised it.

use thiserror::Error;

/// Failures raised by value and type operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// Capacity or index violation on a bounded value.
    #[error("Bounds error: {message}")]
    Bounds {
        /// What went out of bounds.
        message: String,
    },

    /// A collaborator broke a contract (wrong argument kind, malformed JSON).
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the broken contract.
        message: String,
    },
}

impl ValueError {
    /// Creates a bounds error.
    #[must_use]
    pub fn bounds(message: impl Into<String>) -> Self {
        Self::Bounds {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Domain-level failure: an invariant does not hold in the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InvariantViolation {
    /// Human-readable description of what failed.
    pub message: String,
}

impl InvariantViolation {
    /// Creates a violation with the given description.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Top-level error type for modelwalk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Value(#[from] ValueError),

    /// Raised from an invariant check to signal "not satisfied".
    #[error("Invariant not satisfied: {0}")]
    Violation(InvariantViolation),

    /// Produced by the default error hook when an invariant fails.
    #[error("{message}")]
    InvariantFailed {
        message: String,
        violation: InvariantViolation,
    },

    #[error("Unknown variable: {name}")]
    UnknownVariable { name: String },

    #[error("Unknown rule: {name}")]
    UnknownRule { name: String },

    #[error("Snapshot {index} is not in the execution history (length {len})")]
    SnapshotOutOfRange { index: usize, len: usize },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },
}

impl From<InvariantViolation> for EngineError {
    fn from(v: InvariantViolation) -> Self {
        Self::Violation(v)
    }
}

impl EngineError {
    /// Shorthand for `EngineError::Violation(InvariantViolation::new(..))`.
    #[must_use]
    pub fn violation(message: impl Into<String>) -> Self {
        Self::Violation(InvariantViolation::new(message))
    }

    /// Returns true if this is a bounds error.
    #[must_use]
    pub const fn is_bounds(&self) -> bool {
        matches!(self, Self::Value(ValueError::Bounds { .. }))
    }

    /// Returns true if this is an internal (contract) error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Value(ValueError::Internal { .. }))
    }

    /// Returns true if this is a domain violation, raw or routed through the hook.
    #[must_use]
    pub const fn is_violation(&self) -> bool {
        matches!(self, Self::Violation(_) | Self::InvariantFailed { .. })
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
