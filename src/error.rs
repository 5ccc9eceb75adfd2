//! Error taxonomy for the engine and vault.
//!
//! One variant per failure mode, following the storage-error style of
//! enumerating causes with `#[error("...")]` messages rather than a single
//! opaque string.

use thiserror::Error;

/// Errors returned by the evaluation engine, the vault, and the backend
/// adapter contract.
#[derive(Error, Debug, Clone)]
pub enum IndigoError {
    /// Invalid call arguments: null rule/data, incompatible options,
    /// malformed identifiers, etc.
    #[error("argument error: {0}")]
    Argument(String),

    /// The backend failed to compile a rule's expression.
    #[error("compile error in rule '{rule_id}': {message}")]
    Compile {
        rule_id: String,
        message: String,
        location: Option<String>,
        snippet: Option<String>,
    },

    /// The backend failed to evaluate a compiled program against data.
    #[error("evaluation error in rule '{rule_id}': {message}")]
    Evaluation { rule_id: String, message: String },

    /// A parallel worker raised an unhandled panic while evaluating a rule.
    #[error("worker panic while evaluating rule '{rule_id}': {message}")]
    ParallelEvaluationPanic { rule_id: String, message: String },

    /// The evaluation context was cancelled before completion.
    #[error("evaluation canceled")]
    Canceled,

    /// The evaluation context's deadline elapsed before completion.
    #[error("evaluation deadline exceeded")]
    DeadlineExceeded,

    /// A mutation referenced a rule or parent that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A mutation would create a naming collision.
    #[error("duplicate rule id: {0}")]
    DuplicateId(String),

    /// A move would introduce a cycle in the tree.
    #[error("moving '{id}' under '{new_parent}' would create a cycle")]
    CycleError { id: String, new_parent: String },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IndigoError>;
