//! Error types for the evaluation crate.
//!
//! Only contract violations are represented here. An offer that does not
//! satisfy a requirement is never an error; it is a FAIL
//! [`EvaluationOutcome`](crate::EvaluationOutcome).

use thiserror::Error;

/// Errors that abort a single evaluation call.
#[derive(Error, Debug)]
pub enum EvaluateError {
    /// A reason template was rendered with the wrong number of arguments.
    #[error("reason template expects {expected} argument(s), got {got}")]
    ReasonArity {
        /// Number of `{}` placeholders in the template.
        expected: usize,
        /// Number of arguments supplied.
        got: usize,
    },

    /// A reason template could not be parsed.
    #[error("invalid reason template: {0}")]
    InvalidTemplate(String),

    /// A requirement was constructed with missing or inconsistent fields.
    #[error("invalid requirement: {0}")]
    InvalidRequirement(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    Id(#[from] offerkit_core::IdError),
}

impl EvaluateError {
    /// Check if this error indicates a bug in the caller rather than a bad
    /// environment.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::ReasonArity { .. } | Self::InvalidTemplate(_) | Self::InvalidRequirement(_)
        )
    }
}

/// A specialized Result type for evaluation operations.
pub type Result<T> = std::result::Result<T, EvaluateError>;
