//! Error types shared by the registries and the HTTP layer.

use thiserror::Error;

/// A stub registration was rejected. The registry is left untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Service name can't be empty")]
    EmptyService,

    #[error("Method name can't be empty")]
    EmptyMethod,

    #[error("Input cannot be empty")]
    EmptyInput,

    #[error("Output can't be empty")]
    EmptyOutput,
}

/// A stored matching rule could not be evaluated.
#[derive(Debug, Error)]
pub enum MatchError {
    /// `matches` rules need a string pattern.
    #[error("pattern for field '{field}' must be a string, got {value}")]
    NonStringPattern {
        field: String,
        value: serde_json::Value,
    },

    #[error("invalid pattern '{pattern}' for field '{field}': {source}")]
    InvalidPattern {
        field: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Failure of a stub lookup.
#[derive(Debug, Error)]
pub enum FindError {
    /// No stored stub matched. Not a server fault.
    #[error("Can't find stub for service '{service}' method '{method}'")]
    NotFound { service: String, method: String },

    /// A candidate stub carries a rule that cannot be evaluated.
    #[error("stub evaluation failed: {0}")]
    Evaluator(#[from] MatchError),
}

impl FindError {
    /// Whether this is a plain miss rather than a broken rule.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FindError::NotFound { .. })
    }
}
