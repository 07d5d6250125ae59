// SPDX-License-Identifier: MIT

//! Unified error taxonomy shared by every crate in the workspace (spec.md #7).

use thiserror::Error;

/// Design-level error kind. Distinct from [`CoreError`] itself: several
/// error variants can share a kind (e.g. every `NotFound` variant across
/// crates), and callers at a surface boundary (API, CLI) dispatch on the
/// kind rather than matching every concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    Unauthorized,
    Capacity,
    Transient,
    StepFailure,
    Fatal,
}

crate::simple_display! {
    ErrorKind {
        InvalidInput => "invalid_input",
        NotFound => "not_found",
        Conflict => "conflict",
        Unauthorized => "unauthorized",
        Capacity => "capacity",
        Transient => "transient",
        StepFailure => "step_failure",
        Fatal => "fatal",
    }
}

impl ErrorKind {
    /// Whether an error of this kind is ever eligible for automatic retry at
    /// its point of origin. Only `Transient` is; `StepFailure` retries
    /// follow step-level policy instead of blanket retry-at-origin.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// The core error type. Every fallible operation in the workspace returns
/// (or wraps) this, so a single `kind()` match at a surface boundary covers
/// the whole system.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("capacity exceeded: {0}")]
    Capacity(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("step {step} failed: {message}")]
    StepFailure { step: String, message: String },

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { what, id: id.into() }
    }

    pub fn step_failure(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepFailure { step: step.into(), message: message.into() }
    }

    /// Map this error onto the design-level taxonomy (spec.md #7). `Serde`
    /// and `Io` are treated as `Transient`: they're almost always a momentary
    /// disk/codec hiccup rather than a caller mistake or invariant breach.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Capacity(_) => ErrorKind::Capacity,
            Self::Transient(_) => ErrorKind::Transient,
            Self::StepFailure { .. } => ErrorKind::StepFailure,
            Self::Fatal(_) => ErrorKind::Fatal,
            Self::Serde(_) | Self::Io(_) => ErrorKind::Transient,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_constructor_sets_kind() {
        let err = CoreError::not_found("execution", "exe-123");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("exe-123"));
    }

    #[test]
    fn step_failure_constructor_sets_kind() {
        let err = CoreError::step_failure("plan", "agent timed out");
        assert_eq!(err.kind(), ErrorKind::StepFailure);
    }

    #[test]
    fn only_transient_kind_is_transient() {
        assert!(ErrorKind::Transient.is_transient());
        assert!(!ErrorKind::StepFailure.is_transient());
        assert!(!ErrorKind::Fatal.is_transient());
    }

    #[test]
    fn io_and_serde_errors_map_to_transient() {
        let io_err = CoreError::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(io_err.kind(), ErrorKind::Transient);

        let serde_err = CoreError::from(serde_json::from_str::<u8>("not json").unwrap_err());
        assert_eq!(serde_err.kind(), ErrorKind::Transient);
    }
}
