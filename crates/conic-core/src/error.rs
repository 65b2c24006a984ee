//! Unified error type for the conic modeling layer.
//!
//! Errors are discriminated by cause rather than by the module that raised
//! them: [`ConicError::Config`] for constructions the algebra cannot
//! represent, [`ConicError::Numeric`] for parameter-graph evaluation
//! failures, and [`ConicError::Solver`] for fatal backend failures.

use thiserror::Error;

/// Unified error type for modeling, canonicalization and solving.
#[derive(Error, Debug)]
pub enum ConicError {
    /// The user built something the algebra cannot represent
    /// (invalid multiplication, shape mismatch, duplicate variable, ...).
    /// Raised as soon as the offending operation is attempted.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Arithmetic over the parameter graph failed at evaluation time
    /// (division by zero, square root of a negative value, non-finite
    /// result). Can only happen during a solve or an explicit value read.
    #[error("Numeric error: {0}")]
    Numeric(String),

    /// The backend solver failed fatally (setup rejected, workspace error).
    /// Non-fatal solver verdicts are reported through the status code
    /// instead and are never raised as errors.
    #[error("Solver error: {0}")]
    Solver(String),
}

/// Convenience type alias for Results using ConicError.
pub type ConicResult<T> = Result<T, ConicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConicError::Config("duplicate variable in expression".into());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("duplicate variable"));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> ConicResult<()> {
            Err(ConicError::Numeric("division by zero".into()))
        }

        fn outer() -> ConicResult<()> {
            inner()?;
            Ok(())
        }

        assert!(matches!(outer(), Err(ConicError::Numeric(_))));
    }
}
