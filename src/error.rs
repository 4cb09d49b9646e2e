//! Execution errors.

use std::fmt;

use thiserror::Error;
use tracing::error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ExecError>;

/// Machine-readable classification of user-visible query failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A stage received a value of a type it cannot operate on.
    TypeMismatch,
    /// An expression evaluator reported a failure.
    Evaluation,
    /// A transactional cursor reported a failure.
    Cursor,
    /// A synthetic failure raised through a failure point.
    Debug,
}

impl ErrorCode {
    /// Stable string form of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TypeMismatch => "TypeMismatch",
            ErrorCode::Evaluation => "Evaluation",
            ErrorCode::Cursor => "Cursor",
            ErrorCode::Debug => "Debug",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the execution core.
///
/// `Query` errors are reported to the client; the whole execution aborts and
/// partial results are discarded. `Internal` and `Killed` unwind the pipeline
/// the same way but indicate a protocol bug or a cancelled query.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// User-visible query failure.
    #[error("query failed: {message}")]
    Query {
        /// Classification of the failure.
        code: ErrorCode,
        /// Human readable description.
        message: String,
    },
    /// Violated protocol invariant.
    #[error("internal execution error: {0}")]
    Internal(String),
    /// The query was cancelled while executing.
    #[error("query killed")]
    Killed,
    /// A serialized call could not be decoded.
    #[error("invalid call payload: {0}")]
    Wire(String),
    /// Execution options could not be parsed.
    #[error("invalid execution options: {0}")]
    InvalidOptions(String),
}

impl ExecError {
    /// Builds a user-visible error with the given code.
    pub fn query(code: ErrorCode, message: impl Into<String>) -> Self {
        ExecError::Query {
            code,
            message: message.into(),
        }
    }

    /// Builds an internal error and logs it, since it always indicates a bug.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(%message, "execution protocol violated");
        ExecError::Internal(message)
    }

    /// True for errors that indicate a broken protocol implementation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecError::Internal(_))
    }

    /// Returns the query error code, if this is a user-visible error.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ExecError::Query { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Formats an error with its code prefix, e.g. `[TypeMismatch] ...`.
pub struct ExecErrorWithCode<'a>(pub &'a ExecError);

impl fmt::Display for ExecErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.code() {
            Some(code) => write!(f, "[{code}] {}", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}
