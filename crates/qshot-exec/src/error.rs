//! Error types for shot execution and result handling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors that stop a batch before any shot runs.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutionError {
    /// The simulator refused the module.
    #[error("Simulator '{simulator}' cannot load module: {message}")]
    Load { simulator: String, message: String },

    /// The shot specification cannot be executed.
    #[error("Invalid shot specification: {0}")]
    InvalidSpec(String),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecutionError>;

/// A failure confined to one shot.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ShotFault {
    pub message: String,
}

impl ShotFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Labeling failures. These indicate an inconsistency between the schema
/// and the records it is applied to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum FormatError {
    #[error("Output schema uses label '{0}' more than once")]
    DuplicateLabel(String),

    #[error("Shot {shot} has {found} values but the schema names {expected}")]
    ShapeMismatch {
        shot: usize,
        expected: usize,
        found: usize,
    },
}
