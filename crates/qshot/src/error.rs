//! Error types for the pipeline facade.

use qshot_compile::CompilationError;
use qshot_exec::{ExecutionError, FormatError};
use qshot_ir::ParseError;
use qshot_profile::{AttributeError, ValidationError};
use thiserror::Error;

use crate::config::ConfigError;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// A structural failure that halted the pipeline.
///
/// Per-shot faults are never reported here; they live in the
/// [`ResultSet`](qshot_exec::ResultSet).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Attribute error: {0}")]
    Attributes(#[from] AttributeError),

    #[error("Compilation error: {0}")]
    Compilation(#[from] CompilationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),
}

impl PipelineError {
    /// Name of the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Parse(_) => "load",
            Self::Validation(_) => "validate",
            Self::Attributes(_) => "extract",
            Self::Compilation(_) => "compile",
            Self::Execution(_) => "execute",
            Self::Format(_) => "format",
        }
    }
}
