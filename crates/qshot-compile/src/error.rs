//! Error types for the compiler crate.

use thiserror::Error;

/// Errors that can occur during compilation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompilationError {
    /// The requested target is not known.
    #[error("Unknown compilation target '{0}'; known targets: {known}", known = crate::target::known_targets())]
    UnknownTarget(String),

    /// Optimization level outside 0-3.
    #[error("Invalid optimization level {0}; expected 0-3")]
    InvalidOptLevel(u8),

    /// The target cannot represent a construct.
    #[error("Target '{target}' does not support {construct}")]
    Unsupported {
        /// The rejected construct.
        construct: String,
        /// The target that rejected it.
        target: String,
    },

    /// The module is already compiled for a different target.
    #[error("Module is already compiled for target '{compiled}', cannot compile for '{requested}'")]
    TargetMismatch {
        /// Target recorded in the module.
        compiled: String,
        /// Target that was requested.
        requested: String,
    },

    /// An output tag does not fit the one-byte length prefix.
    #[error("Output tag '{tag}' is {len} bytes; tags must be shorter than 256 bytes")]
    LabelTooLong {
        /// The full tag text.
        tag: String,
        /// Its length in bytes.
        len: usize,
    },

    /// The program needs more qubits than the target has.
    #[error("Program requires {required} qubits but target '{target}' has {available}")]
    CapacityExceeded {
        required: u64,
        available: u64,
        target: String,
    },

    /// A pass found the program in a state it cannot handle.
    #[error("Pass '{pass}' failed: {message}")]
    PassFailed {
        /// Pass name.
        pass: String,
        /// What went wrong.
        message: String,
    },
}

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompilationError>;
