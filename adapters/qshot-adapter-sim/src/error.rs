//! Shot faults raised by the interpreter.

use thiserror::Error;

/// Why a shot stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Fault {
    #[error("Qubit index {index} out of range (program has {available} qubits)")]
    QubitOutOfRange { index: i64, available: usize },

    #[error("Result index {index} out of range (program has {available} results)")]
    ResultOutOfRange { index: i64, available: usize },

    #[error("Instruction budget of {0} steps exhausted")]
    StepLimit(u64),

    #[error("Call depth limit of {0} exceeded")]
    CallDepth(usize),

    #[error("Unsupported instruction '{0}'")]
    Unsupported(String),

    #[error("Undefined value %{0}")]
    UndefinedValue(String),

    #[error("Missing block %{block} in @{function}")]
    MissingBlock { function: String, block: String },

    #[error("Operand type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid argument to @{function}: {message}")]
    InvalidArgument { function: String, message: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Reached unreachable")]
    Unreachable,
}

pub type FaultResult<T> = Result<T, Fault>;
