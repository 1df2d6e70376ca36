//! Error types for loading and decoding modules.

use thiserror::Error;

/// Errors raised while parsing textual IR.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Lexer error (invalid token or bad string escape).
    #[error("Lexer error at line {line}: {message}")]
    LexerError { line: usize, message: String },

    /// Unexpected token.
    #[error("Unexpected token at line {line}: expected {expected}, found {found}")]
    UnexpectedToken {
        line: usize,
        expected: String,
        found: String,
    },

    /// Unexpected end of input.
    #[error("Unexpected end of input: {0}")]
    UnexpectedEof(String),

    /// A top-level entity that the loader does not know.
    #[error("Unknown directive at line {line}: {directive}")]
    UnknownDirective { line: usize, directive: String },

    /// An instruction opcode that is not part of the IR.
    #[error("Unknown instruction at line {line}: {opcode}")]
    UnknownInstruction { line: usize, opcode: String },

    /// Two definitions share a name.
    #[error("Duplicate definition at line {line}: {name}")]
    DuplicateDefinition { line: usize, name: String },

    /// Generic parse error.
    #[error("Parse error at line {line}: {message}")]
    Generic { line: usize, message: String },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors raised while decoding a bitcode artifact.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BitcodeError {
    /// The buffer does not start with the bitcode magic.
    #[error("Not a qshot bitcode artifact (bad magic)")]
    BadMagic,

    /// The artifact was written by an unknown format version.
    #[error("Unsupported bitcode version {found} (expected {expected})")]
    UnsupportedVersion { found: u8, expected: u8 },

    /// The buffer ended inside a record.
    #[error("Truncated bitcode at offset {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    /// A tag byte did not name a known record kind.
    #[error("Invalid {what} tag {tag:#04x} at offset {offset}")]
    InvalidTag {
        what: &'static str,
        tag: u8,
        offset: usize,
    },

    /// A string payload was not valid UTF-8.
    #[error("Invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// Bytes remained after the module record.
    #[error("Trailing data after module ({remaining} bytes)")]
    TrailingData { remaining: usize },
}

/// Result type for bitcode decoding.
pub type BitcodeResult<T> = Result<T, BitcodeError>;
