//! Error types for validation and attribute extraction.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rule classes checked by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleClass {
    /// Entry-point presence and shape.
    EntryPoint,
    /// Entry-point attribute keys and value kinds.
    Attributes,
    /// Required module flags.
    ModuleFlags,
    /// Declared and IR-defined functions.
    Functions,
    /// Instruction legality in reachable code.
    Instructions,
    /// Declared counts against the indices actually used.
    Consistency,
    /// Output recording and labels.
    Output,
}

impl fmt::Display for RuleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EntryPoint => "entry-point",
            Self::Attributes => "attributes",
            Self::ModuleFlags => "module-flags",
            Self::Functions => "functions",
            Self::Instructions => "instructions",
            Self::Consistency => "consistency",
            Self::Output => "output",
        };
        f.write_str(name)
    }
}

/// One violated rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: RuleClass,
    pub message: String,
    /// Function the violation was found in, when it is local to one.
    pub function: Option<String>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(name) => write!(f, "[{}] {} (in @{name})", self.rule, self.message),
            None => write!(f, "[{}] {}", self.rule, self.message),
        }
    }
}

/// Every rule a module violates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("QIR validation failed with {} violation(s): {}", .violations.len(), join(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    /// Violations of one rule class.
    pub fn of_rule(&self, rule: RuleClass) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.rule == rule)
    }
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while extracting entry-point attributes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttributeError {
    /// No single entry point to read from.
    #[error("Module has {0} entry points; expected exactly one")]
    EntryPointCount(usize),

    /// A recognised attribute is present with a value of the wrong kind.
    #[error("Attribute '{key}' has malformed value '{value}': expected {expected}")]
    Malformed {
        key: String,
        value: String,
        expected: &'static str,
    },

    /// An output-recording call cannot be turned into a schema entry.
    #[error("Malformed output record in @{function}: {message}")]
    MalformedOutput { function: String, message: String },
}

/// Result type for attribute extraction.
pub type AttributeResult<T> = Result<T, AttributeError>;
