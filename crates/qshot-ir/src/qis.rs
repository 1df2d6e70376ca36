//! Names and encodings shared by compiled QIS modules and their consumers.
//!
//! QIS modules call a small set of `___`-prefixed runtime functions that take
//! plain `i64` qubit and result indices. Output is produced through print
//! calls whose first argument is a length-prefixed `USER:<KIND>:<label>` tag.

use std::fmt;

use crate::module::{IrModule, MetadataItem};
use crate::types::Type;

/// `___rxy(double theta, double phi, i64 qubit)`
pub const RXY: &str = "___rxy";
/// `___rz(double theta, i64 qubit)`
pub const RZ: &str = "___rz";
/// `___rzz(double theta, i64 a, i64 b)`
pub const RZZ: &str = "___rzz";
/// `___cz(i64 a, i64 b)`
pub const CZ: &str = "___cz";
/// `___lazy_measure(i64 qubit, i64 result)`
pub const LAZY_MEASURE: &str = "___lazy_measure";
/// `___reset(i64 qubit)`
pub const RESET: &str = "___reset";
/// `i1 ___read_result(i64 result)`
pub const READ_RESULT: &str = "___read_result";
/// `___print_bool(ptr tag, i64 len, i1 value)`
pub const PRINT_BOOL: &str = "___print_bool";
/// `___print_int(ptr tag, i64 len, i64 value)`
pub const PRINT_INT: &str = "___print_int";
/// `___print_float(ptr tag, i64 len, double value)`
pub const PRINT_FLOAT: &str = "___print_float";
/// `i64 ___get_current_shot()`
pub const GET_CURRENT_SHOT: &str = "___get_current_shot";
/// `___random_seed(i64 seed)`
pub const RANDOM_SEED: &str = "___random_seed";
/// `i32 ___random_int()`
pub const RANDOM_INT: &str = "___random_int";
/// `double ___random_float()`, uniform in `[0, 1)`
pub const RANDOM_FLOAT: &str = "___random_float";
/// `i32 ___random_int_bounded(i32 bound)`, uniform in `[0, bound)`
pub const RANDOM_INT_BOUNDED: &str = "___random_int_bounded";
/// `___random_advance(i64 delta)` skips `delta` draws
pub const RANDOM_ADVANCE: &str = "___random_advance";

/// Runtime functions that QIR programs may call directly, before and
/// after compilation: the shot index and the program's random stream.
pub const SHOT_RUNTIME: &[&str] = &[
    GET_CURRENT_SHOT,
    RANDOM_SEED,
    RANDOM_INT,
    RANDOM_FLOAT,
    RANDOM_INT_BOUNDED,
    RANDOM_ADVANCE,
];

/// Every QIS runtime function.
pub const ALL_FUNCTIONS: &[&str] = &[
    RXY,
    RZ,
    RZZ,
    CZ,
    LAZY_MEASURE,
    RESET,
    READ_RESULT,
    PRINT_BOOL,
    PRINT_INT,
    PRINT_FLOAT,
    GET_CURRENT_SHOT,
    RANDOM_SEED,
    RANDOM_INT,
    RANDOM_FLOAT,
    RANDOM_INT_BOUNDED,
    RANDOM_ADVANCE,
];

/// Return type and parameter types of a QIS runtime function.
pub fn signature(name: &str) -> Option<(Type, Vec<Type>)> {
    let (ret, params) = match name {
        RXY => (Type::Void, vec![Type::Double, Type::Double, Type::i64()]),
        RZ => (Type::Void, vec![Type::Double, Type::i64()]),
        RZZ => (Type::Void, vec![Type::Double, Type::i64(), Type::i64()]),
        CZ | LAZY_MEASURE => (Type::Void, vec![Type::i64(), Type::i64()]),
        RESET => (Type::Void, vec![Type::i64()]),
        READ_RESULT => (Type::i1(), vec![Type::i64()]),
        PRINT_BOOL => (Type::Void, vec![Type::ptr(), Type::i64(), Type::i1()]),
        PRINT_INT => (Type::Void, vec![Type::ptr(), Type::i64(), Type::i64()]),
        PRINT_FLOAT => (Type::Void, vec![Type::ptr(), Type::i64(), Type::Double]),
        GET_CURRENT_SHOT => (Type::i64(), vec![]),
        RANDOM_SEED | RANDOM_ADVANCE => (Type::Void, vec![Type::i64()]),
        RANDOM_INT => (Type::Int(32), vec![]),
        RANDOM_FLOAT => (Type::Double, vec![]),
        RANDOM_INT_BOUNDED => (Type::Int(32), vec![Type::Int(32)]),
        _ => return None,
    };
    Some((ret, params))
}

/// Named metadata recording the compilation target of a QIS module.
pub const TARGET_METADATA: &str = "qshot.qis";

/// Tag namespace for program output.
pub const USER_TAG: &str = "USER";

/// Tags must fit a one-byte length prefix.
pub const MAX_TAG_LEN: usize = 255;

/// Output value kind carried in a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Result,
    Bool,
    Int,
    Float,
    Array,
    Tuple,
}

impl TagKind {
    /// Tag spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Result => "RESULT",
            Self::Bool => "BOOL",
            Self::Int => "INT",
            Self::Float => "FLOAT",
            Self::Array => "QIRARRAY",
            Self::Tuple => "QIRTUPLE",
        }
    }

    /// Parse a tag spelling.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "RESULT" => Self::Result,
            "BOOL" => Self::Bool,
            "INT" => Self::Int,
            "FLOAT" => Self::Float,
            "QIRARRAY" => Self::Array,
            "QIRTUPLE" => Self::Tuple,
            _ => return None,
        })
    }

    /// Whether entries of this kind group others rather than carry a value.
    pub fn is_container(self) -> bool {
        matches!(self, Self::Array | Self::Tuple)
    }
}

/// A parsed `USER:<KIND>:<label>` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTag {
    pub kind: TagKind,
    pub label: String,
}

impl OutputTag {
    /// Create a tag.
    pub fn new(kind: TagKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
        }
    }

    /// Parse tag text; anything outside the `USER` namespace is `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.splitn(3, ':');
        if parts.next()? != USER_TAG {
            return None;
        }
        let kind = TagKind::parse(parts.next()?)?;
        let label = parts.next().unwrap_or_default();
        Some(Self::new(kind, label))
    }

    /// Length-prefixed bytes for a tag global, or `None` if the tag is too long.
    pub fn encode(&self) -> Option<Vec<u8>> {
        let text = self.to_string();
        let len = u8::try_from(text.len()).ok()?;
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.push(len);
        bytes.extend_from_slice(text.as_bytes());
        Some(bytes)
    }

    /// Decode length-prefixed tag bytes.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let (len, rest) = bytes.split_first()?;
        if usize::from(*len) != rest.len() {
            return None;
        }
        Self::parse(std::str::from_utf8(rest).ok()?)
    }
}

impl fmt::Display for OutputTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{USER_TAG}:{}:{}", self.kind.as_str(), self.label)
    }
}

/// Target and optimization level a QIS module was compiled for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFor {
    pub target: String,
    pub opt_level: u8,
}

/// Read the compilation marker, if the module is in QIS form.
pub fn compiled_for(module: &IrModule) -> Option<CompiledFor> {
    let named = module.named_metadata(TARGET_METADATA)?;
    let node = module.metadata_node(*named.nodes.first()?)?;
    match node.items.as_slice() {
        [MetadataItem::Str(target), level, ..] => Some(CompiledFor {
            target: target.clone(),
            opt_level: u8::try_from(level.as_int()?).ok()?,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        let tag = OutputTag::new(TagKind::Result, "r0");
        assert_eq!(tag.to_string(), "USER:RESULT:r0");
        let bytes = tag.encode().unwrap();
        assert_eq!(bytes[0] as usize, "USER:RESULT:r0".len());
        assert_eq!(OutputTag::decode(&bytes), Some(tag));
    }

    #[test]
    fn test_label_with_colons() {
        let tag = OutputTag::parse("USER:INT:a:b").unwrap();
        assert_eq!(tag.kind, TagKind::Int);
        assert_eq!(tag.label, "a:b");
    }

    #[test]
    fn test_foreign_namespace() {
        assert_eq!(OutputTag::parse("EXIT:INT:oops"), None);
        assert_eq!(OutputTag::parse("USER:WHAT:x"), None);
    }

    #[test]
    fn test_signatures_cover_all_functions() {
        for name in ALL_FUNCTIONS {
            assert!(signature(name).is_some(), "{name}");
        }
        assert_eq!(signature(READ_RESULT).unwrap().0, Type::i1());
        assert!(signature("___qalloc").is_none());
    }

    #[test]
    fn test_too_long() {
        let tag = OutputTag::new(TagKind::Bool, "x".repeat(300));
        assert!(tag.encode().is_none());
    }
}
