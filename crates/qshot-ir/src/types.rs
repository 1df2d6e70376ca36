//! First-class IR types.

use std::fmt;

/// A type as written in textual IR.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// `void`
    Void,
    /// `iN`
    Int(u32),
    /// `half`
    Half,
    /// `float`
    Float,
    /// `double`
    Double,
    /// `ptr` when the pointee is `None`, `T*` otherwise.
    Ptr(Option<Box<Type>>),
    /// `%Name`
    Named(String),
    /// `[N x T]`
    Array(u64, Box<Type>),
    /// `{ T, U }`
    Struct(Vec<Type>),
    /// `label`
    Label,
    /// `metadata`
    Metadata,
}

impl Type {
    /// `i1`
    pub fn i1() -> Self {
        Self::Int(1)
    }

    /// `i64`
    pub fn i64() -> Self {
        Self::Int(64)
    }

    /// Opaque `ptr`.
    pub fn ptr() -> Self {
        Self::Ptr(None)
    }

    /// Typed pointer to a named type (`%Qubit*`).
    pub fn ptr_to(name: &str) -> Self {
        Self::Ptr(Some(Box::new(Self::Named(name.to_string()))))
    }

    /// Whether this is a pointer of either flavour.
    pub fn is_pointer(&self) -> bool {
        matches!(self, Self::Ptr(_))
    }

    /// Whether this is a floating-point type.
    pub fn is_float(&self) -> bool {
        matches!(self, Self::Half | Self::Float | Self::Double)
    }

    /// Bit width of an integer type.
    pub fn int_width(&self) -> Option<u32> {
        match self {
            Self::Int(w) => Some(*w),
            _ => None,
        }
    }

    /// Name of the pointee for typed pointers to named types.
    pub fn pointee_name(&self) -> Option<&str> {
        match self {
            Self::Ptr(Some(inner)) => match inner.as_ref() {
                Self::Named(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether a word starts a type in textual IR.
    pub(crate) fn is_type_word(word: &str) -> bool {
        matches!(
            word,
            "void" | "half" | "float" | "double" | "ptr" | "label" | "metadata"
        ) || word
            .strip_prefix('i')
            .is_some_and(|w| !w.is_empty() && w.bytes().all(|b| b.is_ascii_digit()))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Int(w) => write!(f, "i{w}"),
            Self::Half => write!(f, "half"),
            Self::Float => write!(f, "float"),
            Self::Double => write!(f, "double"),
            Self::Ptr(None) => write!(f, "ptr"),
            Self::Ptr(Some(inner)) => write!(f, "{inner}*"),
            Self::Named(name) => write!(f, "{}", crate::value::Sigil::Local.ident(name)),
            Self::Array(len, elem) => write!(f, "[{len} x {elem}]"),
            Self::Struct(fields) => {
                if fields.is_empty() {
                    return write!(f, "{{}}");
                }
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, " }}")
            }
            Self::Label => write!(f, "label"),
            Self::Metadata => write!(f, "metadata"),
        }
    }
}
