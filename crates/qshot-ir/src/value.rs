//! Constants, values and typed operands.

use std::fmt;

use crate::types::Type;

/// Identifier sigil.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sigil {
    Local,
    Global,
}

impl Sigil {
    /// Render `name` with this sigil, quoting it when it is not a bare identifier.
    pub(crate) fn ident(self, name: &str) -> String {
        let sigil = match self {
            Self::Local => '%',
            Self::Global => '@',
        };
        let bare = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'$' | b'.' | b'_'))
            && (!name.as_bytes()[0].is_ascii_digit() || name.bytes().all(|b| b.is_ascii_digit()));
        if bare {
            format!("{sigil}{name}")
        } else {
            format!("{sigil}\"{}\"", escape(name.as_bytes()))
        }
    }
}

/// Escape bytes the way textual IR string literals expect.
pub(crate) fn escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b == b'"' || b == b'\\' || !(0x20..0x7f).contains(&b) {
            out.push_str(&format!("\\{b:02X}"));
        } else {
            out.push(char::from(b));
        }
    }
    out
}

/// Render a double the way the loader reads it back exactly.
pub(crate) fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        format!("0x{:016X}", v.to_bits())
    }
}

/// A constant operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Integer literal.
    Int(i64),
    /// `true` / `false`.
    Bool(bool),
    /// Floating-point literal.
    Float(f64),
    /// `null`
    Null,
    /// `undef`
    Undef,
    /// `poison`
    Poison,
    /// `zeroinitializer`
    ZeroInit,
    /// Reference to a global (`@name`).
    Global(String),
    /// `inttoptr (i64 N to T)`
    IntToPtr { value: i64, ty: Type },
    /// `getelementptr [inbounds] (T, T* @g, i32 0, ...)`
    GetElementPtr {
        inbounds: bool,
        source: Type,
        base_ty: Type,
        base: String,
        indices: Vec<(Type, i64)>,
    },
}

impl Constant {
    /// The global this constant points into, if any.
    pub fn global_name(&self) -> Option<&str> {
        match self {
            Self::Global(name) | Self::GetElementPtr { base: name, .. } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Float(v) => write!(f, "{}", format_float(*v)),
            Self::Null => write!(f, "null"),
            Self::Undef => write!(f, "undef"),
            Self::Poison => write!(f, "poison"),
            Self::ZeroInit => write!(f, "zeroinitializer"),
            Self::Global(name) => write!(f, "{}", Sigil::Global.ident(name)),
            Self::IntToPtr { value, ty } => write!(f, "inttoptr (i64 {value} to {ty})"),
            Self::GetElementPtr {
                inbounds,
                source,
                base_ty,
                base,
                indices,
            } => {
                write!(f, "getelementptr ")?;
                if *inbounds {
                    write!(f, "inbounds ")?;
                }
                write!(f, "({source}, {base_ty} {}", Sigil::Global.ident(base))?;
                for (ty, idx) in indices {
                    write!(f, ", {ty} {idx}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// An instruction operand value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A constant.
    Const(Constant),
    /// A local SSA value or parameter (`%name`).
    Local(String),
}

impl Value {
    /// Shorthand for an integer constant.
    pub fn int(v: i64) -> Self {
        Self::Const(Constant::Int(v))
    }

    /// Shorthand for a float constant.
    pub fn float(v: f64) -> Self {
        Self::Const(Constant::Float(v))
    }

    /// Static qubit or result index: `null` is 0, `inttoptr (i64 N ...)` is N,
    /// and a plain integer is its own index.
    pub fn static_index(&self) -> Option<u64> {
        match self {
            Self::Const(Constant::Null) => Some(0),
            Self::Const(Constant::IntToPtr { value, .. } | Constant::Int(value)) => {
                u64::try_from(*value).ok()
            }
            _ => None,
        }
    }

    /// Constant floating-point value, accepting integer literals.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Const(Constant::Float(v)) => Some(*v),
            Self::Const(Constant::Int(v)) => Some(*v as f64),
            _ => None,
        }
    }

    /// The local name, if this is a local.
    pub fn as_local(&self) -> Option<&str> {
        match self {
            Self::Local(name) => Some(name),
            Self::Const(_) => None,
        }
    }

    /// The global this value points into, if any.
    pub fn global_name(&self) -> Option<&str> {
        match self {
            Self::Const(c) => c.global_name(),
            Self::Local(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(c) => write!(f, "{c}"),
            Self::Local(name) => write!(f, "{}", Sigil::Local.ident(name)),
        }
    }
}

/// A typed operand, as in call arguments (`%Qubit* writeonly null`).
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub ty: Type,
    pub attrs: Vec<String>,
    pub value: Value,
}

impl Operand {
    /// Create an operand without parameter attributes.
    pub fn new(ty: Type, value: Value) -> Self {
        Self {
            ty,
            attrs: Vec::new(),
            value,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ty)?;
        for attr in &self.attrs {
            write!(f, " {attr}")?;
        }
        write!(f, " {}", self.value)
    }
}
