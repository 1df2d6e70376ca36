//! Instructions.

use crate::types::Type;
use crate::value::{Operand, Value};

macro_rules! keyword_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $kw:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                #[doc = concat!("`", $kw, "`")]
                $variant,
            )+
        }

        impl $name {
            /// All variants, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The textual IR keyword.
            pub fn keyword(self) -> &'static str {
                match self {
                    $(Self::$variant => $kw,)+
                }
            }

            /// Look up a variant by keyword.
            pub fn from_keyword(word: &str) -> Option<Self> {
                match word {
                    $($kw => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.keyword())
            }
        }
    };
}

keyword_enum! {
    /// Two-operand arithmetic and bitwise operators.
    BinaryOp {
        Add => "add", Sub => "sub", Mul => "mul",
        UDiv => "udiv", SDiv => "sdiv", URem => "urem", SRem => "srem",
        Shl => "shl", LShr => "lshr", AShr => "ashr",
        And => "and", Or => "or", Xor => "xor",
        FAdd => "fadd", FSub => "fsub", FMul => "fmul", FDiv => "fdiv", FRem => "frem",
    }
}

impl BinaryOp {
    /// Whether the operator works on floating-point operands.
    pub fn is_float(self) -> bool {
        matches!(
            self,
            Self::FAdd | Self::FSub | Self::FMul | Self::FDiv | Self::FRem
        )
    }
}

keyword_enum! {
    /// Conversion operators.
    CastOp {
        Trunc => "trunc", ZExt => "zext", SExt => "sext",
        FPTrunc => "fptrunc", FPExt => "fpext",
        FPToUI => "fptoui", FPToSI => "fptosi", UIToFP => "uitofp", SIToFP => "sitofp",
        PtrToInt => "ptrtoint", IntToPtr => "inttoptr", BitCast => "bitcast",
    }
}

keyword_enum! {
    /// `icmp` predicates.
    IntPredicate {
        Eq => "eq", Ne => "ne",
        Ugt => "ugt", Uge => "uge", Ult => "ult", Ule => "ule",
        Sgt => "sgt", Sge => "sge", Slt => "slt", Sle => "sle",
    }
}

keyword_enum! {
    /// `fcmp` predicates.
    FloatPredicate {
        False => "false", Oeq => "oeq", Ogt => "ogt", Oge => "oge", Olt => "olt",
        Ole => "ole", One => "one", Ord => "ord", Ueq => "ueq", Ugt => "ugt",
        Uge => "uge", Ult => "ult", Ule => "ule", Une => "une", Uno => "uno",
        True => "true",
    }
}

/// LLVM opcodes the loader accepts but does not model; they survive as
/// [`InstructionKind::Opaque`].
pub const OPAQUE_OPCODES: &[&str] = &[
    "alloca",
    "load",
    "store",
    "getelementptr",
    "switch",
    "indirectbr",
    "invoke",
    "resume",
    "callbr",
    "fneg",
    "extractvalue",
    "insertvalue",
    "extractelement",
    "insertelement",
    "shufflevector",
    "atomicrmw",
    "cmpxchg",
    "fence",
    "va_arg",
    "landingpad",
    "freeze",
];

/// One instruction, with its optional SSA result name.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub result: Option<String>,
    pub kind: InstructionKind,
}

/// Instruction payload.
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionKind {
    /// Direct call.
    Call {
        tail: Option<String>,
        ret_attrs: Vec<String>,
        ret_ty: Type,
        callee: String,
        args: Vec<Operand>,
        attr_groups: Vec<u32>,
    },
    /// `ret void` / `ret T v`.
    Ret(Option<Operand>),
    /// `br label %dest`
    Br { dest: String },
    /// `br i1 %c, label %t, label %f`
    CondBr {
        cond: Value,
        if_true: String,
        if_false: String,
    },
    /// Arithmetic or bitwise operator.
    Binary {
        op: BinaryOp,
        flags: Vec<String>,
        ty: Type,
        lhs: Value,
        rhs: Value,
    },
    /// Integer comparison.
    ICmp {
        pred: IntPredicate,
        ty: Type,
        lhs: Value,
        rhs: Value,
    },
    /// Floating-point comparison.
    FCmp {
        flags: Vec<String>,
        pred: FloatPredicate,
        ty: Type,
        lhs: Value,
        rhs: Value,
    },
    /// Conversion.
    Cast { op: CastOp, value: Operand, to: Type },
    /// `select i1 c, T a, T b`
    Select {
        cond: Operand,
        if_true: Operand,
        if_false: Operand,
    },
    /// `phi T [v, %bb], ...`
    Phi {
        ty: Type,
        incoming: Vec<(Value, String)>,
    },
    /// `unreachable`
    Unreachable,
    /// An instruction kept as raw text after its opcode.
    Opaque { opcode: String, body: String },
}

impl Instruction {
    /// An instruction without a result.
    pub fn new(kind: InstructionKind) -> Self {
        Self { result: None, kind }
    }

    /// A `call void @callee(args)` instruction.
    pub fn call_void(callee: impl Into<String>, args: Vec<Operand>) -> Self {
        Self::new(InstructionKind::Call {
            tail: None,
            ret_attrs: Vec::new(),
            ret_ty: Type::Void,
            callee: callee.into(),
            args,
            attr_groups: Vec::new(),
        })
    }

    /// The opcode keyword.
    pub fn opcode(&self) -> &str {
        match &self.kind {
            InstructionKind::Call { .. } => "call",
            InstructionKind::Ret(_) => "ret",
            InstructionKind::Br { .. } | InstructionKind::CondBr { .. } => "br",
            InstructionKind::Binary { op, .. } => op.keyword(),
            InstructionKind::ICmp { .. } => "icmp",
            InstructionKind::FCmp { .. } => "fcmp",
            InstructionKind::Cast { op, .. } => op.keyword(),
            InstructionKind::Select { .. } => "select",
            InstructionKind::Phi { .. } => "phi",
            InstructionKind::Unreachable => "unreachable",
            InstructionKind::Opaque { opcode, .. } => opcode,
        }
    }

    /// Callee and arguments, for direct calls.
    pub fn as_call(&self) -> Option<(&str, &[Operand])> {
        match &self.kind {
            InstructionKind::Call { callee, args, .. } => Some((callee, args)),
            _ => None,
        }
    }

    /// Whether this instruction ends a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::Ret(_)
                | InstructionKind::Br { .. }
                | InstructionKind::CondBr { .. }
                | InstructionKind::Unreachable
        ) || matches!(&self.kind, InstructionKind::Opaque { opcode, .. } if opcode == "switch")
    }

    /// Labels of the blocks this terminator can transfer control to.
    pub fn successors(&self) -> Vec<&str> {
        match &self.kind {
            InstructionKind::Br { dest } => vec![dest.as_str()],
            InstructionKind::CondBr {
                if_true, if_false, ..
            } => vec![if_true.as_str(), if_false.as_str()],
            _ => Vec::new(),
        }
    }
}
