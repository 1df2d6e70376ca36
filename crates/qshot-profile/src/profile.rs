//! QIR profile definitions: supported functions, module flags and the
//! instruction subsets of the base and adaptive profiles.

use qshot_ir::{CastOp, Instruction, InstructionKind, Operand, Type};
use serde::{Deserialize, Serialize};

/// Prefix of quantum instruction set functions.
pub const QIS_PREFIX: &str = "__quantum__qis__";

/// Prefix of runtime functions.
pub const RT_PREFIX: &str = "__quantum__rt__";

/// Quantum operations a module may call (name between prefix and `__body`).
pub const SUPPORTED_GATES: &[&str] = &[
    "rxy", "rz", "rzz", "mz", "m", "mresetz", "reset", "u1q", "h", "x", "y", "z", "s", "s__adj",
    "t", "t__adj", "rx", "ry", "cz", "cx", "cnot", "ccx",
];

/// Runtime functions a module may call.
pub const SUPPORTED_RUNTIME: &[&str] = &[
    "read_result",
    "initialize",
    "result_record_output",
    "array_record_output",
    "tuple_record_output",
    "bool_record_output",
    "double_record_output",
    "int_record_output",
];

/// Attribute naming the profiles a module conforms to.
pub const PROFILES_ATTR: &str = "qir_profiles";
/// Declared qubit count.
pub const NUM_QUBITS_ATTR: &str = "required_num_qubits";
/// Declared result count.
pub const NUM_RESULTS_ATTR: &str = "required_num_results";
/// Output labelling scheme.
pub const OUTPUT_SCHEMA_ATTR: &str = "output_labeling_schema";

/// Expected value of a required module flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagValue {
    Int(i64),
    Bool(bool),
}

/// Module flags every module must carry.
pub const REQUIRED_FLAGS: &[(&str, FlagValue)] = &[
    ("qir_major_version", FlagValue::Int(1)),
    ("qir_minor_version", FlagValue::Int(0)),
    ("dynamic_qubit_management", FlagValue::Bool(false)),
    ("dynamic_result_management", FlagValue::Bool(false)),
];

/// QIR profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Straight-line programs without measurement feedback.
    Base,
    /// Adds branching, classical arithmetic and result reads.
    Adaptive,
}

impl Profile {
    /// Attribute spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base_profile",
            Self::Adaptive => "adaptive_profile",
        }
    }

    /// Resolve a `qir_profiles` value. The most permissive named profile wins.
    pub fn from_attribute(value: &str) -> Option<Self> {
        let names: Vec<&str> = value.split(',').map(str::trim).collect();
        if names.contains(&"adaptive_profile") {
            Some(Self::Adaptive)
        } else if names.contains(&"base_profile") {
            Some(Self::Base)
        } else {
            None
        }
    }

    /// Whether the profile admits this instruction; the error names the construct.
    pub fn check(self, instruction: &Instruction) -> Result<(), String> {
        let adaptive = self == Self::Adaptive;
        let ok = match &instruction.kind {
            InstructionKind::Call { callee, .. } => {
                if !adaptive && runtime_function(callee) == Some("read_result") {
                    return Err(format!(
                        "call to @{callee} requires the adaptive profile"
                    ));
                }
                true
            }
            InstructionKind::Ret(_) | InstructionKind::Br { .. } => true,
            InstructionKind::CondBr { .. }
            | InstructionKind::Phi { .. }
            | InstructionKind::Select { .. }
            | InstructionKind::ICmp { .. }
            | InstructionKind::FCmp { .. }
            | InstructionKind::Binary { .. } => adaptive,
            InstructionKind::Cast { op, .. } => {
                adaptive && !matches!(op, CastOp::PtrToInt | CastOp::IntToPtr | CastOp::BitCast)
            }
            InstructionKind::Unreachable | InstructionKind::Opaque { .. } => false,
        };
        if ok {
            Ok(())
        } else {
            Err(format!(
                "instruction '{}' is not permitted by the {}",
                instruction.opcode(),
                self.as_str()
            ))
        }
    }
}

/// `__quantum__qis__h__body` → `h`, `__quantum__qis__s__adj` → `s__adj`.
pub fn qis_operation(name: &str) -> Option<&str> {
    let rest = name.strip_prefix(QIS_PREFIX)?;
    Some(rest.strip_suffix("__body").unwrap_or(rest))
}

/// `__quantum__rt__read_result` → `read_result`.
pub fn runtime_function(name: &str) -> Option<&str> {
    name.strip_prefix(RT_PREFIX)
}

/// Whether a pointer argument refers to a qubit or a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerRole {
    Qubit,
    Result,
}

/// Roles and static indices of the qubit/result arguments of a call.
///
/// Typed pointers (`%Qubit*`, `%Result*`) decide by type; opaque `ptr`
/// arguments fall back to the operation's signature.
pub fn pointer_arguments<'a>(
    callee: &str,
    args: &'a [Operand],
) -> Vec<(PointerRole, &'a Operand)> {
    let by_signature = |position: usize| -> Option<PointerRole> {
        if let Some(op) = qis_operation(callee) {
            return Some(match (op, position) {
                ("mz" | "m" | "mresetz", 1) => PointerRole::Result,
                _ => PointerRole::Qubit,
            });
        }
        match (runtime_function(callee)?, position) {
            ("read_result" | "result_record_output", 0) => Some(PointerRole::Result),
            _ => None,
        }
    };

    args.iter()
        .enumerate()
        .filter(|(_, a)| a.ty.is_pointer())
        .filter_map(|(i, a)| {
            let role = match a.ty.pointee_name() {
                Some("Qubit") => Some(PointerRole::Qubit),
                Some("Result") => Some(PointerRole::Result),
                Some(_) => None,
                None if a.ty == Type::Ptr(None) => by_signature(i),
                None => None,
            }?;
            Some((role, a))
        })
        .collect()
}
