//! Gate-level view of a module that the passes rewrite.
//!
//! Quantum operation calls become [`GateCall`]s; every other instruction is
//! carried through untouched as [`Op::Inst`].

use std::fmt;

use qshot_ir::{Constant, Instruction, IrModule, Operand, Type, Value};
use qshot_profile::profile::qis_operation;

use crate::error::{CompilationError, CompileResult};

/// Quantum operations the compiler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateKind {
    Rxy,
    Rz,
    Rzz,
    Cz,
    H,
    X,
    Y,
    Z,
    S,
    Sdg,
    T,
    Tdg,
    Rx,
    Ry,
    Cx,
    Ccx,
    Mz,
    MResetZ,
    Reset,
}

impl GateKind {
    /// Resolve a QIS operation name, folding aliases.
    pub fn from_operation(op: &str) -> Option<Self> {
        Some(match op {
            "rxy" | "u1q" => Self::Rxy,
            "rz" => Self::Rz,
            "rzz" => Self::Rzz,
            "cz" => Self::Cz,
            "h" => Self::H,
            "x" => Self::X,
            "y" => Self::Y,
            "z" => Self::Z,
            "s" => Self::S,
            "s__adj" => Self::Sdg,
            "t" => Self::T,
            "t__adj" => Self::Tdg,
            "rx" => Self::Rx,
            "ry" => Self::Ry,
            "cx" | "cnot" => Self::Cx,
            "ccx" => Self::Ccx,
            "mz" | "m" => Self::Mz,
            "mresetz" => Self::MResetZ,
            "reset" => Self::Reset,
            _ => return None,
        })
    }

    /// Canonical operation name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Rxy => "rxy",
            Self::Rz => "rz",
            Self::Rzz => "rzz",
            Self::Cz => "cz",
            Self::H => "h",
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
            Self::S => "s",
            Self::Sdg => "s__adj",
            Self::T => "t",
            Self::Tdg => "t__adj",
            Self::Rx => "rx",
            Self::Ry => "ry",
            Self::Cx => "cx",
            Self::Ccx => "ccx",
            Self::Mz => "mz",
            Self::MResetZ => "mresetz",
            Self::Reset => "reset",
        }
    }

    /// Number of angle parameters.
    pub fn num_angles(self) -> usize {
        match self {
            Self::Rxy => 2,
            Self::Rz | Self::Rzz | Self::Rx | Self::Ry => 1,
            _ => 0,
        }
    }

    /// Number of qubit operands.
    pub fn num_qubits(self) -> usize {
        match self {
            Self::Rzz | Self::Cz | Self::Cx => 2,
            Self::Ccx => 3,
            _ => 1,
        }
    }

    /// Whether the operation writes a result register.
    pub fn has_result(self) -> bool {
        matches!(self, Self::Mz | Self::MResetZ)
    }

    /// Whether the operation is unitary (and so a candidate for optimization).
    pub fn is_unitary(self) -> bool {
        !matches!(self, Self::Mz | Self::MResetZ | Self::Reset)
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A qubit or result operand: a fixed index, or a function parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Wire {
    Static(u64),
    Local(String),
}

impl Wire {
    /// Read a wire from an operand value.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Local(name) => Some(Self::Local(name.clone())),
            other => other.static_index().map(Self::Static),
        }
    }

    /// The wire as an `i64` operand.
    pub fn to_index_operand(&self) -> Operand {
        let value = match self {
            #[allow(clippy::cast_possible_wrap)]
            Self::Static(index) => Value::int(*index as i64),
            Self::Local(name) => Value::Local(name.clone()),
        };
        Operand::new(Type::i64(), value)
    }

    /// Static index, if fixed.
    pub fn index(&self) -> Option<u64> {
        match self {
            Self::Static(index) => Some(*index),
            Self::Local(_) => None,
        }
    }
}

impl fmt::Display for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(index) => write!(f, "{index}"),
            Self::Local(name) => write!(f, "%{name}"),
        }
    }
}

/// One quantum operation.
#[derive(Debug, Clone, PartialEq)]
pub struct GateCall {
    pub kind: GateKind,
    /// Angles in radians; non-constant angles are kept as values.
    pub angles: Vec<Value>,
    pub qubits: Vec<Wire>,
    pub result: Option<Wire>,
}

impl GateCall {
    /// A gate with constant angles.
    pub fn new(kind: GateKind, angles: &[f64], qubits: Vec<Wire>) -> Self {
        Self {
            kind,
            angles: angles.iter().map(|a| Value::float(*a)).collect(),
            qubits,
            result: None,
        }
    }

    /// Constant value of angle `i`.
    pub fn angle(&self, i: usize) -> Option<f64> {
        self.angles.get(i).and_then(Value::as_f64)
    }

    /// Whether two gates act on the same qubit set.
    pub fn same_qubits(&self, other: &Self) -> bool {
        match (self.qubits.as_slice(), other.qubits.as_slice()) {
            ([a], [b]) => a == b,
            ([a0, a1], [b0, b1]) => (a0 == b0 && a1 == b1) || (a0 == b1 && a1 == b0),
            (a, b) => a == b,
        }
    }

    /// Decode a `__quantum__qis__*` call.
    pub(crate) fn from_call(
        callee: &str,
        args: &[Operand],
        target: &str,
    ) -> CompileResult<Option<Self>> {
        let Some(op) = qis_operation(callee) else {
            return Ok(None);
        };
        let unsupported = |what: String| CompilationError::Unsupported {
            construct: what,
            target: target.to_string(),
        };
        let kind = GateKind::from_operation(op)
            .ok_or_else(|| unsupported(format!("quantum operation @{callee}")))?;

        let (angles, rest) = args
            .split_at_checked(kind.num_angles())
            .ok_or_else(|| unsupported(format!("call to @{callee} with {} arguments", args.len())))?;
        let expected = kind.num_qubits() + usize::from(kind.has_result());
        if rest.len() != expected {
            return Err(unsupported(format!(
                "call to @{callee} with {} arguments",
                args.len()
            )));
        }
        let wires = rest
            .iter()
            .map(|a| {
                Wire::from_value(&a.value)
                    .ok_or_else(|| unsupported(format!("operand '{}' of @{callee}", a.value)))
            })
            .collect::<CompileResult<Vec<_>>>()?;
        let (qubits, result) = if kind.has_result() {
            let mut wires = wires;
            let result = wires.pop();
            (wires, result)
        } else {
            (wires, None)
        };

        Ok(Some(Self {
            kind,
            angles: angles.iter().map(|a| a.value.clone()).collect(),
            qubits,
            result,
        }))
    }
}

impl fmt::Display for GateCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.angles.is_empty() {
            let angles: Vec<String> = self.angles.iter().map(ToString::to_string).collect();
            write!(f, "({})", angles.join(", "))?;
        }
        let qubits: Vec<String> = self.qubits.iter().map(ToString::to_string).collect();
        write!(f, " {}", qubits.join(", "))?;
        if let Some(result) = &self.result {
            write!(f, " -> {result}")?;
        }
        Ok(())
    }
}

/// A gate or an instruction carried through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Gate(GateCall),
    Inst(Instruction),
}

impl Op {
    pub fn as_gate(&self) -> Option<&GateCall> {
        match self {
            Self::Gate(gate) => Some(gate),
            Self::Inst(_) => None,
        }
    }
}

/// A basic block of a [`Program`] function.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: String,
    pub ops: Vec<Op>,
}

/// Body of one IR-defined function.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramFunction {
    pub name: String,
    pub blocks: Vec<Block>,
}

/// A module opened up for compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    ir: IrModule,
    functions: Vec<ProgramFunction>,
}

impl Program {
    /// Split every defined function into gates and other instructions.
    pub fn from_ir(ir: IrModule, target: &str) -> CompileResult<Self> {
        let mut functions = Vec::new();
        for function in ir.functions.iter().filter(|f| !f.is_declaration()) {
            let mut blocks = Vec::with_capacity(function.blocks.len());
            for block in &function.blocks {
                let mut ops = Vec::with_capacity(block.instructions.len());
                for inst in &block.instructions {
                    let gate = match inst.as_call() {
                        Some((callee, args)) => GateCall::from_call(callee, args, target)?,
                        None => None,
                    };
                    ops.push(gate.map_or_else(|| Op::Inst(inst.clone()), Op::Gate));
                }
                blocks.push(Block {
                    label: block.label.clone(),
                    ops,
                });
            }
            functions.push(ProgramFunction {
                name: function.name.clone(),
                blocks,
            });
        }
        Ok(Self { ir, functions })
    }

    /// Module the program was read from; bodies are stale once passes run.
    pub fn ir(&self) -> &IrModule {
        &self.ir
    }

    pub fn functions(&self) -> &[ProgramFunction] {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut [ProgramFunction] {
        &mut self.functions
    }

    /// Every gate, in function and block order.
    pub fn gates(&self) -> impl Iterator<Item = &GateCall> {
        self.functions
            .iter()
            .flat_map(|f| f.blocks.iter())
            .flat_map(|b| b.ops.iter())
            .filter_map(Op::as_gate)
    }

    /// Number of gates.
    pub fn gate_count(&self) -> usize {
        self.gates().count()
    }

    /// Every carried-through instruction.
    pub fn instructions(&self) -> impl Iterator<Item = (&str, &Instruction)> {
        self.functions.iter().flat_map(|f| {
            f.blocks.iter().flat_map(move |b| {
                b.ops.iter().filter_map(move |op| match op {
                    Op::Inst(inst) => Some((f.name.as_str(), inst)),
                    Op::Gate(_) => None,
                })
            })
        })
    }

    pub(crate) fn into_parts(self) -> (IrModule, Vec<ProgramFunction>) {
        (self.ir, self.functions)
    }
}

/// Whether a value is the null pointer.
pub(crate) fn is_null(value: &Value) -> bool {
    matches!(value, Value::Const(Constant::Null))
}

#[cfg(test)]
mod tests {
    use qshot_ir::parse_ir;

    use super::*;

    #[test]
    fn test_program_from_ir() {
        let ir = parse_ir(
            r"
define void @main() #0 {
entry:
  call void @__quantum__qis__rxy__body(double 1.5, double 0.0, ptr inttoptr (i64 2 to ptr))
  call void @__quantum__qis__cnot__body(ptr null, ptr inttoptr (i64 1 to ptr))
  call void @__quantum__qis__m__body(ptr null, ptr inttoptr (i64 4 to ptr))
  call void @__quantum__rt__initialize(ptr null)
  ret void
}
",
        )
        .unwrap();
        let program = Program::from_ir(ir, "helios").unwrap();
        let gates: Vec<_> = program.gates().collect();
        assert_eq!(gates.len(), 3);
        assert_eq!(gates[0].kind, GateKind::Rxy);
        assert_eq!(gates[0].angle(0), Some(1.5));
        assert_eq!(gates[0].qubits, vec![Wire::Static(2)]);
        assert_eq!(gates[1].kind, GateKind::Cx);
        assert_eq!(gates[2].kind, GateKind::Mz);
        assert_eq!(gates[2].result, Some(Wire::Static(4)));
        assert_eq!(program.instructions().count(), 2);
        assert_eq!(gates[2].to_string(), "mz 0 -> 4");
    }

    #[test]
    fn test_wrong_arity() {
        let ir = parse_ir(
            r"
define void @main() {
entry:
  call void @__quantum__qis__cz__body(ptr null)
  ret void
}
",
        )
        .unwrap();
        assert!(matches!(
            Program::from_ir(ir, "iqm"),
            Err(CompilationError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_same_qubits_symmetric() {
        let a = GateCall::new(GateKind::Cz, &[], vec![Wire::Static(0), Wire::Static(1)]);
        let b = GateCall::new(GateKind::Cz, &[], vec![Wire::Static(1), Wire::Static(0)]);
        assert!(a.same_qubits(&b));
    }
}
