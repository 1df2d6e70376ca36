//! QIS interpreter: walks the entry point and drives the statevector.

use qshot_exec::{RawShotPayload, RawValue};
use qshot_ir::qis;
use qshot_ir::{
    BasicBlock, BinaryOp, CastOp, Constant, FloatPredicate, Function, Initializer, Instruction,
    InstructionKind, IntPredicate, IrModule, Operand, Type, Value,
};
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;

use crate::error::{Fault, FaultResult};
use crate::statevector::Statevector;

/// Execution bounds for one shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_steps: u64,
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            max_call_depth: 64,
        }
    }
}

/// A runtime value. Integers are kept sign-extended from their width.
#[derive(Debug, Clone, PartialEq)]
enum Val {
    Int(i64),
    Float(f64),
    Global(String),
}

fn sext(v: i64, width: u32) -> i64 {
    if width >= 64 {
        v
    } else {
        let shift = 64 - width;
        (v << shift) >> shift
    }
}

fn zext(v: i64, width: u32) -> u64 {
    #[allow(clippy::cast_sign_loss)]
    let bits = v as u64;
    if width >= 64 {
        bits
    } else {
        bits & ((1u64 << width) - 1)
    }
}

fn width(ty: &Type) -> u32 {
    ty.int_width().unwrap_or(64)
}

fn flag(b: bool) -> Val {
    Val::Int(sext(i64::from(b), 1))
}

impl Val {
    fn int(&self) -> FaultResult<i64> {
        match self {
            Self::Int(v) => Ok(*v),
            other => Err(Fault::TypeMismatch(format!("expected an integer, found {other:?}"))),
        }
    }

    fn float(&self) -> FaultResult<f64> {
        match self {
            Self::Float(v) => Ok(*v),
            other => Err(Fault::TypeMismatch(format!("expected a double, found {other:?}"))),
        }
    }
}

type Frame = FxHashMap<String, Val>;

enum Flow<'m> {
    Jump(&'m str),
    Return,
}

/// One shot's worth of machine state.
pub(crate) struct Machine<'m, R> {
    ir: &'m IrModule,
    state: Statevector,
    results: Vec<bool>,
    /// Drives measurement and reset.
    rng: R,
    /// Behind the `___random_*` calls; reseeding it leaves measurement alone.
    program_rng: R,
    shot: u64,
    payload: RawShotPayload,
    steps: u64,
    limits: Limits,
}

impl<'m, R: Rng + SeedableRng> Machine<'m, R> {
    pub(crate) fn new(
        ir: &'m IrModule,
        num_qubits: usize,
        num_results: usize,
        shot: u64,
        mut rng: R,
        limits: Limits,
    ) -> Self {
        let mut seed = R::Seed::default();
        rng.fill_bytes(seed.as_mut());
        Self {
            ir,
            state: Statevector::new(num_qubits),
            results: vec![false; num_results],
            rng,
            program_rng: R::from_seed(seed),
            shot,
            payload: RawShotPayload::new(),
            steps: 0,
            limits,
        }
    }

    /// Run `entry` to completion and return what it printed.
    pub(crate) fn run(mut self, entry: &'m Function) -> FaultResult<RawShotPayload> {
        self.call(entry, Vec::new(), 0)?;
        Ok(self.payload)
    }

    fn call(&mut self, function: &'m Function, args: Vec<Val>, depth: usize) -> FaultResult<()> {
        if depth > self.limits.max_call_depth {
            return Err(Fault::CallDepth(self.limits.max_call_depth));
        }
        let mut frame: Frame = function
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| p.name.clone().unwrap_or_else(|| i.to_string()))
            .zip(args)
            .collect();

        let Some(mut block) = function.blocks.first() else {
            return Ok(());
        };
        let mut pred: Option<&'m str> = None;
        loop {
            match self.run_block(function, block, pred, &mut frame, depth)? {
                Flow::Return => return Ok(()),
                Flow::Jump(dest) => {
                    pred = Some(block.label.as_str());
                    block = function.block(dest).ok_or_else(|| Fault::MissingBlock {
                        function: function.name.clone(),
                        block: dest.to_string(),
                    })?;
                }
            }
        }
    }

    fn run_block(
        &mut self,
        function: &'m Function,
        block: &'m BasicBlock,
        pred: Option<&str>,
        frame: &mut Frame,
        depth: usize,
    ) -> FaultResult<Flow<'m>> {
        // Leading phis read their inputs before any of them is assigned.
        let phis = block
            .instructions
            .iter()
            .take_while(|i| matches!(i.kind, InstructionKind::Phi { .. }))
            .count();
        let mut assigned = Vec::with_capacity(phis);
        for inst in &block.instructions[..phis] {
            self.tick()?;
            if let InstructionKind::Phi { ty, incoming } = &inst.kind {
                let value = incoming
                    .iter()
                    .find(|(_, label)| Some(label.as_str()) == pred)
                    .map(|(v, _)| v)
                    .ok_or_else(|| {
                        Fault::Unsupported(format!(
                            "phi in %{} without an entry for its predecessor",
                            block.label
                        ))
                    })?;
                assigned.push((inst.result.clone(), eval(frame, value, ty)?));
            }
        }
        for (name, value) in assigned {
            if let Some(name) = name {
                frame.insert(name, value);
            }
        }

        for inst in &block.instructions[phis..] {
            self.tick()?;
            match &inst.kind {
                InstructionKind::Br { dest } => return Ok(Flow::Jump(dest)),
                InstructionKind::CondBr {
                    cond,
                    if_true,
                    if_false,
                } => {
                    let taken = eval(frame, cond, &Type::i1())?.int()? != 0;
                    return Ok(Flow::Jump(if taken { if_true } else { if_false }));
                }
                InstructionKind::Ret(_) => return Ok(Flow::Return),
                InstructionKind::Unreachable => return Err(Fault::Unreachable),
                _ => {
                    if let Some(value) = self.step(inst, frame, depth)? {
                        if let Some(name) = &inst.result {
                            frame.insert(name.clone(), value);
                        }
                    }
                }
            }
        }
        Err(Fault::Unsupported(format!(
            "block %{} in @{} has no terminator",
            block.label, function.name
        )))
    }

    fn tick(&mut self) -> FaultResult<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(Fault::StepLimit(self.limits.max_steps));
        }
        Ok(())
    }

    /// Execute a non-terminator instruction.
    fn step(&mut self, inst: &'m Instruction, frame: &Frame, depth: usize) -> FaultResult<Option<Val>> {
        let value = match &inst.kind {
            InstructionKind::Call { callee, args, .. } => return self.dispatch(callee, args, frame, depth),
            InstructionKind::Binary { op, ty, lhs, rhs, .. } => {
                binary(*op, ty, &eval(frame, lhs, ty)?, &eval(frame, rhs, ty)?)?
            }
            InstructionKind::ICmp { pred, ty, lhs, rhs } => {
                icmp(*pred, ty, &eval(frame, lhs, ty)?, &eval(frame, rhs, ty)?)?
            }
            InstructionKind::FCmp { pred, ty, lhs, rhs, .. } => {
                let a = eval(frame, lhs, ty)?.float()?;
                let b = eval(frame, rhs, ty)?.float()?;
                flag(fcmp(*pred, a, b))
            }
            InstructionKind::Cast { op, value, to } => {
                cast(*op, &value.ty, to, eval(frame, &value.value, &value.ty)?)?
            }
            InstructionKind::Select {
                cond,
                if_true,
                if_false,
            } => {
                let chosen = if operand(frame, cond)?.int()? != 0 {
                    if_true
                } else {
                    if_false
                };
                operand(frame, chosen)?
            }
            InstructionKind::Phi { .. } => {
                return Err(Fault::Unsupported("phi after a non-phi instruction".into()));
            }
            InstructionKind::Opaque { opcode, .. } => return Err(Fault::Unsupported(opcode.clone())),
            other => return Err(Fault::Unsupported(format!("{other:?}"))),
        };
        Ok(Some(value))
    }

    fn dispatch(
        &mut self,
        callee: &str,
        args: &[Operand],
        frame: &Frame,
        depth: usize,
    ) -> FaultResult<Option<Val>> {
        let arg = |i: usize| -> FaultResult<Val> {
            let operand_ref = args
                .get(i)
                .ok_or_else(|| Fault::TypeMismatch(format!("@{callee} is missing argument {i}")))?;
            operand(frame, operand_ref)
        };

        match callee {
            qis::RXY => {
                let (theta, phi) = (arg(0)?.float()?, arg(1)?.float()?);
                let q = self.qubit(&arg(2)?)?;
                self.state.apply_rxy(q, theta, phi);
            }
            qis::RZ => {
                let theta = arg(0)?.float()?;
                let q = self.qubit(&arg(1)?)?;
                self.state.apply_rz(q, theta);
            }
            qis::RZZ => {
                let theta = arg(0)?.float()?;
                let (a, b) = (self.qubit(&arg(1)?)?, self.qubit(&arg(2)?)?);
                self.state.apply_rzz(a, b, theta);
            }
            qis::CZ => {
                let (a, b) = (self.qubit(&arg(0)?)?, self.qubit(&arg(1)?)?);
                self.state.apply_cz(a, b);
            }
            qis::LAZY_MEASURE => {
                let q = self.qubit(&arg(0)?)?;
                let r = self.result(&arg(1)?)?;
                self.results[r] = self.state.measure(q, &mut self.rng);
            }
            qis::RESET => {
                let q = self.qubit(&arg(0)?)?;
                self.state.reset(q, &mut self.rng);
            }
            qis::READ_RESULT => {
                let r = self.result(&arg(0)?)?;
                return Ok(Some(flag(self.results[r])));
            }
            qis::PRINT_BOOL | qis::PRINT_INT | qis::PRINT_FLOAT => {
                let tag = self.tag(&arg(0)?)?;
                let value = arg(2)?;
                let value = match callee {
                    qis::PRINT_BOOL => RawValue::Bool(value.int()? != 0),
                    qis::PRINT_INT => RawValue::Int(value.int()?),
                    _ => RawValue::Float(value.float()?),
                };
                self.payload.push(tag, value);
            }
            qis::GET_CURRENT_SHOT => {
                return Ok(Some(Val::Int(i64::try_from(self.shot).unwrap_or(i64::MAX))));
            }
            qis::RANDOM_SEED => {
                self.program_rng = R::seed_from_u64(zext(arg(0)?.int()?, 64));
            }
            qis::RANDOM_INT => {
                let value = i64::from(self.program_rng.next_u32());
                return Ok(Some(Val::Int(sext(value, 32))));
            }
            qis::RANDOM_FLOAT => {
                return Ok(Some(Val::Float(self.program_rng.r#gen::<f64>())));
            }
            qis::RANDOM_INT_BOUNDED => {
                let bound = u32::try_from(zext(arg(0)?.int()?, 32)).unwrap_or(u32::MAX);
                if bound == 0 {
                    return Err(Fault::InvalidArgument {
                        function: callee.to_string(),
                        message: "bound must be positive".into(),
                    });
                }
                let value = i64::from(self.program_rng.gen_range(0..bound));
                return Ok(Some(Val::Int(sext(value, 32))));
            }
            qis::RANDOM_ADVANCE => {
                for _ in 0..zext(arg(0)?.int()?, 64) {
                    self.tick()?;
                    self.program_rng.next_u32();
                }
            }
            _ => {
                let ir = self.ir;
                let function = ir
                    .function(callee)
                    .filter(|f| !f.is_declaration())
                    .ok_or_else(|| Fault::Unsupported(format!("call to @{callee}")))?;
                let values = (0..args.len()).map(arg).collect::<FaultResult<Vec<_>>>()?;
                self.call(function, values, depth + 1)?;
            }
        }
        Ok(None)
    }

    fn qubit(&self, value: &Val) -> FaultResult<usize> {
        let index = value.int()?;
        let available = self.state.num_qubits();
        usize::try_from(index)
            .ok()
            .filter(|q| *q < available)
            .ok_or(Fault::QubitOutOfRange { index, available })
    }

    fn result(&self, value: &Val) -> FaultResult<usize> {
        let index = value.int()?;
        let available = self.results.len();
        usize::try_from(index)
            .ok()
            .filter(|r| *r < available)
            .ok_or(Fault::ResultOutOfRange { index, available })
    }

    /// Text of a length-prefixed tag global.
    fn tag(&self, value: &Val) -> FaultResult<String> {
        let not_a_tag = || Fault::TypeMismatch(format!("{value:?} is not an output tag"));
        let Val::Global(name) = value else {
            return Err(not_a_tag());
        };
        let Some(Initializer::Bytes(bytes)) = self.ir.global(name).and_then(|g| g.initializer.as_ref())
        else {
            return Err(not_a_tag());
        };
        let (&len, rest) = bytes.split_first().ok_or_else(not_a_tag)?;
        rest.get(..usize::from(len))
            .and_then(|text| std::str::from_utf8(text).ok())
            .map(str::to_string)
            .ok_or_else(not_a_tag)
    }
}

fn operand(frame: &Frame, operand: &Operand) -> FaultResult<Val> {
    eval(frame, &operand.value, &operand.ty)
}

fn eval(frame: &Frame, value: &Value, ty: &Type) -> FaultResult<Val> {
    let int = |v: i64| Val::Int(sext(v, width(ty)));
    match value {
        Value::Local(name) => frame
            .get(name)
            .cloned()
            .ok_or_else(|| Fault::UndefinedValue(name.clone())),
        Value::Const(constant) => Ok(match constant {
            Constant::Int(v) => int(*v),
            Constant::Bool(b) => int(i64::from(*b)),
            Constant::Float(v) => Val::Float(*v),
            Constant::Null => Val::Int(0),
            Constant::IntToPtr { value, .. } => Val::Int(*value),
            Constant::Undef | Constant::Poison | Constant::ZeroInit => {
                if ty.is_float() {
                    Val::Float(0.0)
                } else {
                    Val::Int(0)
                }
            }
            Constant::Global(name) | Constant::GetElementPtr { base: name, .. } => {
                Val::Global(name.clone())
            }
        }),
    }
}

#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
fn binary(op: BinaryOp, ty: &Type, lhs: &Val, rhs: &Val) -> FaultResult<Val> {
    if op.is_float() {
        let (a, b) = (lhs.float()?, rhs.float()?);
        return Ok(Val::Float(match op {
            BinaryOp::FAdd => a + b,
            BinaryOp::FSub => a - b,
            BinaryOp::FMul => a * b,
            BinaryOp::FDiv => a / b,
            _ => a % b,
        }));
    }
    let w = width(ty);
    let (a, b) = (lhs.int()?, rhs.int()?);
    let (ua, ub) = (zext(a, w), zext(b, w));
    let nonzero = |v: u64| if v == 0 { Err(Fault::DivisionByZero) } else { Ok(v) };
    let result = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::UDiv => (ua / nonzero(ub)?) as i64,
        BinaryOp::URem => (ua % nonzero(ub)?) as i64,
        BinaryOp::SDiv => {
            nonzero(ub)?;
            a.wrapping_div(b)
        }
        BinaryOp::SRem => {
            nonzero(ub)?;
            a.wrapping_rem(b)
        }
        BinaryOp::Shl => a.wrapping_shl(ub as u32),
        BinaryOp::LShr => (ua.wrapping_shr(ub as u32)) as i64,
        BinaryOp::AShr => a.wrapping_shr(ub as u32),
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::FAdd | BinaryOp::FSub | BinaryOp::FMul | BinaryOp::FDiv | BinaryOp::FRem => {
            return Err(Fault::TypeMismatch(format!("{op} on integers")));
        }
    };
    Ok(Val::Int(sext(result, w)))
}

fn icmp(pred: IntPredicate, ty: &Type, lhs: &Val, rhs: &Val) -> FaultResult<Val> {
    // Pointers to globals only compare for equality.
    if let (Val::Global(_), _) | (_, Val::Global(_)) = (lhs, rhs) {
        return match pred {
            IntPredicate::Eq => Ok(flag(lhs == rhs)),
            IntPredicate::Ne => Ok(flag(lhs != rhs)),
            _ => Err(Fault::TypeMismatch(format!("icmp {pred} on global pointers"))),
        };
    }
    let w = width(ty);
    let (a, b) = (lhs.int()?, rhs.int()?);
    let (ua, ub) = (zext(a, w), zext(b, w));
    Ok(flag(match pred {
        IntPredicate::Eq => a == b,
        IntPredicate::Ne => a != b,
        IntPredicate::Ugt => ua > ub,
        IntPredicate::Uge => ua >= ub,
        IntPredicate::Ult => ua < ub,
        IntPredicate::Ule => ua <= ub,
        IntPredicate::Sgt => a > b,
        IntPredicate::Sge => a >= b,
        IntPredicate::Slt => a < b,
        IntPredicate::Sle => a <= b,
    }))
}

fn fcmp(pred: FloatPredicate, a: f64, b: f64) -> bool {
    let ordered = !a.is_nan() && !b.is_nan();
    match pred {
        FloatPredicate::False => false,
        FloatPredicate::True => true,
        FloatPredicate::Ord => ordered,
        FloatPredicate::Uno => !ordered,
        FloatPredicate::Oeq => ordered && a == b,
        FloatPredicate::Ogt => ordered && a > b,
        FloatPredicate::Oge => ordered && a >= b,
        FloatPredicate::Olt => ordered && a < b,
        FloatPredicate::Ole => ordered && a <= b,
        FloatPredicate::One => ordered && a != b,
        FloatPredicate::Ueq => !ordered || a == b,
        FloatPredicate::Ugt => !ordered || a > b,
        FloatPredicate::Uge => !ordered || a >= b,
        FloatPredicate::Ult => !ordered || a < b,
        FloatPredicate::Ule => !ordered || a <= b,
        FloatPredicate::Une => !ordered || a != b,
    }
}

#[allow(
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn cast(op: CastOp, from: &Type, to: &Type, value: Val) -> FaultResult<Val> {
    let to_w = width(to);
    Ok(match op {
        CastOp::Trunc | CastOp::SExt => Val::Int(sext(value.int()?, to_w)),
        CastOp::ZExt => Val::Int(sext(zext(value.int()?, width(from)) as i64, to_w)),
        CastOp::FPTrunc => {
            let v = value.float()?;
            Val::Float(if *to == Type::Float { f64::from(v as f32) } else { v })
        }
        CastOp::FPExt => Val::Float(value.float()?),
        CastOp::FPToSI => Val::Int(sext(value.float()? as i64, to_w)),
        CastOp::FPToUI => Val::Int(sext(value.float()? as u64 as i64, to_w)),
        CastOp::SIToFP => Val::Float(value.int()? as f64),
        CastOp::UIToFP => Val::Float(zext(value.int()?, width(from)) as f64),
        CastOp::PtrToInt => Val::Int(sext(value.int()?, to_w)),
        CastOp::IntToPtr | CastOp::BitCast => value,
    })
}
