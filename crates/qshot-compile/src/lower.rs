//! Lowering of a legalized program to QIS form.

use qshot_ir::qis::{self, OutputTag};
use qshot_ir::{
    BasicBlock, Constant, Function, Global, Instruction, InstructionKind, IrModule, MetadataItem,
    MetadataNode, NamedMetadata, Operand, Param, Type, Value,
};
use qshot_profile::profile::{QIS_PREFIX, RT_PREFIX, runtime_function};
use qshot_profile::schema::{qir_label, qir_record_kind};
use qshot_profile::OutputKind;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::error::{CompilationError, CompileResult};
use crate::program::{GateCall, GateKind, Op, Program, ProgramFunction, Wire};
use crate::target::CompilationTarget;

/// Generator string recorded in the compilation marker.
pub(crate) fn generator() -> String {
    format!("qshot-compile {}", env!("CARGO_PKG_VERSION"))
}

/// Turn a legalized program into a QIS module.
pub(crate) fn lower(program: Program, target: &CompilationTarget) -> CompileResult<IrModule> {
    let (mut ir, functions) = program.into_parts();
    let bodies: FxHashMap<&str, &ProgramFunction> =
        functions.iter().map(|f| (f.name.as_str(), f)).collect();

    let mut tags = TagTable::default();
    let mut used: FxHashSet<&'static str> = FxHashSet::default();
    let mut lowered: Vec<(usize, Vec<Param>, Vec<BasicBlock>)> = Vec::new();
    {
        let labels = ir.string_globals();
        for (index, function) in ir.functions.iter().enumerate() {
            let Some(body) = bodies.get(function.name.as_str()) else {
                continue;
            };
            let entry = ir.is_entry_point(function);
            let mut lowerer = FunctionLowerer::new(function, &target.target, &labels);
            let blocks = lowerer.lower(body, &mut tags)?;
            used.extend(lowerer.used);
            let params = if entry {
                function.params.clone()
            } else {
                index_params(function)
            };
            lowered.push((index, params, blocks));
        }
    }

    for (index, params, blocks) in lowered {
        let function = &mut ir.functions[index];
        function.params = params;
        function.blocks = blocks;
    }

    ir.functions.retain(|f| {
        !(f.is_declaration() && (f.name.starts_with(QIS_PREFIX) || f.name.starts_with(RT_PREFIX)))
    });
    for name in qis::ALL_FUNCTIONS {
        if used.contains(name) && ir.function(name).is_none() {
            if let Some((ret, params)) = qis::signature(name) {
                ir.functions.push(Function::declaration(*name, ret, params));
            }
        }
    }

    let referenced = referenced_globals(&ir);
    let stale: FxHashSet<String> = tags
        .label_globals
        .iter()
        .filter(|g| !referenced.contains(g.as_str()))
        .cloned()
        .collect();
    ir.globals.retain(|g| !stale.contains(&g.name));
    ir.globals.extend(tags.globals);

    let id = ir.next_metadata_id();
    ir.metadata.push(MetadataNode {
        id,
        distinct: false,
        items: vec![
            MetadataItem::Str(target.target.clone()),
            MetadataItem::Value(Type::Int(32), Constant::Int(i64::from(target.opt_level))),
            MetadataItem::Str(generator()),
        ],
    });
    ir.named_metadata.push(NamedMetadata {
        name: qis::TARGET_METADATA.to_string(),
        nodes: vec![id],
    });

    debug!(
        qis_functions = used.len(),
        tags = tags.by_text.len(),
        "Lowered program to QIS"
    );
    Ok(ir)
}

/// Pointer parameters become `i64` indices.
fn index_params(function: &Function) -> Vec<Param> {
    function
        .params
        .iter()
        .map(|p| {
            if p.ty.is_pointer() {
                Param {
                    ty: Type::i64(),
                    attrs: Vec::new(),
                    name: p.name.clone(),
                }
            } else {
                p.clone()
            }
        })
        .collect()
}

/// Output tag globals, shared across functions.
#[derive(Default)]
struct TagTable {
    by_text: FxHashMap<String, String>,
    globals: Vec<Global>,
    /// QIR label globals the tags replace.
    label_globals: FxHashSet<String>,
}

impl TagTable {
    /// Global holding the encoded tag, and the tag's text length.
    fn intern(&mut self, tag: &OutputTag) -> CompileResult<(String, i64)> {
        let text = tag.to_string();
        let bytes = tag.encode().ok_or_else(|| CompilationError::LabelTooLong {
            tag: text.clone(),
            len: text.len(),
        })?;
        #[allow(clippy::cast_possible_wrap)]
        let len = text.len() as i64;
        if let Some(name) = self.by_text.get(&text) {
            return Ok((name.clone(), len));
        }
        let name = format!("tag.{}", self.globals.len());
        self.globals.push(Global::byte_string(name.clone(), bytes));
        self.by_text.insert(text, name.clone());
        Ok((name, len))
    }
}

struct FunctionLowerer<'a> {
    function: &'a Function,
    target: &'a str,
    labels: &'a FxHashMap<&'a str, &'a str>,
    pointer_params: FxHashSet<String>,
    taken: FxHashSet<String>,
    next_temp: usize,
    used: FxHashSet<&'static str>,
}

impl<'a> FunctionLowerer<'a> {
    fn new(function: &'a Function, target: &'a str, labels: &'a FxHashMap<&'a str, &'a str>) -> Self {
        let pointer_params = function
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.ty.is_pointer())
            .map(|(i, p)| p.name.clone().unwrap_or_else(|| i.to_string()))
            .collect();
        let taken = function
            .params
            .iter()
            .filter_map(|p| p.name.clone())
            .chain(function.instructions().filter_map(|i| i.result.clone()))
            .collect();
        Self {
            function,
            target,
            labels,
            pointer_params,
            taken,
            next_temp: 0,
            used: FxHashSet::default(),
        }
    }

    fn unsupported(&self, construct: String) -> CompilationError {
        CompilationError::Unsupported {
            construct: format!("{construct} in @{}", self.function.name),
            target: self.target.to_string(),
        }
    }

    fn fresh(&mut self) -> String {
        loop {
            let name = format!("rr.{}", self.next_temp);
            self.next_temp += 1;
            if self.taken.insert(name.clone()) {
                return name;
            }
        }
    }

    fn call(&mut self, result: Option<String>, callee: &'static str, args: Vec<Operand>) -> Instruction {
        self.used.insert(callee);
        let ret_ty = qis::signature(callee).map_or(Type::Void, |(ret, _)| ret);
        Instruction {
            result,
            kind: InstructionKind::Call {
                tail: None,
                ret_attrs: Vec::new(),
                ret_ty,
                callee: callee.to_string(),
                args,
                attr_groups: Vec::new(),
            },
        }
    }

    fn index(&self, wire: &Wire) -> CompileResult<Operand> {
        if let Wire::Local(name) = wire {
            if !self.pointer_params.contains(name) {
                return Err(self.unsupported(format!("dynamic qubit or result operand %{name}")));
            }
        }
        Ok(wire.to_index_operand())
    }

    fn wire_of(&self, operand: Option<&Operand>, what: &str) -> CompileResult<Operand> {
        let wire = operand
            .and_then(|a| Wire::from_value(&a.value))
            .ok_or_else(|| self.unsupported(format!("{what} operand")))?;
        self.index(&wire)
    }

    fn lower(&mut self, body: &ProgramFunction, tags: &mut TagTable) -> CompileResult<Vec<BasicBlock>> {
        let mut blocks = Vec::with_capacity(body.blocks.len());
        for block in &body.blocks {
            let mut out = Vec::with_capacity(block.ops.len());
            for op in &block.ops {
                match op {
                    Op::Gate(gate) => self.lower_gate(gate, &mut out)?,
                    Op::Inst(inst) => self.lower_inst(inst, tags, &mut out)?,
                }
            }
            blocks.push(BasicBlock {
                label: block.label.clone(),
                instructions: out,
            });
        }
        Ok(blocks)
    }

    fn lower_gate(&mut self, gate: &GateCall, out: &mut Vec<Instruction>) -> CompileResult<()> {
        let angle = |i: usize| Operand::new(Type::Double, gate.angles[i].clone());
        let qubits = gate
            .qubits
            .iter()
            .map(|w| self.index(w))
            .collect::<CompileResult<Vec<_>>>()?;
        let result = gate.result.as_ref().map(|w| self.index(w)).transpose()?;

        let measure = |this: &mut Self, out: &mut Vec<Instruction>| -> CompileResult<()> {
            let result = result
                .clone()
                .ok_or_else(|| this.unsupported(format!("'{gate}' without a result")))?;
            let inst = this.call(None, qis::LAZY_MEASURE, vec![qubits[0].clone(), result]);
            out.push(inst);
            Ok(())
        };

        match gate.kind {
            GateKind::Rxy => {
                let inst = self.call(None, qis::RXY, vec![angle(0), angle(1), qubits[0].clone()]);
                out.push(inst);
            }
            GateKind::Rz => {
                let inst = self.call(None, qis::RZ, vec![angle(0), qubits[0].clone()]);
                out.push(inst);
            }
            GateKind::Rzz => {
                let inst = self.call(
                    None,
                    qis::RZZ,
                    vec![angle(0), qubits[0].clone(), qubits[1].clone()],
                );
                out.push(inst);
            }
            GateKind::Cz => {
                let inst = self.call(None, qis::CZ, vec![qubits[0].clone(), qubits[1].clone()]);
                out.push(inst);
            }
            GateKind::Mz => measure(self, out)?,
            GateKind::MResetZ => {
                measure(self, out)?;
                let inst = self.call(None, qis::RESET, vec![qubits[0].clone()]);
                out.push(inst);
            }
            GateKind::Reset => {
                let inst = self.call(None, qis::RESET, vec![qubits[0].clone()]);
                out.push(inst);
            }
            other => {
                return Err(CompilationError::PassFailed {
                    pass: "Lower".into(),
                    message: format!("gate '{other}' was not legalized"),
                });
            }
        }
        Ok(())
    }

    fn lower_inst(
        &mut self,
        inst: &Instruction,
        tags: &mut TagTable,
        out: &mut Vec<Instruction>,
    ) -> CompileResult<()> {
        let InstructionKind::Call { callee, args, .. } = &inst.kind else {
            out.push(inst.clone());
            return Ok(());
        };

        if let Some(name) = runtime_function(callee) {
            if name == "initialize" {
                return Ok(());
            }
            if name == "read_result" {
                let result = self.wire_of(args.first(), "result")?;
                let call = self.call(inst.result.clone(), qis::READ_RESULT, vec![result]);
                out.push(call);
                return Ok(());
            }
            let Some(kind) = qir_record_kind(name, args) else {
                return Err(self.unsupported(format!("runtime function @{callee}")));
            };
            return self.lower_record(kind, callee, args, tags, out);
        }

        // Calls into IR-defined functions pass qubits and results as indices.
        let mut call = inst.clone();
        if let InstructionKind::Call { args, .. } = &mut call.kind {
            for arg in args.iter_mut().filter(|a| a.ty.is_pointer()) {
                if let Some(wire) = Wire::from_value(&arg.value) {
                    *arg = self.index(&wire)?;
                }
            }
        }
        out.push(call);
        Ok(())
    }

    fn lower_record(
        &mut self,
        kind: OutputKind,
        callee: &str,
        args: &[Operand],
        tags: &mut TagTable,
        out: &mut Vec<Instruction>,
    ) -> CompileResult<()> {
        let label_arg = args
            .get(1)
            .ok_or_else(|| self.unsupported(format!("@{callee} without a label")))?;
        let label = qir_label(label_arg, self.labels)
            .map_err(|found| self.unsupported(format!("output label {found}")))?;
        if let Some(global) = label_arg.value.global_name() {
            tags.label_globals.insert(global.to_string());
        }
        let (tag_global, len) =
            tags.intern(&OutputTag::new(kind.tag_kind(), label.unwrap_or_default()))?;
        let tag = Operand::new(Type::ptr(), Value::Const(Constant::Global(tag_global)));
        let len = Operand::new(Type::i64(), Value::int(len));

        let value = args
            .first()
            .ok_or_else(|| self.unsupported(format!("@{callee} without a value")))?;
        let (printer, value) = match kind {
            OutputKind::Result { .. } => {
                let result = self.wire_of(Some(value), "result")?;
                let temp = self.fresh();
                let read = self.call(Some(temp.clone()), qis::READ_RESULT, vec![result]);
                out.push(read);
                (qis::PRINT_BOOL, Operand::new(Type::i1(), Value::Local(temp)))
            }
            OutputKind::Bool => (qis::PRINT_BOOL, Operand::new(Type::i1(), value.value.clone())),
            OutputKind::Double => (
                qis::PRINT_FLOAT,
                Operand::new(Type::Double, value.value.clone()),
            ),
            OutputKind::Int | OutputKind::Array { .. } | OutputKind::Tuple { .. } => {
                (qis::PRINT_INT, Operand::new(Type::i64(), value.value.clone()))
            }
        };
        let print = self.call(None, printer, vec![tag, len, value]);
        out.push(print);
        Ok(())
    }
}

/// Names of all globals referenced from function bodies.
fn referenced_globals(ir: &IrModule) -> FxHashSet<&str> {
    let mut names = FxHashSet::default();
    for inst in ir.functions.iter().flat_map(Function::instructions) {
        let values: Vec<&Value> = match &inst.kind {
            InstructionKind::Call { args, .. } => args.iter().map(|a| &a.value).collect(),
            InstructionKind::Ret(Some(op)) | InstructionKind::Cast { value: op, .. } => {
                vec![&op.value]
            }
            InstructionKind::Binary { lhs, rhs, .. }
            | InstructionKind::ICmp { lhs, rhs, .. }
            | InstructionKind::FCmp { lhs, rhs, .. } => vec![lhs, rhs],
            InstructionKind::Select {
                cond,
                if_true,
                if_false,
            } => vec![&cond.value, &if_true.value, &if_false.value],
            InstructionKind::Phi { incoming, .. } => incoming.iter().map(|(v, _)| v).collect(),
            InstructionKind::CondBr { cond, .. } => vec![cond],
            InstructionKind::Opaque { body, .. } => {
                // Opaque bodies are kept as text.
                for global in &ir.globals {
                    if body.contains(&format!("@{}", global.name)) {
                        names.insert(global.name.as_str());
                    }
                }
                Vec::new()
            }
            InstructionKind::Ret(None) | InstructionKind::Br { .. } | InstructionKind::Unreachable => {
                Vec::new()
            }
        };
        names.extend(values.into_iter().filter_map(Value::global_name));
    }
    names
}
