//! Peephole optimizations over native gates.
//!
//! Gates are only combined with the previous gate on exactly the same
//! qubits, inside one basic block. Any other instruction (a call, a record,
//! a branch) is a barrier for every qubit.

use std::f64::consts::TAU;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{CompilationError, CompileResult};
use crate::pass::{Pass, PassContext, PassKind};
use crate::program::{GateCall, GateKind, Op, Program, Wire};

/// Tolerance for angle comparisons.
const EPSILON: f64 = 1e-10;

/// Rounds a fixpoint group may take before giving up.
const MAX_ROUNDS: usize = 16;

/// Whether an angle is a multiple of 2π, where every native rotation is the
/// identity up to global phase.
fn is_trivial(angle: f64) -> bool {
    let r = angle.rem_euclid(TAU);
    r < EPSILON || TAU - r < EPSILON
}

/// Removes rotations by a multiple of 2π.
pub struct RemoveTrivialRotations;

impl Pass for RemoveTrivialRotations {
    fn name(&self) -> &'static str {
        "RemoveTrivialRotations"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, program: &mut Program, context: &mut PassContext) -> CompileResult<()> {
        let mut removed = 0;
        for function in program.functions_mut() {
            for block in &mut function.blocks {
                let before = block.ops.len();
                block.ops.retain(|op| {
                    !matches!(op, Op::Gate(g)
                        if matches!(g.kind, GateKind::Rxy | GateKind::Rz | GateKind::Rzz)
                            && g.angle(0).is_some_and(is_trivial))
                });
                removed += before - block.ops.len();
            }
        }
        debug!(removed, "Removed trivial rotations");
        context.stats.gates_removed += removed;
        Ok(())
    }
}

/// What to do with two adjacent gates on the same qubits.
enum Fold {
    /// Replace the pair with one gate.
    Merge(GateCall),
    /// The pair is the identity.
    Cancel,
}

/// Merged and cancelled pair counts.
#[derive(Default, Clone, Copy)]
struct Folded {
    merged: usize,
    cancelled: usize,
}

/// Combine adjacent gate pairs in one block.
fn fold_adjacent(
    ops: &mut Vec<Op>,
    fold: impl Fn(&GateCall, &GateCall) -> Option<Fold>,
) -> Folded {
    let mut slots: Vec<Option<Op>> = ops.drain(..).map(Some).collect();
    let mut last: FxHashMap<Wire, usize> = FxHashMap::default();
    let mut folded = Folded::default();

    for i in 0..slots.len() {
        let Some(Op::Gate(gate)) = slots[i].clone() else {
            last.clear();
            continue;
        };

        // Parameter wires may alias each other and any fixed index.
        if gate.qubits.iter().any(|w| matches!(w, Wire::Local(_))) {
            last.retain(|w, _| gate.qubits.contains(w));
        } else {
            last.retain(|w, _| matches!(w, Wire::Static(_)));
        }

        let previous = gate
            .qubits
            .iter()
            .map(|w| last.get(w).copied())
            .reduce(|a, b| if a == b { a } else { None })
            .flatten();

        if let Some(j) = previous {
            if let Some(Op::Gate(prev)) = &slots[j] {
                if prev.same_qubits(&gate) {
                    match fold(prev, &gate) {
                        Some(Fold::Merge(merged)) => {
                            slots[j] = Some(Op::Gate(merged));
                            slots[i] = None;
                            folded.merged += 1;
                            continue;
                        }
                        Some(Fold::Cancel) => {
                            slots[j] = None;
                            slots[i] = None;
                            for w in &gate.qubits {
                                last.remove(w);
                            }
                            folded.cancelled += 1;
                            continue;
                        }
                        None => {}
                    }
                }
            }
        }

        for w in &gate.qubits {
            last.insert(w.clone(), i);
        }
    }

    *ops = slots.into_iter().flatten().collect();
    folded
}

fn run_folds(
    program: &mut Program,
    fold: impl Fn(&GateCall, &GateCall) -> Option<Fold> + Copy,
) -> Folded {
    let mut total = Folded::default();
    for function in program.functions_mut() {
        for block in &mut function.blocks {
            let folded = fold_adjacent(&mut block.ops, fold);
            total.merged += folded.merged;
            total.cancelled += folded.cancelled;
        }
    }
    total
}

/// Cancels adjacent pairs of self-inverse gates.
pub struct CancelSelfInverse;

impl Pass for CancelSelfInverse {
    fn name(&self) -> &'static str {
        "CancelSelfInverse"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, program: &mut Program, context: &mut PassContext) -> CompileResult<()> {
        let folded = run_folds(program, |a, b| {
            (a.kind == GateKind::Cz && b.kind == GateKind::Cz).then_some(Fold::Cancel)
        });
        debug!(cancelled = folded.cancelled, "Cancelled self-inverse pairs");
        context.stats.gates_removed += 2 * folded.cancelled;
        Ok(())
    }

    fn should_run(&self, _program: &Program, context: &PassContext) -> bool {
        context.target.is_native(GateKind::Cz)
    }
}

/// Folds adjacent rotations about the same axis into one.
pub struct MergeRotations;

impl MergeRotations {
    fn fold(a: &GateCall, b: &GateCall) -> Option<Fold> {
        if a.kind != b.kind {
            return None;
        }
        let sum = a.angle(0)? + b.angle(0)?;
        let merged = match a.kind {
            GateKind::Rz | GateKind::Rzz => GateCall::new(a.kind, &[sum], a.qubits.clone()),
            GateKind::Rxy => {
                let phi = a.angle(1)?;
                if (phi - b.angle(1)?).abs() > EPSILON {
                    return None;
                }
                GateCall::new(GateKind::Rxy, &[sum, phi], a.qubits.clone())
            }
            _ => return None,
        };
        Some(if is_trivial(sum) {
            Fold::Cancel
        } else {
            Fold::Merge(merged)
        })
    }
}

impl Pass for MergeRotations {
    fn name(&self) -> &'static str {
        "MergeRotations"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, program: &mut Program, context: &mut PassContext) -> CompileResult<()> {
        let folded = run_folds(program, Self::fold);
        debug!(
            merged = folded.merged,
            cancelled = folded.cancelled,
            "Merged rotations"
        );
        context.stats.gates_merged += folded.merged;
        context.stats.gates_removed += 2 * folded.cancelled;
        Ok(())
    }
}

/// Repeats a group of passes until the program stops changing.
pub struct Fixpoint {
    passes: Vec<Box<dyn Pass>>,
}

impl Fixpoint {
    pub fn new(passes: Vec<Box<dyn Pass>>) -> Self {
        Self { passes }
    }
}

impl Pass for Fixpoint {
    fn name(&self) -> &'static str {
        "Fixpoint"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, program: &mut Program, context: &mut PassContext) -> CompileResult<()> {
        for round in 1..=MAX_ROUNDS {
            let before = program.clone();
            for pass in &self.passes {
                if pass.should_run(program, context) {
                    pass.run(program, context)?;
                }
            }
            if *program == before {
                debug!(rounds = round, "Reached fixpoint");
                return Ok(());
            }
        }
        Err(CompilationError::PassFailed {
            pass: self.name().to_string(),
            message: format!("no fixpoint after {MAX_ROUNDS} rounds"),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::{FRAC_PI_2, PI};

    use qshot_ir::parse_ir;

    use super::*;
    use crate::target::TargetSpec;

    fn program(body: &str, target: &str) -> (Program, PassContext) {
        let source = format!("define void @main() {{\nentry:\n{body}\n  ret void\n}}\n");
        let program = Program::from_ir(parse_ir(&source).unwrap(), target).unwrap();
        let ctx = PassContext::new(TargetSpec::lookup(target).unwrap(), 2);
        (program, ctx)
    }

    fn kinds(program: &Program) -> Vec<GateKind> {
        program.gates().map(|g| g.kind).collect()
    }

    #[test]
    fn test_remove_trivial() {
        let (mut p, mut ctx) = program(
            "  call void @__quantum__qis__rz__body(double 0.0, ptr null)\n  call void @__quantum__qis__rxy__body(double 0x401921FB54442D18, double 1.0, ptr null)\n  call void @__quantum__qis__rz__body(double 1.0, ptr null)",
            "helios",
        );
        RemoveTrivialRotations.run(&mut p, &mut ctx).unwrap();
        assert_eq!(kinds(&p), vec![GateKind::Rz]);
        assert_eq!(ctx.stats.gates_removed, 2);
    }

    #[test]
    fn test_merge_rz() {
        let (mut p, mut ctx) = program(
            "  call void @__quantum__qis__rz__body(double 0.25, ptr null)\n  call void @__quantum__qis__rz__body(double 0.5, ptr null)",
            "helios",
        );
        MergeRotations.run(&mut p, &mut ctx).unwrap();
        let gates: Vec<_> = p.gates().collect();
        assert_eq!(gates.len(), 1);
        assert!((gates[0].angle(0).unwrap() - 0.75).abs() < EPSILON);
        assert_eq!(ctx.stats.gates_merged, 1);
    }

    #[test]
    fn test_merge_blocked_by_other_gate() {
        let (mut p, mut ctx) = program(
            "  call void @__quantum__qis__rxy__body(double 0.25, double 0.0, ptr null)\n  call void @__quantum__qis__rzz__body(double 0.1, ptr null, ptr inttoptr (i64 1 to ptr))\n  call void @__quantum__qis__rxy__body(double 0.5, double 0.0, ptr null)",
            "helios",
        );
        MergeRotations.run(&mut p, &mut ctx).unwrap();
        assert_eq!(p.gate_count(), 3);
    }

    #[test]
    fn test_merge_blocked_by_instruction() {
        let (mut p, mut ctx) = program(
            "  call void @__quantum__qis__rz__body(double 0.25, ptr null)\n  call void @__quantum__rt__initialize(ptr null)\n  call void @__quantum__qis__rz__body(double 0.5, ptr null)",
            "helios",
        );
        MergeRotations.run(&mut p, &mut ctx).unwrap();
        assert_eq!(p.gate_count(), 2);
    }

    #[test]
    fn test_merge_to_identity_cancels() {
        let (mut p, mut ctx) = program(
            "  call void @__quantum__qis__rxy__body(double 1.0, double 0.5, ptr null)\n  call void @__quantum__qis__rxy__body(double -1.0, double 0.5, ptr null)",
            "helios",
        );
        MergeRotations.run(&mut p, &mut ctx).unwrap();
        assert_eq!(p.gate_count(), 0);
        assert_eq!(ctx.stats.gates_removed, 2);
    }

    #[test]
    fn test_cancel_cz_pair_either_orientation() {
        let (mut p, mut ctx) = program(
            "  call void @__quantum__qis__cz__body(ptr null, ptr inttoptr (i64 1 to ptr))\n  call void @__quantum__qis__cz__body(ptr inttoptr (i64 1 to ptr), ptr null)",
            "iqm",
        );
        assert!(CancelSelfInverse.should_run(&p, &ctx));
        CancelSelfInverse.run(&mut p, &mut ctx).unwrap();
        assert_eq!(p.gate_count(), 0);
    }

    #[test]
    fn test_fixpoint_collapses_nested_pairs() {
        // rz(a) rxy rxy(-) rz(-a): the inner pair cancels, then the outer pair.
        let (mut p, mut ctx) = program(
            "  call void @__quantum__qis__rz__body(double 0.3, ptr null)\n  call void @__quantum__qis__rxy__body(double 1.0, double 0.0, ptr null)\n  call void @__quantum__qis__rxy__body(double -1.0, double 0.0, ptr null)\n  call void @__quantum__qis__rz__body(double -0.3, ptr null)",
            "helios",
        );
        let fixpoint = Fixpoint::new(vec![Box::new(MergeRotations)]);
        fixpoint.run(&mut p, &mut ctx).unwrap();
        assert_eq!(p.gate_count(), 0);
    }

    #[test]
    fn test_trivial_angles() {
        assert!(is_trivial(0.0));
        assert!(is_trivial(2.0 * PI));
        assert!(is_trivial(-4.0 * PI));
        assert!(!is_trivial(PI));
        assert!(!is_trivial(FRAC_PI_2));
    }
}
