//! Decomposition into the target's native gate set.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use qshot_ir::Value;
use tracing::debug;

use crate::error::{CompilationError, CompileResult};
use crate::pass::{Pass, PassContext, PassKind};
use crate::program::{GateCall, GateKind, Op, Program, Wire};
use crate::target::TargetSpec;

/// Expansion depth after which a decomposition is considered cyclic.
const MAX_DEPTH: usize = 8;

/// Rewrites every gate into native gates, expanding recursively.
pub struct Legalize;

impl Pass for Legalize {
    fn name(&self) -> &'static str {
        "Legalize"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, program: &mut Program, context: &mut PassContext) -> CompileResult<()> {
        let target = context.target;
        let mut expanded = 0;
        for function in program.functions_mut() {
            for block in &mut function.blocks {
                let mut ops = Vec::with_capacity(block.ops.len());
                for op in block.ops.drain(..) {
                    match op {
                        Op::Gate(gate) if !target.is_native(gate.kind) => {
                            let before = ops.len();
                            expand(gate, target, 0, &mut ops)?;
                            expanded += ops.len() - before;
                        }
                        other => ops.push(other),
                    }
                }
                block.ops = ops;
            }
        }
        debug!(expanded, "Legalized gates");
        context.stats.gates_expanded += expanded;
        Ok(())
    }

    fn should_run(&self, program: &Program, context: &PassContext) -> bool {
        program.gates().any(|g| !context.target.is_native(g.kind))
    }
}

fn expand(gate: GateCall, target: &TargetSpec, depth: usize, out: &mut Vec<Op>) -> CompileResult<()> {
    if target.is_native(gate.kind) {
        out.push(Op::Gate(gate));
        return Ok(());
    }
    if depth >= MAX_DEPTH {
        return Err(CompilationError::PassFailed {
            pass: "Legalize".into(),
            message: format!("decomposition of '{gate}' does not terminate"),
        });
    }
    let parts = decompose(&gate, target).ok_or_else(|| CompilationError::Unsupported {
        construct: format!("quantum operation '{}'", gate.kind),
        target: target.name.to_string(),
    })?;
    for part in parts {
        expand(part, target, depth + 1, out)?;
    }
    Ok(())
}

fn gate(kind: GateKind, angles: &[f64], qubits: &[&Wire]) -> GateCall {
    GateCall::new(kind, angles, qubits.iter().map(|&q| q.clone()).collect())
}

fn with_angles(kind: GateKind, angles: Vec<Value>, qubits: &[&Wire]) -> GateCall {
    GateCall {
        kind,
        angles,
        qubits: qubits.iter().map(|&q| q.clone()).collect(),
        result: None,
    }
}

/// One decomposition step for a non-native gate, or `None` if the target
/// has no rule for it. Sequences are in time order and equal the original
/// gate up to global phase.
pub fn decompose(call: &GateCall, target: &TargetSpec) -> Option<Vec<GateCall>> {
    use GateKind::{Ccx, Cx, Cz, H, MResetZ, Mz, Reset, Rx, Rxy, Ry, Rz, Rzz, S, Sdg, T, Tdg, X, Y, Z};

    let q = &call.qubits;
    let theta = || call.angles.first().cloned().unwrap_or_else(|| Value::float(0.0));
    let has_rzz = target.is_native(Rzz);

    Some(match call.kind {
        H => vec![gate(Rxy, &[FRAC_PI_2, -FRAC_PI_2], &[&q[0]]), gate(Rz, &[PI], &[&q[0]])],
        X => vec![gate(Rxy, &[PI, 0.0], &[&q[0]])],
        Y => vec![gate(Rxy, &[PI, FRAC_PI_2], &[&q[0]])],
        Z => vec![gate(Rz, &[PI], &[&q[0]])],
        S => vec![gate(Rz, &[FRAC_PI_2], &[&q[0]])],
        Sdg => vec![gate(Rz, &[-FRAC_PI_2], &[&q[0]])],
        T => vec![gate(Rz, &[FRAC_PI_4], &[&q[0]])],
        Tdg => vec![gate(Rz, &[-FRAC_PI_4], &[&q[0]])],
        Rx => vec![with_angles(Rxy, vec![theta(), Value::float(0.0)], &[&q[0]])],
        Ry => vec![with_angles(Rxy, vec![theta(), Value::float(FRAC_PI_2)], &[&q[0]])],
        Cz if has_rzz => {
            let (c, t) = (&q[0], &q[1]);
            vec![
                gate(Rzz, &[FRAC_PI_2], &[c, t]),
                gate(Rz, &[-FRAC_PI_2], &[t]),
                gate(Rz, &[-FRAC_PI_2], &[c]),
            ]
        }
        Cx if has_rzz => {
            let (c, t) = (&q[0], &q[1]);
            vec![
                gate(Rxy, &[-FRAC_PI_2, FRAC_PI_2], &[t]),
                gate(Rzz, &[FRAC_PI_2], &[c, t]),
                gate(Rz, &[-FRAC_PI_2], &[c]),
                gate(Rxy, &[FRAC_PI_2, PI], &[t]),
                gate(Rz, &[-FRAC_PI_2], &[t]),
            ]
        }
        Cx => {
            let (c, t) = (&q[0], &q[1]);
            vec![
                gate(Rxy, &[-FRAC_PI_2, FRAC_PI_2], &[t]),
                gate(Cz, &[], &[c, t]),
                gate(Rxy, &[FRAC_PI_2, FRAC_PI_2], &[t]),
            ]
        }
        Rzz => {
            let (a, b) = (&q[0], &q[1]);
            vec![
                gate(Cx, &[], &[a, b]),
                with_angles(Rz, vec![theta()], &[b]),
                gate(Cx, &[], &[a, b]),
            ]
        }
        Ccx if has_rzz => {
            let (c1, c2, t) = (&q[0], &q[1], &q[2]);
            vec![
                gate(Rxy, &[PI, -FRAC_PI_2], &[t]),
                gate(Rzz, &[FRAC_PI_2], &[c2, t]),
                gate(Rxy, &[FRAC_PI_4, FRAC_PI_2], &[t]),
                gate(Rzz, &[FRAC_PI_2], &[c1, t]),
                gate(Rxy, &[FRAC_PI_4, 0.0], &[t]),
                gate(Rzz, &[FRAC_PI_2], &[c2, t]),
                gate(Rxy, &[FRAC_PI_4, -FRAC_PI_2], &[t]),
                gate(Rzz, &[FRAC_PI_2], &[c1, t]),
                gate(Rxy, &[PI, FRAC_PI_4], &[c1]),
                gate(Rxy, &[-3.0 * FRAC_PI_4, PI], &[t]),
                gate(Rzz, &[FRAC_PI_4], &[c1, c2]),
                gate(Rz, &[PI], &[t]),
                gate(Rxy, &[PI, -FRAC_PI_4], &[c1]),
                gate(Rz, &[-3.0 * FRAC_PI_4], &[c2]),
                gate(Rz, &[FRAC_PI_4], &[c1]),
            ]
        }
        Ccx => {
            let (a, b, c) = (&q[0], &q[1], &q[2]);
            vec![
                gate(H, &[], &[c]),
                gate(Cx, &[], &[b, c]),
                gate(Tdg, &[], &[c]),
                gate(Cx, &[], &[a, c]),
                gate(T, &[], &[c]),
                gate(Cx, &[], &[b, c]),
                gate(Tdg, &[], &[c]),
                gate(Cx, &[], &[a, c]),
                gate(T, &[], &[b]),
                gate(T, &[], &[c]),
                gate(H, &[], &[c]),
                gate(Cx, &[], &[a, b]),
                gate(T, &[], &[a]),
                gate(Tdg, &[], &[b]),
                gate(Cx, &[], &[a, b]),
            ]
        }
        MResetZ if target.supports_reset => vec![
            GateCall {
                kind: Mz,
                angles: Vec::new(),
                qubits: vec![q[0].clone()],
                result: call.result.clone(),
            },
            gate(Reset, &[], &[&q[0]]),
        ],
        Rxy | Rz | Cz | Mz | MResetZ | Reset => return None,
    })
}

#[cfg(test)]
mod tests {
    use num_complex::Complex64;

    use super::*;

    type Matrix = Vec<Vec<Complex64>>;

    fn identity(dim: usize) -> Matrix {
        (0..dim)
            .map(|r| {
                (0..dim)
                    .map(|c| if r == c { Complex64::new(1.0, 0.0) } else { Complex64::new(0.0, 0.0) })
                    .collect()
            })
            .collect()
    }

    fn mul(a: &Matrix, b: &Matrix) -> Matrix {
        let n = a.len();
        (0..n)
            .map(|r| (0..n).map(|c| (0..n).map(|k| a[r][k] * b[k][c]).sum()).collect())
            .collect()
    }

    /// Full unitary of a native gate on `n` qubits; qubit i is bit i.
    fn unitary(g: &GateCall, n: usize) -> Matrix {
        let dim = 1 << n;
        let idx = |w: &Wire| w.index().unwrap() as usize;
        let i = Complex64::new(0.0, 1.0);
        let mut m = vec![vec![Complex64::new(0.0, 0.0); dim]; dim];
        match g.kind {
            GateKind::Rxy | GateKind::Rz => {
                let q = idx(&g.qubits[0]);
                let u = if g.kind == GateKind::Rz {
                    let t = g.angle(0).unwrap();
                    [
                        [(-i * t / 2.0).exp(), Complex64::new(0.0, 0.0)],
                        [Complex64::new(0.0, 0.0), (i * t / 2.0).exp()],
                    ]
                } else {
                    let (t, p) = (g.angle(0).unwrap(), g.angle(1).unwrap());
                    let (c, s) = ((t / 2.0).cos(), (t / 2.0).sin());
                    [
                        [Complex64::new(c, 0.0), -i * s * (-i * p).exp()],
                        [-i * s * (i * p).exp(), Complex64::new(c, 0.0)],
                    ]
                };
                for col in 0..dim {
                    let bit = (col >> q) & 1;
                    for out in 0..2 {
                        let row = (col & !(1 << q)) | (out << q);
                        m[row][col] += u[out][bit];
                    }
                }
            }
            GateKind::Rzz | GateKind::Cz => {
                let (a, b) = (idx(&g.qubits[0]), idx(&g.qubits[1]));
                for col in 0..dim {
                    let parity = ((col >> a) ^ (col >> b)) & 1;
                    m[col][col] = if g.kind == GateKind::Cz {
                        if (col >> a) & 1 == 1 && (col >> b) & 1 == 1 {
                            Complex64::new(-1.0, 0.0)
                        } else {
                            Complex64::new(1.0, 0.0)
                        }
                    } else {
                        let t = g.angle(0).unwrap();
                        let sign = if parity == 0 { -1.0 } else { 1.0 };
                        (i * sign * t / 2.0).exp()
                    };
                }
            }
            other => panic!("not native: {other}"),
        }
        m
    }

    fn circuit_unitary(gates: &[GateCall], n: usize) -> Matrix {
        gates
            .iter()
            .fold(identity(1 << n), |acc, g| mul(&unitary(g, n), &acc))
    }

    fn fully_expand(g: GateCall, target: &TargetSpec) -> Vec<GateCall> {
        let mut ops = Vec::new();
        expand(g, target, 0, &mut ops).unwrap();
        ops.into_iter()
            .map(|op| match op {
                Op::Gate(g) => g,
                Op::Inst(_) => unreachable!(),
            })
            .collect()
    }

    /// Equal up to a global phase.
    fn assert_equivalent(a: &Matrix, b: &Matrix) {
        let n = a.len();
        let (r, c) = (0..n * n)
            .map(|k| (k / n, k % n))
            .find(|&(r, c)| a[r][c].norm() > 1e-6)
            .unwrap();
        let phase = b[r][c] / a[r][c];
        for r in 0..n {
            for c in 0..n {
                assert!((a[r][c] * phase - b[r][c]).norm() < 1e-9, "mismatch at ({r},{c})");
            }
        }
    }

    fn wires(n: u64) -> Vec<Wire> {
        (0..n).map(Wire::Static).collect()
    }

    fn reference(kind: GateKind, n: usize) -> Matrix {
        let dim = 1 << n;
        let mut m = vec![vec![Complex64::new(0.0, 0.0); dim]; dim];
        for col in 0..dim {
            let row = match kind {
                GateKind::Cx if (col & 1) == 1 => col ^ 0b10,
                GateKind::Ccx if (col & 0b11) == 0b11 => col ^ 0b100,
                _ => col,
            };
            m[row][col] = Complex64::new(1.0, 0.0);
        }
        m
    }

    #[test]
    fn test_cx_equivalent_on_both_targets() {
        for name in ["helios", "iqm"] {
            let target = TargetSpec::lookup(name).unwrap();
            let gates = fully_expand(GateCall::new(GateKind::Cx, &[], wires(2)), target);
            assert!(gates.iter().all(|g| target.is_native(g.kind)));
            assert_equivalent(&reference(GateKind::Cx, 2), &circuit_unitary(&gates, 2));
        }
    }

    #[test]
    fn test_ccx_equivalent_on_both_targets() {
        for name in ["helios", "iqm"] {
            let target = TargetSpec::lookup(name).unwrap();
            let gates = fully_expand(GateCall::new(GateKind::Ccx, &[], wires(3)), target);
            assert_equivalent(&reference(GateKind::Ccx, 3), &circuit_unitary(&gates, 3));
        }
    }

    #[test]
    fn test_h_squared_is_identity() {
        let target = TargetSpec::lookup("helios").unwrap();
        let mut gates = fully_expand(GateCall::new(GateKind::H, &[], wires(1)), target);
        gates.extend(fully_expand(GateCall::new(GateKind::H, &[], wires(1)), target));
        assert_equivalent(&identity(2), &circuit_unitary(&gates, 1));
    }

    #[test]
    fn test_rzz_on_iqm_matches_native() {
        let helios = TargetSpec::lookup("helios").unwrap();
        let iqm = TargetSpec::lookup("iqm").unwrap();
        let rzz = GateCall::new(GateKind::Rzz, &[0.7], wires(2));
        let native = circuit_unitary(std::slice::from_ref(&rzz), 2);
        assert_equivalent(&native, &circuit_unitary(&fully_expand(rzz.clone(), iqm), 2));
        assert_eq!(fully_expand(rzz, helios).len(), 1);
    }

    #[test]
    fn test_no_rule_for_reset_on_iqm() {
        let iqm = TargetSpec::lookup("iqm").unwrap();
        let mut ops = Vec::new();
        let err = expand(GateCall::new(GateKind::Reset, &[], wires(1)), iqm, 0, &mut ops).unwrap_err();
        assert!(matches!(err, CompilationError::Unsupported { .. }));
    }
}
