//! Target capability check.

use qshot_profile::profile::{NUM_QUBITS_ATTR, runtime_function};
use tracing::debug;

use crate::error::{CompilationError, CompileResult};
use crate::pass::{Pass, PassContext, PassKind};
use crate::program::{GateKind, Program};

/// Rejects programs the target cannot run before any rewriting happens.
///
/// Checks mid-circuit reset and measurement feedback support, and that the
/// qubit count (declared or used, whichever is larger) fits the device.
pub struct TargetCheck;

impl Pass for TargetCheck {
    fn name(&self) -> &'static str {
        "TargetCheck"
    }

    fn kind(&self) -> PassKind {
        PassKind::Analysis
    }

    fn run(&self, program: &mut Program, context: &mut PassContext) -> CompileResult<()> {
        let target = context.target;
        let unsupported = |construct: String| CompilationError::Unsupported {
            construct,
            target: target.name.to_string(),
        };

        for gate in program.gates() {
            if matches!(gate.kind, GateKind::Reset | GateKind::MResetZ) && !target.supports_reset {
                return Err(unsupported(format!("mid-circuit reset ('{}')", gate.kind)));
            }
        }
        for (function, inst) in program.instructions() {
            let Some((callee, _)) = inst.as_call() else {
                continue;
            };
            if runtime_function(callee) == Some("read_result") && !target.supports_feedback {
                return Err(unsupported(format!(
                    "measurement feedback (@{callee} in @{function})"
                )));
            }
        }

        let used = program
            .gates()
            .flat_map(|g| g.qubits.iter())
            .filter_map(|w| w.index())
            .max()
            .map_or(0, |q| q + 1);
        let declared = program
            .ir()
            .entry_point()
            .and_then(|entry| {
                program
                    .ir()
                    .string_attributes(entry)
                    .into_iter()
                    .find(|(k, _)| *k == NUM_QUBITS_ATTR)
                    .and_then(|(_, v)| v?.parse::<u64>().ok())
            })
            .unwrap_or(0);
        let required = used.max(declared);
        if required > target.max_qubits {
            return Err(CompilationError::CapacityExceeded {
                required,
                available: target.max_qubits,
                target: target.name.to_string(),
            });
        }

        debug!(required, target = target.name, "Target check passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use qshot_ir::parse_ir;

    use super::*;
    use crate::target::TargetSpec;

    fn check(source: &str, target: &str) -> CompileResult<()> {
        let mut program = Program::from_ir(parse_ir(source).unwrap(), target).unwrap();
        let mut ctx = PassContext::new(TargetSpec::lookup(target).unwrap(), 0);
        TargetCheck.run(&mut program, &mut ctx)
    }

    const RESET: &str = r"
define void @main() {
entry:
  call void @__quantum__qis__reset__body(ptr null)
  ret void
}
";

    #[test]
    fn test_reset_rejected_on_iqm() {
        let err = check(RESET, "iqm").unwrap_err();
        assert!(matches!(
            err,
            CompilationError::Unsupported { ref target, .. } if target == "iqm"
        ));
        check(RESET, "helios").unwrap();
    }

    #[test]
    fn test_feedback_rejected_on_iqm() {
        let source = r"
define void @main() {
entry:
  %r = call i1 @__quantum__rt__read_result(ptr null)
  ret void
}
";
        assert!(check(source, "iqm").is_err());
        check(source, "helios").unwrap();
    }

    #[test]
    fn test_capacity() {
        let source = r#"
define void @main() #0 {
entry:
  ret void
}
attributes #0 = { "entry_point" "required_num_qubits"="60" }
"#;
        assert!(matches!(
            check(source, "iqm"),
            Err(CompilationError::CapacityExceeded {
                required: 60,
                available: 54,
                ..
            })
        ));
        check(source, "helios").unwrap();
    }
}
