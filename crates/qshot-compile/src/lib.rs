//! qshot QIR to QIS Compiler
//!
//! This crate lowers a validated QIR [`Module`] into QIS form for one
//! compilation target. Compilation is pass based: a [`PassManager`] runs
//! target checks, legalization and peephole optimizations over a
//! [`Program`], and the result is lowered to `___`-prefixed QIS calls with
//! integer qubit and result indices.
//!
//! # Pipeline
//!
//! ```text
//! QIR Module
//!       │
//!       ▼
//! ┌─────────────┐
//! │ PassManager │ ◄── PassContext (target, level, stats)
//! └─────────────┘
//!       │
//!       ├── TargetCheck
//!       ├── Legalize
//!       └── RemoveTrivialRotations / CancelSelfInverse / MergeRotations
//!       │
//!       ▼
//!   lowering ──► QIS Module (+ !qshot.qis marker)
//! ```
//!
//! # Optimization Levels
//!
//! | Level | Passes Included |
//! |-------|-----------------|
//! | 0 | Target check + legalization |
//! | 1 | + Trivial rotation removal, self-inverse cancellation |
//! | 2 | + Rotation merging |
//! | 3 | Optimizations repeated to a fixpoint |
//!
//! # Example
//!
//! ```rust
//! use qshot_compile::{CompilationTarget, compile};
//!
//! let module = qshot_ir::load(r#"
//! define void @main() #0 {
//! entry:
//!   call void @__quantum__qis__h__body(ptr null)
//!   call void @__quantum__qis__mz__body(ptr null, ptr null)
//!   call void @__quantum__rt__result_record_output(ptr null, ptr null)
//!   ret void
//! }
//! declare void @__quantum__qis__h__body(ptr)
//! declare void @__quantum__qis__mz__body(ptr, ptr)
//! declare void @__quantum__rt__result_record_output(ptr, ptr)
//! attributes #0 = { "entry_point" "qir_profiles"="base_profile" }
//! "#).unwrap();
//!
//! let target = CompilationTarget::new("helios", 2).unwrap();
//! let qis = compile(module, &target).unwrap();
//! assert!(qis.to_ir_text().contains("@___lazy_measure"));
//! ```

pub mod error;
mod lower;
pub mod manager;
pub mod pass;
pub mod passes;
pub mod program;
pub mod target;

pub use error::{CompilationError, CompileResult};
pub use manager::{PassManager, PassManagerBuilder};
pub use pass::{Pass, PassContext, PassKind, PassStats};
pub use program::{GateCall, GateKind, Program, Wire};
pub use target::{CompilationTarget, MAX_OPT_LEVEL, TargetSpec};

use qshot_ir::Module;
use qshot_ir::qis::compiled_for;
use tracing::{info, instrument};

/// Compile a QIR module to QIS for `target`.
///
/// Entry-point attributes are carried over untouched. A module that is
/// already QIS for the same target is returned as is; one compiled for a
/// different target is rejected.
#[instrument(skip(module), fields(target = %target.target, level = target.opt_level))]
pub fn compile(module: Module, target: &CompilationTarget) -> CompileResult<Module> {
    let spec = target.spec()?;

    if let Some(compiled) = compiled_for(module.ir()) {
        if compiled.target == target.target {
            info!("Module is already QIS for this target");
            return Ok(module);
        }
        return Err(CompilationError::TargetMismatch {
            compiled: compiled.target,
            requested: target.target.clone(),
        });
    }

    let mut program = Program::from_ir(module.into_ir(), spec.name)?;
    let gates_in = program.gate_count();

    let (pm, mut context) = PassManagerBuilder::new(spec)
        .with_optimization_level(target.opt_level)
        .build();
    pm.run(&mut program, &mut context)?;

    let gates_out = program.gate_count();
    let ir = lower::lower(program, target)?;

    info!(
        gates_in,
        gates_out,
        expanded = context.stats.gates_expanded,
        removed = context.stats.gates_removed,
        merged = context.stats.gates_merged,
        "Compiled module"
    );
    Ok(Module::from_ir(ir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use qshot_ir::qis;

    const BELL: &str = r#"
define void @main() #0 {
entry:
  call void @__quantum__rt__initialize(ptr null)
  call void @__quantum__qis__h__body(ptr null)
  call void @__quantum__qis__cnot__body(ptr null, ptr inttoptr (i64 1 to ptr))
  call void @__quantum__qis__mz__body(ptr null, ptr null)
  call void @__quantum__qis__mz__body(ptr inttoptr (i64 1 to ptr), ptr inttoptr (i64 1 to ptr))
  call void @__quantum__rt__tuple_record_output(i64 2, ptr null)
  call void @__quantum__rt__result_record_output(ptr null, ptr @0)
  call void @__quantum__rt__result_record_output(ptr inttoptr (i64 1 to ptr), ptr @1)
  ret void
}

declare void @__quantum__rt__initialize(ptr)
declare void @__quantum__qis__h__body(ptr)
declare void @__quantum__qis__cnot__body(ptr, ptr)
declare void @__quantum__qis__mz__body(ptr, ptr)
declare void @__quantum__rt__tuple_record_output(i64, ptr)
declare void @__quantum__rt__result_record_output(ptr, ptr)

@0 = internal constant [3 x i8] c"r0\00"
@1 = internal constant [3 x i8] c"r1\00"

attributes #0 = { "entry_point" "qir_profiles"="base_profile" "required_num_qubits"="2" "required_num_results"="2" "custom"="kept" }
"#;

    fn bell() -> Module {
        qshot_ir::load(BELL).unwrap()
    }

    fn callees(module: &Module) -> Vec<String> {
        let ir = module.ir();
        ir.entry_point()
            .unwrap()
            .instructions()
            .filter_map(|i| i.as_call().map(|(c, _)| c.to_string()))
            .collect()
    }

    #[test]
    fn test_lowers_to_qis_calls() {
        let target = CompilationTarget::new("helios", 0).unwrap();
        let qis = compile(bell(), &target).unwrap();
        let calls = callees(&qis);

        assert!(calls.iter().all(|c| c.starts_with("___")), "{calls:?}");
        assert!(calls.contains(&qis::RZZ.to_string()));
        assert_eq!(calls.iter().filter(|c| *c == qis::LAZY_MEASURE).count(), 2);
        assert_eq!(calls.iter().filter(|c| *c == qis::READ_RESULT).count(), 2);
        assert_eq!(calls.iter().filter(|c| *c == qis::PRINT_BOOL).count(), 2);
        assert_eq!(calls.iter().filter(|c| *c == qis::PRINT_INT).count(), 1);

        let ir = qis.ir();
        assert!(ir.functions.iter().all(|f| !f.name.starts_with("__quantum__")));
        assert!(ir.global("0").is_none());
        assert_eq!(
            compiled_for(ir),
            Some(qis::CompiledFor {
                target: "helios".into(),
                opt_level: 0
            })
        );
    }

    #[test]
    fn test_tags_are_length_prefixed() {
        let target = CompilationTarget::new("helios", 2).unwrap();
        let qis = compile(bell(), &target).unwrap();
        let tags: Vec<qis::OutputTag> = qis
            .ir()
            .globals
            .iter()
            .filter_map(|g| match &g.initializer {
                Some(qshot_ir::Initializer::Bytes(bytes)) => qis::OutputTag::decode(bytes),
                _ => None,
            })
            .collect();
        let text: Vec<String> = tags.iter().map(ToString::to_string).collect();
        assert!(text.contains(&"USER:RESULT:r0".to_string()));
        assert!(text.contains(&"USER:RESULT:r1".to_string()));
        assert!(text.contains(&"USER:QIRTUPLE:".to_string()));
    }

    #[test]
    fn test_attributes_survive_compilation() {
        let module = bell();
        let before = qshot_profile::extract(&module).unwrap();
        let target = CompilationTarget::new("iqm", 3).unwrap();
        let qis = compile(module, &target).unwrap();
        let after = qshot_profile::extract(&qis).unwrap();

        assert_eq!(before.attributes(), after.attributes());
        assert_eq!(before.num_qubits(), after.num_qubits());
        assert_eq!(before.num_results(), after.num_results());
        assert_eq!(before.output_schema(), after.output_schema());
    }

    #[test]
    fn test_iqm_uses_cz() {
        let target = CompilationTarget::new("iqm", 1).unwrap();
        let calls = callees(&compile(bell(), &target).unwrap());
        assert!(calls.contains(&qis::CZ.to_string()));
        assert!(!calls.contains(&qis::RZZ.to_string()));
    }

    #[test]
    fn test_recompile_same_target_is_noop() {
        let target = CompilationTarget::new("helios", 2).unwrap();
        let once = compile(bell(), &target).unwrap();
        let twice = compile(once.clone(), &target).unwrap();
        assert_eq!(once.bitcode(), twice.bitcode());
    }

    #[test]
    fn test_recompile_other_target_fails() {
        let once = compile(bell(), &CompilationTarget::default()).unwrap();
        let err = compile(once, &CompilationTarget::new("iqm", 2).unwrap()).unwrap_err();
        assert!(matches!(err, CompilationError::TargetMismatch { .. }));
    }

    #[test]
    fn test_unknown_target() {
        let target = CompilationTarget {
            target: "nowhere".into(),
            opt_level: 0,
        };
        let err = compile(bell(), &target).unwrap_err();
        assert!(matches!(err, CompilationError::UnknownTarget(_)));
    }

    #[test]
    fn test_subroutine_params_become_indices() {
        let module = qshot_ir::load(
            r#"
define void @main() #0 {
entry:
  call void @flip(ptr inttoptr (i64 1 to ptr))
  ret void
}
define void @flip(ptr %q) {
entry:
  call void @__quantum__qis__x__body(ptr %q)
  ret void
}
declare void @__quantum__qis__x__body(ptr)
attributes #0 = { "entry_point" "qir_profiles"="base_profile" }
"#,
        )
        .unwrap();
        let qis = compile(module, &CompilationTarget::default()).unwrap();
        let text = qis.to_ir_text();
        assert!(text.contains("define void @flip(i64 %q)"), "{text}");
        assert!(text.contains("call void @flip(i64 1)"), "{text}");
        assert!(text.contains("@___rxy(double"), "{text}");
    }

    #[test]
    fn test_label_too_long() {
        let label = "x".repeat(300);
        let source = format!(
            r#"
define void @main() #0 {{
entry:
  call void @__quantum__rt__int_record_output(i64 1, ptr @0)
  ret void
}}
declare void @__quantum__rt__int_record_output(i64, ptr)
@0 = internal constant [301 x i8] c"{label}\00"
attributes #0 = {{ "entry_point" "qir_profiles"="base_profile" }}
"#
        );
        let module = qshot_ir::load(&source).unwrap();
        let err = compile(module, &CompilationTarget::default()).unwrap_err();
        assert!(matches!(err, CompilationError::LabelTooLong { .. }));
    }
}
