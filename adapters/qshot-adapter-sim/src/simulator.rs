//! Simulator capability implementation.

use qshot_exec::{
    ExecResult, ExecutionError, RawShotPayload, ShotContext, ShotFault, ShotSizing, Simulator,
    SimulatorAccess,
};
use qshot_ir::Module;
use qshot_ir::qis::{self, compiled_for};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, instrument, trace};

use crate::interpreter::{Limits, Machine};

/// Local statevector simulator for QIS modules.
///
/// Every shot starts from |0...0⟩ with a fresh `StdRng` seeded from the
/// shot context, so shots are independent and can run concurrently.
#[derive(Debug, Clone)]
pub struct StatevectorSimulator {
    max_qubits: u32,
    limits: Limits,
}

impl StatevectorSimulator {
    /// Create a new simulator with default settings.
    pub fn new() -> Self {
        Self {
            max_qubits: 24,
            limits: Limits::default(),
        }
    }

    /// Create a simulator with custom max qubits.
    pub fn with_max_qubits(max_qubits: u32) -> Self {
        Self {
            max_qubits,
            ..Self::new()
        }
    }

    /// Bound the number of instructions executed per shot.
    pub fn with_step_limit(mut self, max_steps: u64) -> Self {
        self.limits.max_steps = max_steps;
        self
    }

    /// Bound the depth of calls into IR-defined functions.
    pub fn with_call_depth(mut self, max_call_depth: usize) -> Self {
        self.limits.max_call_depth = max_call_depth;
        self
    }

    pub fn max_qubits(&self) -> u32 {
        self.max_qubits
    }

    fn load_error(&self, message: impl Into<String>) -> ExecutionError {
        ExecutionError::Load {
            simulator: self.name().to_string(),
            message: message.into(),
        }
    }
}

impl Default for StatevectorSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator for StatevectorSimulator {
    fn name(&self) -> &str {
        "statevector"
    }

    #[instrument(skip_all, fields(qubits = sizing.num_qubits, results = sizing.num_results))]
    fn load(&self, module: &Module, sizing: &ShotSizing) -> ExecResult<()> {
        let ir = module.ir();
        if compiled_for(ir).is_none() {
            return Err(self.load_error("module is not in QIS form; compile it first"));
        }
        let Some(entry) = ir.entry_point() else {
            return Err(self.load_error("module has no unique entry point"));
        };
        if entry.is_declaration() {
            return Err(self.load_error(format!("entry point @{} has no body", entry.name)));
        }
        if sizing.num_qubits > self.max_qubits {
            return Err(self.load_error(format!(
                "program needs {} qubits but the simulator supports {}",
                sizing.num_qubits, self.max_qubits
            )));
        }
        for function in ir.functions.iter().filter(|f| f.is_declaration()) {
            if qis::signature(&function.name).is_none() {
                return Err(self.load_error(format!(
                    "external function @{} is not part of the QIS runtime",
                    function.name
                )));
            }
        }
        debug!(entry = %entry.name, "Module loaded");
        Ok(())
    }

    fn run_shot(&self, module: &Module, context: &ShotContext) -> Result<RawShotPayload, ShotFault> {
        let ir = module.ir();
        let entry = ir
            .entry_point()
            .ok_or_else(|| ShotFault::new("module has no unique entry point"))?;
        let machine = Machine::new(
            ir,
            context.num_qubits as usize,
            context.num_results as usize,
            context.shot_index,
            StdRng::seed_from_u64(context.seed),
            self.limits,
        );
        let payload = machine
            .run(entry)
            .map_err(|fault| ShotFault::new(fault.to_string()))?;
        trace!(shot = context.shot_index, entries = payload.len(), "Shot finished");
        Ok(payload)
    }

    fn access(&self) -> SimulatorAccess {
        SimulatorAccess::Concurrent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qshot_compile::{CompilationTarget, compile};
    use qshot_exec::RawValue;

    const BELL: &str = r#"
define void @main() #0 {
entry:
  call void @__quantum__qis__h__body(ptr null)
  call void @__quantum__qis__cnot__body(ptr null, ptr inttoptr (i64 1 to ptr))
  call void @__quantum__qis__mz__body(ptr null, ptr null)
  call void @__quantum__qis__mz__body(ptr inttoptr (i64 1 to ptr), ptr inttoptr (i64 1 to ptr))
  call void @__quantum__rt__result_record_output(ptr null, ptr null)
  call void @__quantum__rt__result_record_output(ptr inttoptr (i64 1 to ptr), ptr null)
  ret void
}
declare void @__quantum__qis__h__body(ptr)
declare void @__quantum__qis__cnot__body(ptr, ptr)
declare void @__quantum__qis__mz__body(ptr, ptr)
declare void @__quantum__rt__result_record_output(ptr, ptr)
attributes #0 = { "entry_point" "qir_profiles"="base_profile" "required_num_qubits"="2" "required_num_results"="2" }
"#;

    fn sizing() -> ShotSizing {
        ShotSizing {
            num_qubits: 2,
            num_results: 2,
        }
    }

    fn context(seed: u64) -> ShotContext {
        ShotContext {
            shot_index: 0,
            seed,
            num_qubits: 2,
            num_results: 2,
        }
    }

    fn bits(payload: &RawShotPayload) -> Vec<bool> {
        payload
            .entries
            .iter()
            .map(|e| e.value == RawValue::Bool(true))
            .collect()
    }

    #[test]
    fn test_bell_outcomes_agree() {
        let simulator = StatevectorSimulator::new();
        for target in ["helios", "iqm"] {
            let module = compile(
                qshot_ir::load(BELL).unwrap(),
                &CompilationTarget::new(target, 2).unwrap(),
            )
            .unwrap();
            simulator.load(&module, &sizing()).unwrap();

            let mut seen = [false; 2];
            for seed in 0..40 {
                let payload = simulator.run_shot(&module, &context(seed)).unwrap();
                assert_eq!(payload.entries[0].tag, "USER:RESULT:");
                let bits = bits(&payload);
                assert_eq!(bits[0], bits[1], "{target}: {bits:?}");
                seen[usize::from(bits[0])] = true;
            }
            assert_eq!(seen, [true, true], "{target}");
        }
    }

    #[test]
    fn test_same_seed_same_payload() {
        let simulator = StatevectorSimulator::new();
        let module = compile(qshot_ir::load(BELL).unwrap(), &CompilationTarget::default()).unwrap();
        let a = simulator.run_shot(&module, &context(99)).unwrap();
        let b = simulator.run_shot(&module, &context(99)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_load_rejects_uncompiled_module() {
        let simulator = StatevectorSimulator::new();
        let err = simulator
            .load(&qshot_ir::load(BELL).unwrap(), &sizing())
            .unwrap_err();
        assert!(err.to_string().contains("not in QIS form"), "{err}");
    }

    #[test]
    fn test_load_rejects_too_many_qubits() {
        let simulator = StatevectorSimulator::with_max_qubits(1);
        let module = compile(qshot_ir::load(BELL).unwrap(), &CompilationTarget::default()).unwrap();
        assert!(matches!(
            simulator.load(&module, &sizing()),
            Err(ExecutionError::Load { .. })
        ));
    }

    #[test]
    fn test_fault_when_results_undersized() {
        let simulator = StatevectorSimulator::new();
        let module = compile(qshot_ir::load(BELL).unwrap(), &CompilationTarget::default()).unwrap();
        let mut ctx = context(0);
        ctx.num_results = 1;
        let fault = simulator.run_shot(&module, &ctx).unwrap_err();
        assert!(fault.message.contains("Result index 1"), "{}", fault.message);
    }
}
