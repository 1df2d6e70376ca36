//! Pass manager for orchestrating compilation.

use tracing::{debug, info, instrument};

use crate::error::CompileResult;
use crate::pass::{Pass, PassContext};
use crate::passes::{
    CancelSelfInverse, Fixpoint, Legalize, MergeRotations, RemoveTrivialRotations, TargetCheck,
};
use crate::program::Program;
use crate::target::{MAX_OPT_LEVEL, TargetSpec};

/// Manages and executes a sequence of compilation passes.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    /// Create a new empty pass manager.
    pub fn new() -> Self {
        Self { passes: vec![] }
    }

    /// Add a pass to the manager.
    pub fn add_pass(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }

    /// Names of the scheduled passes, in order.
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run all passes on the program.
    #[instrument(skip(self, program, context), fields(target = context.target.name))]
    pub fn run(&self, program: &mut Program, context: &mut PassContext) -> CompileResult<()> {
        info!(
            "Running pass manager with {} passes on program with {} gates",
            self.passes.len(),
            program.gate_count()
        );

        for pass in &self.passes {
            if pass.should_run(program, context) {
                debug!("Running pass: {}", pass.name());
                pass.run(program, context)?;
                debug!("Pass {} completed, gates: {}", pass.name(), program.gate_count());
            } else {
                debug!("Skipping pass: {}", pass.name());
            }
        }

        info!(
            gates = program.gate_count(),
            expanded = context.stats.gates_expanded,
            removed = context.stats.gates_removed,
            merged = context.stats.gates_merged,
            "Pass manager completed"
        );
        Ok(())
    }

    /// Get the number of passes.
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Check if the manager has no passes.
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the pass pipeline for a target and optimization level.
pub struct PassManagerBuilder {
    target: &'static TargetSpec,
    optimization_level: u8,
}

impl PassManagerBuilder {
    pub fn new(target: &'static TargetSpec) -> Self {
        Self {
            target,
            optimization_level: 0,
        }
    }

    /// Set the optimization level.
    ///
    /// - Level 0: target check and legalization only
    /// - Level 1: + trivial rotation removal, self-inverse cancellation
    /// - Level 2: + rotation merging
    /// - Level 3: level 2 optimizations repeated to a fixpoint
    #[must_use]
    pub fn with_optimization_level(mut self, level: u8) -> Self {
        self.optimization_level = level.min(MAX_OPT_LEVEL);
        self
    }

    /// Build the pass manager and the context it runs with.
    pub fn build(self) -> (PassManager, PassContext) {
        let mut pm = PassManager::new();
        pm.add_pass(TargetCheck);
        pm.add_pass(Legalize);

        match self.optimization_level {
            0 => {}
            1 => {
                pm.add_pass(RemoveTrivialRotations);
                pm.add_pass(CancelSelfInverse);
            }
            2 => {
                pm.add_pass(RemoveTrivialRotations);
                pm.add_pass(CancelSelfInverse);
                pm.add_pass(MergeRotations);
            }
            _ => {
                pm.add_pass(Fixpoint::new(vec![
                    Box::new(RemoveTrivialRotations),
                    Box::new(CancelSelfInverse),
                    Box::new(MergeRotations),
                ]));
            }
        }

        let context = PassContext::new(self.target, self.optimization_level);
        (pm, context)
    }
}
