//! Pass trait and types for compilation passes.

use crate::error::CompileResult;
use crate::program::Program;
use crate::target::TargetSpec;

/// The kind of compilation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Reads the program without modifying it.
    Analysis,
    /// Rewrites the program.
    Transformation,
}

/// Counters the passes update as they run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Gates produced by decomposition.
    pub gates_expanded: usize,
    /// Gates removed as identities or cancelled pairs.
    pub gates_removed: usize,
    /// Gate pairs folded into one rotation.
    pub gates_merged: usize,
}

/// State shared by the passes of one compilation.
#[derive(Debug, Clone)]
pub struct PassContext {
    pub target: &'static TargetSpec,
    pub opt_level: u8,
    pub stats: PassStats,
}

impl PassContext {
    pub fn new(target: &'static TargetSpec, opt_level: u8) -> Self {
        Self {
            target,
            opt_level,
            stats: PassStats::default(),
        }
    }
}

/// A compilation pass over a [`Program`].
pub trait Pass: Send + Sync {
    /// Get the name of this pass.
    fn name(&self) -> &str;

    /// Get the kind of this pass.
    fn kind(&self) -> PassKind;

    /// Run the pass.
    ///
    /// Analysis passes must leave the program unchanged.
    fn run(&self, program: &mut Program, context: &mut PassContext) -> CompileResult<()>;

    /// Check if this pass should run based on current state.
    fn should_run(&self, _program: &Program, _context: &PassContext) -> bool {
        true
    }
}
