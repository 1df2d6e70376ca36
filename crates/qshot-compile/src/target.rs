//! Compilation targets and their native gate sets.

use serde::{Deserialize, Serialize};

use crate::error::{CompilationError, CompileResult};
use crate::program::GateKind;

/// Highest supported optimization level.
pub const MAX_OPT_LEVEL: u8 = 3;

/// Which target to compile for and how hard to optimize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationTarget {
    pub target: String,
    pub opt_level: u8,
}

impl CompilationTarget {
    /// Create a target selector, rejecting unknown targets and levels above 3.
    pub fn new(target: impl Into<String>, opt_level: u8) -> CompileResult<Self> {
        let target = Self {
            target: target.into(),
            opt_level,
        };
        target.spec()?;
        Ok(target)
    }

    /// Resolve the selector to a target description.
    pub fn spec(&self) -> CompileResult<&'static TargetSpec> {
        if self.opt_level > MAX_OPT_LEVEL {
            return Err(CompilationError::InvalidOptLevel(self.opt_level));
        }
        TargetSpec::lookup(&self.target)
            .ok_or_else(|| CompilationError::UnknownTarget(self.target.clone()))
    }
}

impl Default for CompilationTarget {
    fn default() -> Self {
        Self {
            target: "helios".into(),
            opt_level: 2,
        }
    }
}

/// What a target can execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub name: &'static str,
    /// Gates that need no decomposition.
    pub natives: &'static [GateKind],
    /// Mid-circuit reset.
    pub supports_reset: bool,
    /// Reading results back into classical control flow.
    pub supports_feedback: bool,
    pub max_qubits: u64,
}

impl TargetSpec {
    /// Look up a target by name.
    pub fn lookup(name: &str) -> Option<&'static Self> {
        TARGETS.iter().find(|t| t.name == name)
    }

    /// Whether a gate is in the native set. Measurement is always native.
    pub fn is_native(&self, kind: GateKind) -> bool {
        kind == GateKind::Mz || self.natives.contains(&kind)
    }
}

/// All known targets.
pub static TARGETS: &[TargetSpec] = &[
    TargetSpec {
        name: "helios",
        natives: &[GateKind::Rxy, GateKind::Rz, GateKind::Rzz, GateKind::Reset, GateKind::MResetZ],
        supports_reset: true,
        supports_feedback: true,
        max_qubits: 98,
    },
    TargetSpec {
        name: "iqm",
        natives: &[GateKind::Rxy, GateKind::Rz, GateKind::Cz],
        supports_reset: false,
        supports_feedback: false,
        max_qubits: 54,
    },
];

pub(crate) fn known_targets() -> String {
    TARGETS.iter().map(|t| t.name).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let helios = TargetSpec::lookup("helios").unwrap();
        assert!(helios.is_native(GateKind::Rzz));
        assert!(!helios.is_native(GateKind::Cz));
        let iqm = TargetSpec::lookup("iqm").unwrap();
        assert!(iqm.is_native(GateKind::Cz));
        assert!(iqm.is_native(GateKind::Mz));
        assert!(!iqm.supports_reset);
    }

    #[test]
    fn test_invalid_selectors() {
        assert!(matches!(
            CompilationTarget::new("sycamore", 1),
            Err(CompilationError::UnknownTarget(_))
        ));
        assert!(matches!(
            CompilationTarget::new("iqm", 4),
            Err(CompilationError::InvalidOptLevel(4))
        ));
        let err = CompilationTarget::new("sycamore", 0).unwrap_err();
        assert!(err.to_string().contains("helios, iqm"));
    }
}
