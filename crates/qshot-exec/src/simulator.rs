//! The simulator capability consumed by the executor.

use std::fmt;
use std::sync::Arc;

use qshot_ir::Module;
use serde::{Deserialize, Serialize};

use crate::error::{ExecResult, ShotFault};

/// Golden-ratio increment used to spread shot indices.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Seed for shot `index` of a batch seeded with `batch_seed`.
///
/// Depends only on the two inputs, so a shot draws the same randomness
/// whichever worker runs it and in whatever order.
pub fn derive_seed(batch_seed: u64, index: u64) -> u64 {
    splitmix64(batch_seed ^ index.wrapping_mul(SEED_STRIDE))
}

fn splitmix64(state: u64) -> u64 {
    let mut z = state.wrapping_add(SEED_STRIDE);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Buffer sizes the simulator must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotSizing {
    pub num_qubits: u32,
    pub num_results: u32,
}

/// Everything a simulator needs to run one shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShotContext {
    pub shot_index: u64,
    pub seed: u64,
    pub num_qubits: u32,
    pub num_results: u32,
}

/// A value printed by the program.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", u8::from(*v)),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// One printed `(tag, value)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    pub tag: String,
    pub value: RawValue,
}

/// Output of one shot, in print order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawShotPayload {
    pub entries: Vec<RawEntry>,
}

impl RawShotPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tag: impl Into<String>, value: RawValue) {
        self.entries.push(RawEntry {
            tag: tag.into(),
            value,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How many shots a simulator instance may run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulatorAccess {
    /// `run_shot` may be called from several threads at once.
    Concurrent,
    /// One active execution context per instance.
    Exclusive,
}

/// A shot-level simulator backend.
///
/// `load` is the structural precondition, checked once per batch before any
/// shot runs. `run_shot` must be a pure function of the module and the
/// context; faults it reports stay confined to that shot.
pub trait Simulator: Send + Sync {
    /// Simulator name, for logs and errors.
    fn name(&self) -> &str;

    /// Check that the module can run on this simulator with this sizing.
    fn load(&self, module: &Module, sizing: &ShotSizing) -> ExecResult<()>;

    /// Execute one shot.
    fn run_shot(&self, module: &Module, context: &ShotContext)
    -> Result<RawShotPayload, ShotFault>;

    /// Concurrency this instance supports.
    fn access(&self) -> SimulatorAccess {
        SimulatorAccess::Concurrent
    }

    /// A fresh independent instance, for exclusive simulators that can be
    /// replicated across workers.
    fn replicate(&self) -> Option<Arc<dyn Simulator>> {
        None
    }
}
