//! qshot Shot Execution
//!
//! Runs a compiled QIS [`Module`](qshot_ir::Module) for many independent
//! shots against a pluggable [`Simulator`], then turns the raw per-shot
//! output into structured records.
//!
//! # Components
//!
//! - [`Executor`]: parallel, order-preserving shot scheduling on tokio
//!   blocking lanes, with per-shot fault capture and [`CancellationToken`]
//! - [`ResultAggregator`]: parses each [`RawShotPayload`] against the output
//!   schema into a [`ShotRecord`], never aborting on a bad shot
//! - [`LabeledFormatter`]: replaces slot positions with schema labels
//!
//! # Determinism
//!
//! Shot `i` of a batch seeded with `s` always sees the seed
//! [`derive_seed(s, i)`](derive_seed), whichever lane runs it. Outputs are
//! stored by shot index, so the [`ResultSet`] is independent of completion
//! order and worker count.

pub mod aggregate;
pub mod cancel;
pub mod error;
pub mod executor;
pub mod format;
pub mod simulator;

pub use aggregate::{
    AggregationPolicy, BatchError, ResultAggregator, ResultSet, ShotError, ShotErrorKind,
    ShotRecord, ShotValue,
};
pub use cancel::CancellationToken;
pub use error::{ExecResult, ExecutionError, FormatError, ShotFault};
pub use executor::{ExecutionBatch, Executor, ExecutorConfig, ShotOutput, ShotSpec};
pub use format::{LabeledFormatter, LabeledShot};
pub use simulator::{
    RawEntry, RawShotPayload, RawValue, ShotContext, ShotSizing, Simulator, SimulatorAccess,
    derive_seed,
};
