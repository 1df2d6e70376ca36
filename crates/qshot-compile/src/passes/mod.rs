//! Built-in compilation passes.
//!
//! - [`TargetCheck`] and [`Legalize`] run at every level
//! - [`RemoveTrivialRotations`], [`CancelSelfInverse`] and
//!   [`MergeRotations`] are the peephole optimizations added by level
//! - [`Fixpoint`] repeats a group of passes until nothing changes

mod check;
mod legalize;
mod optimize;

pub use check::TargetCheck;
pub use legalize::{Legalize, decompose};
pub use optimize::{CancelSelfInverse, Fixpoint, MergeRotations, RemoveTrivialRotations};
