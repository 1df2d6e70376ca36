//! qshot Local Statevector Simulator
//!
//! Implements the [`Simulator`](qshot_exec::Simulator) capability for
//! compiled QIS modules. An interpreter walks the entry point, driving a
//! full statevector for the `___rxy`/`___rz`/`___rzz`/`___cz` gates, lazy
//! measurement and reset, and collects the `___print_*` output.
//!
//! # Features
//!
//! - **Exact amplitudes**: measurement randomness is the only noise
//! - **Adaptive programs**: branches, `phi`, `select`, integer and float
//!   arithmetic, casts and calls into IR-defined functions
//! - **Per-shot faults**: out-of-range indices, step budget and call depth
//!   are reported as shot faults, never panics
//!
//! # Performance
//!
//! | Qubits | Memory |
//! |--------|--------|
//! | 10 | ~16 KB |
//! | 20 | ~16 MB |
//! | 24 | ~256 MB |
//!
//! # Example
//!
//! ```rust
//! use qshot_adapter_sim::StatevectorSimulator;
//! use qshot_exec::{ShotContext, ShotSizing, Simulator};
//!
//! let qir = qshot_ir::load(r#"
//! define void @main() #0 {
//! entry:
//!   call void @__quantum__qis__x__body(ptr null)
//!   call void @__quantum__qis__mz__body(ptr null, ptr null)
//!   call void @__quantum__rt__result_record_output(ptr null, ptr null)
//!   ret void
//! }
//! declare void @__quantum__qis__x__body(ptr)
//! declare void @__quantum__qis__mz__body(ptr, ptr)
//! declare void @__quantum__rt__result_record_output(ptr, ptr)
//! attributes #0 = { "entry_point" "qir_profiles"="base_profile" }
//! "#).unwrap();
//! let qis = qshot_compile::compile(qir, &Default::default()).unwrap();
//!
//! let simulator = StatevectorSimulator::new();
//! let sizing = ShotSizing { num_qubits: 1, num_results: 1 };
//! simulator.load(&qis, &sizing).unwrap();
//! let context = ShotContext { shot_index: 0, seed: 0, num_qubits: 1, num_results: 1 };
//! let payload = simulator.run_shot(&qis, &context).unwrap();
//! assert_eq!(payload.entries[0].tag, "USER:RESULT:");
//! ```

mod error;
mod interpreter;
mod simulator;
mod statevector;

pub use error::Fault;
pub use simulator::StatevectorSimulator;
