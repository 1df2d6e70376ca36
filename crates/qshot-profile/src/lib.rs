//! qshot QIR Profile Checking
//!
//! The two read-only stages that sit between loading and compilation:
//!
//! - [`validate`] checks a [`Module`](qshot_ir::Module) against the QIR base
//!   and adaptive profiles and reports every violated rule at once.
//! - [`AttributeExtractor`] turns the entry point's attributes into a typed
//!   [`EntryPointAttributes`] record, including the [`OutputSchema`] that
//!   names each recorded value.
//!
//! # Example
//!
//! ```rust
//! use qshot_profile::{extract, validate};
//!
//! let module = qshot_ir::load(r#"
//! define void @main() #0 {
//! entry:
//!   call void @__quantum__qis__h__body(ptr null)
//!   ret void
//! }
//! declare void @__quantum__qis__h__body(ptr)
//! attributes #0 = { "entry_point" "qir_profiles"="base_profile" "required_num_qubits"="1" }
//! !llvm.module.flags = !{!0, !1, !2, !3}
//! !0 = !{i32 1, !"qir_major_version", i32 1}
//! !1 = !{i32 7, !"qir_minor_version", i32 0}
//! !2 = !{i32 1, !"dynamic_qubit_management", i1 false}
//! !3 = !{i32 1, !"dynamic_result_management", i1 false}
//! "#).unwrap();
//!
//! validate(&module).unwrap();
//! let attrs = extract(&module).unwrap();
//! assert_eq!(attrs.num_qubits(), 1);
//! ```

pub mod attributes;
pub mod callgraph;
pub mod error;
pub mod profile;
pub mod schema;
pub mod validator;

pub use attributes::{
    AttributeExtractor, AttributeValue, CountSource, DEFAULT_NUM_QUBITS, EntryPointAttributes,
    ExtractionPolicy, extract,
};
pub use error::{AttributeError, AttributeResult, RuleClass, ValidationError, Violation};
pub use profile::Profile;
pub use schema::{OutputEntry, OutputKind, OutputSchema, OutputSlot};
pub use validator::validate;
