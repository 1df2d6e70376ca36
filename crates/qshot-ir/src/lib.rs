//! qshot Module Model and IR Loader
//!
//! This crate turns textual QIR (LLVM-style IR text) into a [`Module`]: the
//! parsed program contents together with their canonical binary bitcode.
//! Every later pipeline stage consumes a `Module` and produces a new one.
//!
//! # Core Components
//!
//! - **Loader**: [`load`] parses IR text ([`parse_ir`]) and encodes bitcode
//! - **Model**: [`IrModule`], [`Function`], [`Instruction`], [`Value`], [`Type`]
//! - **Bitcode**: [`bitcode::encode`] / [`bitcode::decode`], a deterministic
//!   binary format that [`Module::from_bitcode`] loads independently
//! - **Emitter**: [`emit`] / [`Module::to_ir_text`] decompile back to text
//! - **QIS ABI**: [`qis`] names the runtime functions and output tags of
//!   compiled modules
//!
//! # Example
//!
//! ```rust
//! use qshot_ir::{Module, load};
//!
//! let source = r#"
//! define void @main() #0 {
//! entry:
//!   ret void
//! }
//! attributes #0 = { "entry_point" }
//! "#;
//!
//! let module = load(source).unwrap();
//! assert_eq!(module.ir().entry_point().map(|f| f.name.as_str()), Some("main"));
//!
//! let reloaded = Module::from_bitcode(module.bitcode()).unwrap();
//! assert_eq!(reloaded.ir(), module.ir());
//! ```

pub mod bitcode;
pub mod emitter;
pub mod error;
pub mod function;
pub mod instruction;
pub mod lexer;
pub mod module;
pub mod parser;
pub mod qis;
pub mod types;
pub mod value;

pub use emitter::emit;
pub use error::{BitcodeError, BitcodeResult, ParseError, ParseResult};
pub use function::{BasicBlock, Function, Param};
pub use instruction::{
    BinaryOp, CastOp, FloatPredicate, Instruction, InstructionKind, IntPredicate,
};
pub use module::{
    Attribute, AttributeGroup, ENTRY_POINT_ATTR, Global, Initializer, IrModule, MODULE_FLAGS,
    MetadataItem, MetadataNode, Module, ModuleFlag, NamedMetadata, TypeDef,
};
pub use parser::parse_ir;
pub use types::Type;
pub use value::{Constant, Operand, Value};

use tracing::debug;

/// Parse textual IR and produce a module with canonical bitcode.
///
/// Only syntax is checked here; profile rules are the validator's concern.
pub fn load(source: &str) -> ParseResult<Module> {
    let ir = parse_ir(source)?;
    let module = Module::from_ir(ir);
    debug!(
        functions = module.ir().functions.len(),
        bitcode_bytes = module.bitcode().len(),
        "Loaded IR module"
    );
    Ok(module)
}
