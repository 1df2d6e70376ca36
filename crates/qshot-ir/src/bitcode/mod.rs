//! Binary bitcode serialization of module contents.
//!
//! ## Wire format
//!
//! ```text
//! Header: b"QSBC" | version(u8=1)
//! Module: source_filename(opt str) | datalayout(opt str) | triple(opt str)
//!   | type_defs(seq) | globals(seq) | functions(seq)
//!   | attribute_groups(seq) | named_metadata(seq) | metadata(seq)
//! Function: name | qualifiers | ret_ty | params(seq) | variadic(u8)
//!   | trailing | attr_groups(seq u32) | blocks(seq)
//! Block: label | instructions(seq)
//! Instruction: result(opt str) | opcode(u8) + fields (see OP_* below)
//! ```
//!
//! Integers are little-endian, strings are a `u32` byte length followed by
//! UTF-8, sequences are a `u32` count followed by the items, and optional
//! values carry a leading presence byte. The encoding is deterministic: equal
//! module contents always produce identical bytes.

mod reader;
mod writer;

use crate::error::BitcodeResult;
use crate::module::IrModule;

pub use reader::Reader;
pub use writer::Writer;

/// Leading bytes of every artifact.
pub const MAGIC: &[u8; 4] = b"QSBC";

/// Current format version.
pub const VERSION: u8 = 1;

// ── types ───────────────────────────────────────────────────────────────────
const TY_VOID: u8 = 0x01;
const TY_INT: u8 = 0x02;
const TY_HALF: u8 = 0x03;
const TY_FLOAT: u8 = 0x04;
const TY_DOUBLE: u8 = 0x05;
const TY_OPAQUE_PTR: u8 = 0x06;
const TY_TYPED_PTR: u8 = 0x07;
const TY_NAMED: u8 = 0x08;
const TY_ARRAY: u8 = 0x09;
const TY_STRUCT: u8 = 0x0A;
const TY_LABEL: u8 = 0x0B;
const TY_METADATA: u8 = 0x0C;

// ── constants and values ────────────────────────────────────────────────────
const CONST_INT: u8 = 0x01;
const CONST_BOOL: u8 = 0x02;
const CONST_FLOAT: u8 = 0x03;
const CONST_NULL: u8 = 0x04;
const CONST_UNDEF: u8 = 0x05;
const CONST_POISON: u8 = 0x06;
const CONST_ZERO: u8 = 0x07;
const CONST_GLOBAL: u8 = 0x08;
const CONST_INTTOPTR: u8 = 0x09;
const CONST_GEP: u8 = 0x0A;
const VALUE_CONST: u8 = 0x01;
const VALUE_LOCAL: u8 = 0x02;

// ── opcodes ─────────────────────────────────────────────────────────────────
const OP_CALL: u8 = 0x01;
const OP_RET: u8 = 0x02;
const OP_BR: u8 = 0x03;
const OP_CONDBR: u8 = 0x04;
const OP_BINARY: u8 = 0x05;
const OP_ICMP: u8 = 0x06;
const OP_FCMP: u8 = 0x07;
const OP_CAST: u8 = 0x08;
const OP_SELECT: u8 = 0x09;
const OP_PHI: u8 = 0x0A;
const OP_UNREACHABLE: u8 = 0x0B;
const OP_OPAQUE: u8 = 0x0C;

// ── module entities ─────────────────────────────────────────────────────────
const INIT_BYTES: u8 = 0x01;
const INIT_CONST: u8 = 0x02;
const ATTR_WORD: u8 = 0x01;
const ATTR_STR: u8 = 0x02;
const MD_VALUE: u8 = 0x01;
const MD_STR: u8 = 0x02;
const MD_NODE: u8 = 0x03;
const MD_NULL: u8 = 0x04;

/// Encode module contents to bitcode.
pub fn encode(module: &IrModule) -> Vec<u8> {
    let mut w = Writer::new();
    w.raw(MAGIC);
    w.u8(VERSION);
    w.module(module);
    w.finish()
}

/// Decode bitcode to module contents.
pub fn decode(bytes: &[u8]) -> BitcodeResult<IrModule> {
    let mut r = Reader::new(bytes);
    r.header()?;
    let module = r.module()?;
    r.finish()?;
    Ok(module)
}
