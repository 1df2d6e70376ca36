//! Bitcode reader.

use super::{
    ATTR_STR, ATTR_WORD, CONST_BOOL, CONST_FLOAT, CONST_GEP, CONST_GLOBAL, CONST_INT,
    CONST_INTTOPTR, CONST_NULL, CONST_POISON, CONST_UNDEF, CONST_ZERO, INIT_BYTES, INIT_CONST,
    MAGIC, MD_NODE, MD_NULL, MD_STR, MD_VALUE, OP_BINARY, OP_BR, OP_CALL, OP_CAST, OP_CONDBR,
    OP_FCMP, OP_ICMP, OP_OPAQUE, OP_PHI, OP_RET, OP_SELECT, OP_UNREACHABLE, TY_ARRAY, TY_DOUBLE,
    TY_FLOAT, TY_HALF, TY_INT, TY_LABEL, TY_METADATA, TY_NAMED, TY_OPAQUE_PTR, TY_STRUCT,
    TY_TYPED_PTR, TY_VOID, VALUE_CONST, VALUE_LOCAL, VERSION,
};
use crate::error::{BitcodeError, BitcodeResult};
use crate::function::{BasicBlock, Function, Param};
use crate::instruction::{
    BinaryOp, CastOp, FloatPredicate, Instruction, InstructionKind, IntPredicate,
};
use crate::module::{
    Attribute, AttributeGroup, Global, Initializer, IrModule, MetadataItem, MetadataNode,
    NamedMetadata, TypeDef,
};
use crate::types::Type;
use crate::value::{Constant, Operand, Value};

/// Cursor over a bitcode buffer.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Start reading at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Check the magic and version.
    pub fn header(&mut self) -> BitcodeResult<()> {
        if self.buf.len() < MAGIC.len() || &self.buf[..MAGIC.len()] != MAGIC {
            return Err(BitcodeError::BadMagic);
        }
        self.pos = MAGIC.len();
        let version = self.u8()?;
        if version != VERSION {
            return Err(BitcodeError::UnsupportedVersion {
                found: version,
                expected: VERSION,
            });
        }
        Ok(())
    }

    /// Fail if any bytes remain.
    pub fn finish(&self) -> BitcodeResult<()> {
        let remaining = self.buf.len() - self.pos;
        if remaining > 0 {
            return Err(BitcodeError::TrailingData { remaining });
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> BitcodeResult<&'a [u8]> {
        let available = self.buf.len() - self.pos;
        if n > available {
            return Err(BitcodeError::Truncated {
                offset: self.pos,
                needed: n - available,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> BitcodeResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn invalid(&self, what: &'static str, tag: u8) -> BitcodeError {
        BitcodeError::InvalidTag {
            what,
            tag,
            offset: self.pos.saturating_sub(1),
        }
    }

    pub fn u8(&mut self) -> BitcodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> BitcodeResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> BitcodeResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> BitcodeResult<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub fn f64(&mut self) -> BitcodeResult<f64> {
        Ok(f64::from_bits(self.u64()?))
    }

    pub fn bool(&mut self) -> BitcodeResult<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(self.invalid("bool", tag)),
        }
    }

    pub fn len(&mut self) -> BitcodeResult<usize> {
        Ok(self.u32()? as usize)
    }

    pub fn bytes(&mut self) -> BitcodeResult<Vec<u8>> {
        let n = self.len()?;
        Ok(self.take(n)?.to_vec())
    }

    pub fn str(&mut self) -> BitcodeResult<String> {
        let offset = self.pos;
        let bytes = self.bytes()?;
        String::from_utf8(bytes).map_err(|_| BitcodeError::InvalidUtf8 { offset })
    }

    pub fn opt_str(&mut self) -> BitcodeResult<Option<String>> {
        if self.bool()? {
            Ok(Some(self.str()?))
        } else {
            Ok(None)
        }
    }

    pub fn strings(&mut self) -> BitcodeResult<Vec<String>> {
        self.seq(Self::str)
    }

    fn seq<T>(&mut self, mut each: impl FnMut(&mut Self) -> BitcodeResult<T>) -> BitcodeResult<Vec<T>> {
        let n = self.len()?;
        // Every item takes at least one byte, so a count beyond the remaining
        // input is already known to be truncated.
        let mut items = Vec::with_capacity(n.min(self.buf.len() - self.pos));
        for _ in 0..n {
            items.push(each(self)?);
        }
        Ok(items)
    }

    fn keyword<T: Copy>(&mut self, what: &'static str, all: &[T]) -> BitcodeResult<T> {
        let tag = self.u8()?;
        all.get(usize::from(tag))
            .copied()
            .ok_or_else(|| self.invalid(what, tag))
    }

    // ── types and values ────────────────────────────────────────────────────

    pub fn ty(&mut self) -> BitcodeResult<Type> {
        let tag = self.u8()?;
        Ok(match tag {
            TY_VOID => Type::Void,
            TY_INT => Type::Int(self.u32()?),
            TY_HALF => Type::Half,
            TY_FLOAT => Type::Float,
            TY_DOUBLE => Type::Double,
            TY_OPAQUE_PTR => Type::Ptr(None),
            TY_TYPED_PTR => Type::Ptr(Some(Box::new(self.ty()?))),
            TY_NAMED => Type::Named(self.str()?),
            TY_ARRAY => {
                let len = self.u64()?;
                Type::Array(len, Box::new(self.ty()?))
            }
            TY_STRUCT => Type::Struct(self.seq(Self::ty)?),
            TY_LABEL => Type::Label,
            TY_METADATA => Type::Metadata,
            _ => return Err(self.invalid("type", tag)),
        })
    }

    pub fn constant(&mut self) -> BitcodeResult<Constant> {
        let tag = self.u8()?;
        Ok(match tag {
            CONST_INT => Constant::Int(self.i64()?),
            CONST_BOOL => Constant::Bool(self.bool()?),
            CONST_FLOAT => Constant::Float(self.f64()?),
            CONST_NULL => Constant::Null,
            CONST_UNDEF => Constant::Undef,
            CONST_POISON => Constant::Poison,
            CONST_ZERO => Constant::ZeroInit,
            CONST_GLOBAL => Constant::Global(self.str()?),
            CONST_INTTOPTR => {
                let value = self.i64()?;
                Constant::IntToPtr {
                    value,
                    ty: self.ty()?,
                }
            }
            CONST_GEP => Constant::GetElementPtr {
                inbounds: self.bool()?,
                source: self.ty()?,
                base_ty: self.ty()?,
                base: self.str()?,
                indices: self.seq(|r| Ok((r.ty()?, r.i64()?)))?,
            },
            _ => return Err(self.invalid("constant", tag)),
        })
    }

    pub fn value(&mut self) -> BitcodeResult<Value> {
        let tag = self.u8()?;
        match tag {
            VALUE_CONST => Ok(Value::Const(self.constant()?)),
            VALUE_LOCAL => Ok(Value::Local(self.str()?)),
            _ => Err(self.invalid("value", tag)),
        }
    }

    pub fn operand(&mut self) -> BitcodeResult<Operand> {
        Ok(Operand {
            ty: self.ty()?,
            attrs: self.strings()?,
            value: self.value()?,
        })
    }

    // ── instructions ────────────────────────────────────────────────────────

    pub fn instruction(&mut self) -> BitcodeResult<Instruction> {
        let result = self.opt_str()?;
        let tag = self.u8()?;
        let kind = match tag {
            OP_CALL => InstructionKind::Call {
                tail: self.opt_str()?,
                ret_attrs: self.strings()?,
                ret_ty: self.ty()?,
                callee: self.str()?,
                args: self.seq(Self::operand)?,
                attr_groups: self.seq(Self::u32)?,
            },
            OP_RET => {
                if self.bool()? {
                    InstructionKind::Ret(Some(self.operand()?))
                } else {
                    InstructionKind::Ret(None)
                }
            }
            OP_BR => InstructionKind::Br { dest: self.str()? },
            OP_CONDBR => InstructionKind::CondBr {
                cond: self.value()?,
                if_true: self.str()?,
                if_false: self.str()?,
            },
            OP_BINARY => InstructionKind::Binary {
                op: self.keyword("binary operator", BinaryOp::ALL)?,
                flags: self.strings()?,
                ty: self.ty()?,
                lhs: self.value()?,
                rhs: self.value()?,
            },
            OP_ICMP => InstructionKind::ICmp {
                pred: self.keyword("icmp predicate", IntPredicate::ALL)?,
                ty: self.ty()?,
                lhs: self.value()?,
                rhs: self.value()?,
            },
            OP_FCMP => InstructionKind::FCmp {
                flags: self.strings()?,
                pred: self.keyword("fcmp predicate", FloatPredicate::ALL)?,
                ty: self.ty()?,
                lhs: self.value()?,
                rhs: self.value()?,
            },
            OP_CAST => InstructionKind::Cast {
                op: self.keyword("cast operator", CastOp::ALL)?,
                value: self.operand()?,
                to: self.ty()?,
            },
            OP_SELECT => InstructionKind::Select {
                cond: self.operand()?,
                if_true: self.operand()?,
                if_false: self.operand()?,
            },
            OP_PHI => InstructionKind::Phi {
                ty: self.ty()?,
                incoming: self.seq(|r| Ok((r.value()?, r.str()?)))?,
            },
            OP_UNREACHABLE => InstructionKind::Unreachable,
            OP_OPAQUE => InstructionKind::Opaque {
                opcode: self.str()?,
                body: self.str()?,
            },
            _ => return Err(self.invalid("opcode", tag)),
        };
        Ok(Instruction { result, kind })
    }

    // ── module entities ─────────────────────────────────────────────────────

    fn param(&mut self) -> BitcodeResult<Param> {
        Ok(Param {
            ty: self.ty()?,
            attrs: self.strings()?,
            name: self.opt_str()?,
        })
    }

    fn block(&mut self) -> BitcodeResult<BasicBlock> {
        Ok(BasicBlock {
            label: self.str()?,
            instructions: self.seq(Self::instruction)?,
        })
    }

    fn function(&mut self) -> BitcodeResult<Function> {
        Ok(Function {
            name: self.str()?,
            qualifiers: self.strings()?,
            ret_ty: self.ty()?,
            params: self.seq(Self::param)?,
            variadic: self.bool()?,
            trailing: self.strings()?,
            attr_groups: self.seq(Self::u32)?,
            blocks: self.seq(Self::block)?,
        })
    }

    fn type_def(&mut self) -> BitcodeResult<TypeDef> {
        let name = self.str()?;
        let body = if self.bool()? {
            Some(self.seq(Self::ty)?)
        } else {
            None
        };
        Ok(TypeDef { name, body })
    }

    fn global(&mut self) -> BitcodeResult<Global> {
        let name = self.str()?;
        let qualifiers = self.strings()?;
        let is_constant = self.bool()?;
        let ty = self.ty()?;
        let tag = self.u8()?;
        let initializer = match tag {
            0 => None,
            INIT_BYTES => Some(Initializer::Bytes(self.bytes()?)),
            INIT_CONST => Some(Initializer::Constant(self.constant()?)),
            _ => return Err(self.invalid("initializer", tag)),
        };
        let align = if self.bool()? { Some(self.u64()?) } else { None };
        Ok(Global {
            name,
            qualifiers,
            is_constant,
            ty,
            initializer,
            align,
        })
    }

    fn attribute(&mut self) -> BitcodeResult<Attribute> {
        let tag = self.u8()?;
        match tag {
            ATTR_WORD => Ok(Attribute::Word(self.str()?)),
            ATTR_STR => Ok(Attribute::Str {
                key: self.str()?,
                value: self.opt_str()?,
            }),
            _ => Err(self.invalid("attribute", tag)),
        }
    }

    fn attribute_group(&mut self) -> BitcodeResult<AttributeGroup> {
        Ok(AttributeGroup {
            id: self.u32()?,
            attributes: self.seq(Self::attribute)?,
        })
    }

    fn metadata_item(&mut self) -> BitcodeResult<MetadataItem> {
        let tag = self.u8()?;
        Ok(match tag {
            MD_VALUE => MetadataItem::Value(self.ty()?, self.constant()?),
            MD_STR => MetadataItem::Str(self.str()?),
            MD_NODE => MetadataItem::Node(self.u32()?),
            MD_NULL => MetadataItem::Null,
            _ => return Err(self.invalid("metadata", tag)),
        })
    }

    fn named_metadata(&mut self) -> BitcodeResult<NamedMetadata> {
        Ok(NamedMetadata {
            name: self.str()?,
            nodes: self.seq(Self::u32)?,
        })
    }

    fn metadata_node(&mut self) -> BitcodeResult<MetadataNode> {
        Ok(MetadataNode {
            id: self.u32()?,
            distinct: self.bool()?,
            items: self.seq(Self::metadata_item)?,
        })
    }

    pub fn module(&mut self) -> BitcodeResult<IrModule> {
        Ok(IrModule {
            source_filename: self.opt_str()?,
            data_layout: self.opt_str()?,
            triple: self.opt_str()?,
            type_defs: self.seq(Self::type_def)?,
            globals: self.seq(Self::global)?,
            functions: self.seq(Self::function)?,
            attribute_groups: self.seq(Self::attribute_group)?,
            named_metadata: self.seq(Self::named_metadata)?,
            metadata: self.seq(Self::metadata_node)?,
        })
    }
}
