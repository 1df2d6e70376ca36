//! Bitcode writer.

use super::{
    ATTR_STR, ATTR_WORD, CONST_BOOL, CONST_FLOAT, CONST_GEP, CONST_GLOBAL, CONST_INT,
    CONST_INTTOPTR, CONST_NULL, CONST_POISON, CONST_UNDEF, CONST_ZERO, INIT_BYTES, INIT_CONST,
    MD_NODE, MD_NULL, MD_STR, MD_VALUE, OP_BINARY, OP_CALL, OP_CAST, OP_CONDBR, OP_FCMP, OP_ICMP,
    OP_OPAQUE, OP_PHI, OP_RET, OP_SELECT, OP_UNREACHABLE, OP_BR, TY_ARRAY, TY_DOUBLE, TY_FLOAT,
    TY_HALF, TY_INT, TY_LABEL, TY_METADATA, TY_NAMED, TY_OPAQUE_PTR, TY_STRUCT, TY_TYPED_PTR,
    TY_VOID, VALUE_CONST, VALUE_LOCAL,
};
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

/// Append-only byte sink.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

/// Position of a keyword variant in its `ALL` table.
fn keyword_index<T: PartialEq>(all: &[T], item: &T) -> u8 {
    all.iter()
        .position(|x| x == item)
        .and_then(|i| u8::try_from(i).ok())
        .unwrap_or(u8::MAX)
}

impl Writer {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the written bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f64(&mut self, v: f64) {
        self.u64(v.to_bits());
    }

    pub fn bool(&mut self, v: bool) {
        self.u8(u8::from(v));
    }

    /// Sequence or byte length. Modules never approach `u32::MAX` entries.
    #[allow(clippy::cast_possible_truncation)]
    pub fn len(&mut self, n: usize) {
        self.u32(n as u32);
    }

    pub fn bytes(&mut self, v: &[u8]) {
        self.len(v.len());
        self.raw(v);
    }

    pub fn str(&mut self, v: &str) {
        self.bytes(v.as_bytes());
    }

    pub fn opt_str(&mut self, v: Option<&str>) {
        match v {
            Some(s) => {
                self.u8(1);
                self.str(s);
            }
            None => self.u8(0),
        }
    }

    pub fn strings(&mut self, v: &[String]) {
        self.len(v.len());
        for s in v {
            self.str(s);
        }
    }

    fn seq<T>(&mut self, items: &[T], mut each: impl FnMut(&mut Self, &T)) {
        self.len(items.len());
        for item in items {
            each(self, item);
        }
    }

    // ── types and values ────────────────────────────────────────────────────

    pub fn ty(&mut self, ty: &Type) {
        match ty {
            Type::Void => self.u8(TY_VOID),
            Type::Int(w) => {
                self.u8(TY_INT);
                self.u32(*w);
            }
            Type::Half => self.u8(TY_HALF),
            Type::Float => self.u8(TY_FLOAT),
            Type::Double => self.u8(TY_DOUBLE),
            Type::Ptr(None) => self.u8(TY_OPAQUE_PTR),
            Type::Ptr(Some(inner)) => {
                self.u8(TY_TYPED_PTR);
                self.ty(inner);
            }
            Type::Named(name) => {
                self.u8(TY_NAMED);
                self.str(name);
            }
            Type::Array(len, elem) => {
                self.u8(TY_ARRAY);
                self.u64(*len);
                self.ty(elem);
            }
            Type::Struct(fields) => {
                self.u8(TY_STRUCT);
                self.seq(fields, Self::ty);
            }
            Type::Label => self.u8(TY_LABEL),
            Type::Metadata => self.u8(TY_METADATA),
        }
    }

    pub fn constant(&mut self, c: &Constant) {
        match c {
            Constant::Int(v) => {
                self.u8(CONST_INT);
                self.i64(*v);
            }
            Constant::Bool(b) => {
                self.u8(CONST_BOOL);
                self.bool(*b);
            }
            Constant::Float(v) => {
                self.u8(CONST_FLOAT);
                self.f64(*v);
            }
            Constant::Null => self.u8(CONST_NULL),
            Constant::Undef => self.u8(CONST_UNDEF),
            Constant::Poison => self.u8(CONST_POISON),
            Constant::ZeroInit => self.u8(CONST_ZERO),
            Constant::Global(name) => {
                self.u8(CONST_GLOBAL);
                self.str(name);
            }
            Constant::IntToPtr { value, ty } => {
                self.u8(CONST_INTTOPTR);
                self.i64(*value);
                self.ty(ty);
            }
            Constant::GetElementPtr {
                inbounds,
                source,
                base_ty,
                base,
                indices,
            } => {
                self.u8(CONST_GEP);
                self.bool(*inbounds);
                self.ty(source);
                self.ty(base_ty);
                self.str(base);
                self.seq(indices, |w, (ty, idx)| {
                    w.ty(ty);
                    w.i64(*idx);
                });
            }
        }
    }

    pub fn value(&mut self, v: &Value) {
        match v {
            Value::Const(c) => {
                self.u8(VALUE_CONST);
                self.constant(c);
            }
            Value::Local(name) => {
                self.u8(VALUE_LOCAL);
                self.str(name);
            }
        }
    }

    pub fn operand(&mut self, op: &Operand) {
        self.ty(&op.ty);
        self.strings(&op.attrs);
        self.value(&op.value);
    }

    // ── instructions ────────────────────────────────────────────────────────

    pub fn instruction(&mut self, inst: &Instruction) {
        self.opt_str(inst.result.as_deref());
        match &inst.kind {
            InstructionKind::Call {
                tail,
                ret_attrs,
                ret_ty,
                callee,
                args,
                attr_groups,
            } => {
                self.u8(OP_CALL);
                self.opt_str(tail.as_deref());
                self.strings(ret_attrs);
                self.ty(ret_ty);
                self.str(callee);
                self.seq(args, Self::operand);
                self.seq(attr_groups, |w, id| w.u32(*id));
            }
            InstructionKind::Ret(op) => {
                self.u8(OP_RET);
                match op {
                    Some(op) => {
                        self.u8(1);
                        self.operand(op);
                    }
                    None => self.u8(0),
                }
            }
            InstructionKind::Br { dest } => {
                self.u8(OP_BR);
                self.str(dest);
            }
            InstructionKind::CondBr {
                cond,
                if_true,
                if_false,
            } => {
                self.u8(OP_CONDBR);
                self.value(cond);
                self.str(if_true);
                self.str(if_false);
            }
            InstructionKind::Binary {
                op,
                flags,
                ty,
                lhs,
                rhs,
            } => {
                self.u8(OP_BINARY);
                self.u8(keyword_index(BinaryOp::ALL, op));
                self.strings(flags);
                self.ty(ty);
                self.value(lhs);
                self.value(rhs);
            }
            InstructionKind::ICmp { pred, ty, lhs, rhs } => {
                self.u8(OP_ICMP);
                self.u8(keyword_index(IntPredicate::ALL, pred));
                self.ty(ty);
                self.value(lhs);
                self.value(rhs);
            }
            InstructionKind::FCmp {
                flags,
                pred,
                ty,
                lhs,
                rhs,
            } => {
                self.u8(OP_FCMP);
                self.strings(flags);
                self.u8(keyword_index(FloatPredicate::ALL, pred));
                self.ty(ty);
                self.value(lhs);
                self.value(rhs);
            }
            InstructionKind::Cast { op, value, to } => {
                self.u8(OP_CAST);
                self.u8(keyword_index(CastOp::ALL, op));
                self.operand(value);
                self.ty(to);
            }
            InstructionKind::Select {
                cond,
                if_true,
                if_false,
            } => {
                self.u8(OP_SELECT);
                self.operand(cond);
                self.operand(if_true);
                self.operand(if_false);
            }
            InstructionKind::Phi { ty, incoming } => {
                self.u8(OP_PHI);
                self.ty(ty);
                self.seq(incoming, |w, (v, label)| {
                    w.value(v);
                    w.str(label);
                });
            }
            InstructionKind::Unreachable => self.u8(OP_UNREACHABLE),
            InstructionKind::Opaque { opcode, body } => {
                self.u8(OP_OPAQUE);
                self.str(opcode);
                self.str(body);
            }
        }
    }

    // ── module entities ─────────────────────────────────────────────────────

    fn param(&mut self, p: &Param) {
        self.ty(&p.ty);
        self.strings(&p.attrs);
        self.opt_str(p.name.as_deref());
    }

    fn block(&mut self, b: &BasicBlock) {
        self.str(&b.label);
        self.seq(&b.instructions, Self::instruction);
    }

    fn function(&mut self, f: &Function) {
        self.str(&f.name);
        self.strings(&f.qualifiers);
        self.ty(&f.ret_ty);
        self.seq(&f.params, Self::param);
        self.bool(f.variadic);
        self.strings(&f.trailing);
        self.seq(&f.attr_groups, |w, id| w.u32(*id));
        self.seq(&f.blocks, Self::block);
    }

    fn type_def(&mut self, def: &TypeDef) {
        self.str(&def.name);
        match &def.body {
            Some(fields) => {
                self.u8(1);
                self.seq(fields, Self::ty);
            }
            None => self.u8(0),
        }
    }

    fn global(&mut self, g: &Global) {
        self.str(&g.name);
        self.strings(&g.qualifiers);
        self.bool(g.is_constant);
        self.ty(&g.ty);
        match &g.initializer {
            None => self.u8(0),
            Some(Initializer::Bytes(bytes)) => {
                self.u8(INIT_BYTES);
                self.bytes(bytes);
            }
            Some(Initializer::Constant(c)) => {
                self.u8(INIT_CONST);
                self.constant(c);
            }
        }
        match g.align {
            Some(a) => {
                self.u8(1);
                self.u64(a);
            }
            None => self.u8(0),
        }
    }

    fn attribute_group(&mut self, group: &AttributeGroup) {
        self.u32(group.id);
        self.seq(&group.attributes, |w, attr| match attr {
            Attribute::Word(word) => {
                w.u8(ATTR_WORD);
                w.str(word);
            }
            Attribute::Str { key, value } => {
                w.u8(ATTR_STR);
                w.str(key);
                w.opt_str(value.as_deref());
            }
        });
    }

    fn metadata_item(&mut self, item: &MetadataItem) {
        match item {
            MetadataItem::Value(ty, c) => {
                self.u8(MD_VALUE);
                self.ty(ty);
                self.constant(c);
            }
            MetadataItem::Str(s) => {
                self.u8(MD_STR);
                self.str(s);
            }
            MetadataItem::Node(id) => {
                self.u8(MD_NODE);
                self.u32(*id);
            }
            MetadataItem::Null => self.u8(MD_NULL),
        }
    }

    fn named_metadata(&mut self, named: &NamedMetadata) {
        self.str(&named.name);
        self.seq(&named.nodes, |w, id| w.u32(*id));
    }

    fn metadata_node(&mut self, node: &MetadataNode) {
        self.u32(node.id);
        self.bool(node.distinct);
        self.seq(&node.items, Self::metadata_item);
    }

    pub fn module(&mut self, m: &IrModule) {
        self.opt_str(m.source_filename.as_deref());
        self.opt_str(m.data_layout.as_deref());
        self.opt_str(m.triple.as_deref());
        self.seq(&m.type_defs, Self::type_def);
        self.seq(&m.globals, Self::global);
        self.seq(&m.functions, Self::function);
        self.seq(&m.attribute_groups, Self::attribute_group);
        self.seq(&m.named_metadata, Self::named_metadata);
        self.seq(&m.metadata, Self::metadata_node);
    }
}
