//! Textual IR emitter.
//!
//! Output re-parses to the same module contents; formatting follows the
//! usual LLVM layout but is not guaranteed to match the original source.

use std::fmt::Write;

use crate::function::Function;
use crate::instruction::{Instruction, InstructionKind};
use crate::module::{Attribute, Global, Initializer, IrModule, MetadataItem};
use crate::value::{Sigil, escape};

/// Emit module contents as textual IR.
pub fn emit(module: &IrModule) -> String {
    let mut emitter = Emitter::new();
    emitter.emit_module(module);
    emitter.output
}

/// IR emitter.
struct Emitter {
    output: String,
}

impl Emitter {
    fn new() -> Self {
        Self {
            output: String::new(),
        }
    }

    fn line(&mut self, text: &str) {
        self.output.push_str(text);
        self.output.push('\n');
    }

    fn emit_module(&mut self, module: &IrModule) {
        if let Some(name) = &module.source_filename {
            self.line(&format!("source_filename = \"{}\"", escape(name.as_bytes())));
        }
        if let Some(layout) = &module.data_layout {
            self.line(&format!("target datalayout = \"{}\"", escape(layout.as_bytes())));
        }
        if let Some(triple) = &module.triple {
            self.line(&format!("target triple = \"{}\"", escape(triple.as_bytes())));
        }
        self.line("");

        if !module.type_defs.is_empty() {
            for def in &module.type_defs {
                let name = Sigil::Local.ident(&def.name);
                match &def.body {
                    None => self.line(&format!("{name} = type opaque")),
                    Some(fields) => {
                        let body = crate::types::Type::Struct(fields.clone());
                        self.line(&format!("{name} = type {body}"));
                    }
                }
            }
            self.line("");
        }

        if !module.globals.is_empty() {
            for global in &module.globals {
                let text = Self::global(global);
                self.line(&text);
            }
            self.line("");
        }

        for function in &module.functions {
            self.emit_function(function);
        }

        for group in &module.attribute_groups {
            let mut text = format!("attributes #{} = {{", group.id);
            for attr in &group.attributes {
                match attr {
                    Attribute::Word(w) => {
                        let _ = write!(text, " {w}");
                    }
                    Attribute::Str { key, value: None } => {
                        let _ = write!(text, " \"{}\"", escape(key.as_bytes()));
                    }
                    Attribute::Str {
                        key,
                        value: Some(value),
                    } => {
                        let _ = write!(
                            text,
                            " \"{}\"=\"{}\"",
                            escape(key.as_bytes()),
                            escape(value.as_bytes())
                        );
                    }
                }
            }
            text.push_str(" }");
            self.line(&text);
        }
        if !module.attribute_groups.is_empty() {
            self.line("");
        }

        for named in &module.named_metadata {
            let nodes: Vec<String> = named.nodes.iter().map(|n| format!("!{n}")).collect();
            self.line(&format!("!{} = !{{{}}}", named.name, nodes.join(", ")));
        }
        if !module.named_metadata.is_empty() {
            self.line("");
        }
        for node in &module.metadata {
            let items: Vec<String> = node.items.iter().map(Self::metadata_item).collect();
            let distinct = if node.distinct { "distinct " } else { "" };
            self.line(&format!("!{} = {distinct}!{{{}}}", node.id, items.join(", ")));
        }
    }

    fn global(global: &Global) -> String {
        let mut text = format!("{} =", Sigil::Global.ident(&global.name));
        for q in &global.qualifiers {
            let _ = write!(text, " {q}");
        }
        let kind = if global.is_constant {
            "constant"
        } else {
            "global"
        };
        let _ = write!(text, " {kind} {}", global.ty);
        match &global.initializer {
            Some(Initializer::Bytes(bytes)) => {
                let _ = write!(text, " c\"{}\"", escape(bytes));
            }
            Some(Initializer::Constant(c)) => {
                let _ = write!(text, " {c}");
            }
            None => {}
        }
        if let Some(align) = global.align {
            let _ = write!(text, ", align {align}");
        }
        text
    }

    fn metadata_item(item: &MetadataItem) -> String {
        match item {
            MetadataItem::Value(ty, c) => format!("{ty} {c}"),
            MetadataItem::Str(s) => format!("!\"{}\"", escape(s.as_bytes())),
            MetadataItem::Node(id) => format!("!{id}"),
            MetadataItem::Null => "null".to_string(),
        }
    }

    fn emit_function(&mut self, function: &Function) {
        let keyword = if function.is_declaration() {
            "declare"
        } else {
            "define"
        };
        let mut header = keyword.to_string();
        for q in &function.qualifiers {
            let _ = write!(header, " {q}");
        }
        let _ = write!(
            header,
            " {} {}(",
            function.ret_ty,
            Sigil::Global.ident(&function.name)
        );
        let mut params: Vec<String> = function
            .params
            .iter()
            .map(|p| {
                let mut text = p.ty.to_string();
                for attr in &p.attrs {
                    let _ = write!(text, " {attr}");
                }
                if let Some(name) = &p.name {
                    let _ = write!(text, " {}", Sigil::Local.ident(name));
                }
                text
            })
            .collect();
        if function.variadic {
            params.push("...".to_string());
        }
        header.push_str(&params.join(", "));
        header.push(')');
        for word in &function.trailing {
            let _ = write!(header, " {word}");
        }
        for id in &function.attr_groups {
            let _ = write!(header, " #{id}");
        }

        if function.is_declaration() {
            self.line(&header);
            self.line("");
            return;
        }

        header.push_str(" {");
        self.line(&header);
        for (i, block) in function.blocks.iter().enumerate() {
            if i > 0 {
                self.line("");
            }
            let label = Sigil::Local.ident(&block.label);
            self.line(&format!("{}:", &label[1..]));
            for instruction in &block.instructions {
                let text = format!("  {}", Self::instruction(instruction));
                self.line(&text);
            }
        }
        self.line("}");
        self.line("");
    }

    /// Render one instruction without indentation.
    fn instruction(instruction: &Instruction) -> String {
        let mut text = String::new();
        if let Some(result) = &instruction.result {
            let _ = write!(text, "{} = ", Sigil::Local.ident(result));
        }
        match &instruction.kind {
            InstructionKind::Call {
                tail,
                ret_attrs,
                ret_ty,
                callee,
                args,
                attr_groups,
            } => {
                if let Some(tail) = tail {
                    let _ = write!(text, "{tail} ");
                }
                text.push_str("call");
                for attr in ret_attrs {
                    let _ = write!(text, " {attr}");
                }
                let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                let _ = write!(
                    text,
                    " {ret_ty} {}({})",
                    Sigil::Global.ident(callee),
                    args.join(", ")
                );
                for id in attr_groups {
                    let _ = write!(text, " #{id}");
                }
            }
            InstructionKind::Ret(None) => text.push_str("ret void"),
            InstructionKind::Ret(Some(op)) => {
                let _ = write!(text, "ret {op}");
            }
            InstructionKind::Br { dest } => {
                let _ = write!(text, "br label {}", Sigil::Local.ident(dest));
            }
            InstructionKind::CondBr {
                cond,
                if_true,
                if_false,
            } => {
                let _ = write!(
                    text,
                    "br i1 {cond}, label {}, label {}",
                    Sigil::Local.ident(if_true),
                    Sigil::Local.ident(if_false)
                );
            }
            InstructionKind::Binary {
                op,
                flags,
                ty,
                lhs,
                rhs,
            } => {
                text.push_str(op.keyword());
                for flag in flags {
                    let _ = write!(text, " {flag}");
                }
                let _ = write!(text, " {ty} {lhs}, {rhs}");
            }
            InstructionKind::ICmp { pred, ty, lhs, rhs } => {
                let _ = write!(text, "icmp {pred} {ty} {lhs}, {rhs}");
            }
            InstructionKind::FCmp {
                flags,
                pred,
                ty,
                lhs,
                rhs,
            } => {
                text.push_str("fcmp");
                for flag in flags {
                    let _ = write!(text, " {flag}");
                }
                let _ = write!(text, " {pred} {ty} {lhs}, {rhs}");
            }
            InstructionKind::Cast { op, value, to } => {
                let _ = write!(text, "{op} {value} to {to}");
            }
            InstructionKind::Select {
                cond,
                if_true,
                if_false,
            } => {
                let _ = write!(text, "select {cond}, {if_true}, {if_false}");
            }
            InstructionKind::Phi { ty, incoming } => {
                let arms: Vec<String> = incoming
                    .iter()
                    .map(|(v, label)| format!("[ {v}, {} ]", Sigil::Local.ident(label)))
                    .collect();
                let _ = write!(text, "phi {ty} {}", arms.join(", "));
            }
            InstructionKind::Unreachable => text.push_str("unreachable"),
            InstructionKind::Opaque { opcode, body } => {
                text.push_str(opcode);
                if !body.is_empty() {
                    let _ = write!(text, " {body}");
                }
            }
        }
        text
    }
}
