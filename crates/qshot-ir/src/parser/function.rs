//! Functions, basic blocks and instructions.

use rustc_hash::FxHashSet;

use crate::error::{ParseError, ParseResult};
use crate::function::{BasicBlock, Function, Param};
use crate::instruction::{
    BinaryOp, CastOp, FloatPredicate, Instruction, InstructionKind, IntPredicate, OPAQUE_OPCODES,
};
use crate::lexer::Token;
use crate::types::Type;

use super::Parser;

/// Arithmetic and fast-math flags.
const FLAG_WORDS: &[&str] = &[
    "nuw", "nsw", "exact", "disjoint", "fast", "nnan", "ninf", "nsz", "arcp", "contract", "afn",
    "reassoc",
];

impl Parser<'_> {
    /// `define ... { ... }` or `declare ...`.
    pub(super) fn parse_function(&mut self) -> ParseResult<Function> {
        let is_define = match self.parse_word()?.as_str() {
            "define" => true,
            "declare" => false,
            other => return Err(self.unexpected("define or declare", &Token::Word(other.to_string()))),
        };

        let mut qualifiers = Vec::new();
        while let Some(Token::Word(w)) = self.peek() {
            if Type::is_type_word(w) {
                break;
            }
            qualifiers.push(self.parse_word()?);
        }
        let ret_ty = self.parse_type()?;
        let name = match self.next_token("function name")? {
            Token::GlobalIdent(name) => name,
            other => return Err(self.unexpected("function name", &other)),
        };

        self.expect(Token::LParen)?;
        let (params, variadic) = self.parse_params()?;

        let mut trailing = Vec::new();
        let mut attr_groups = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Word(_)) => {
                    let mut word = self.parse_word()?;
                    if self.check(&Token::LParen) {
                        word.push_str(&self.parenthesized_text()?);
                    }
                    trailing.push(word);
                }
                Some(Token::AttrGroupRef(id)) => {
                    attr_groups.push(*id);
                    self.advance();
                }
                Some(Token::MetadataName(_)) => {
                    self.advance();
                    self.advance();
                }
                _ => break,
            }
        }

        let blocks = if is_define {
            self.expect(Token::LBrace)?;
            let implicit = params.iter().filter(|p| p.name.is_none()).count();
            let blocks = self.parse_blocks(&implicit.to_string())?;
            if blocks.is_empty() {
                return Err(self.error(format!("function @{name} has an empty body")));
            }
            blocks
        } else {
            Vec::new()
        };

        Ok(Function {
            name,
            qualifiers,
            ret_ty,
            params,
            variadic,
            trailing,
            attr_groups,
            blocks,
        })
    }

    /// Parameter list after `(`.
    fn parse_params(&mut self) -> ParseResult<(Vec<Param>, bool)> {
        let mut params = Vec::new();
        if self.consume(&Token::RParen) {
            return Ok((params, false));
        }
        loop {
            if self.consume(&Token::Ellipsis) {
                self.expect(Token::RParen)?;
                return Ok((params, true));
            }
            let ty = self.parse_type()?;
            let attrs = self.parse_param_attrs()?;
            let name = if let Some(Token::LocalIdent(_)) = self.peek() {
                Some(self.parse_local()?)
            } else {
                None
            };
            params.push(Param { ty, attrs, name });
            if self.consume(&Token::RParen) {
                return Ok((params, false));
            }
            self.expect(Token::Comma)?;
        }
    }

    /// Basic blocks up to and including the closing `}`.
    fn parse_blocks(&mut self, implicit_label: &str) -> ParseResult<Vec<BasicBlock>> {
        let mut blocks: Vec<BasicBlock> = Vec::new();
        let mut labels = FxHashSet::default();
        loop {
            self.skip_newlines();
            match self.peek() {
                None => return Err(ParseError::UnexpectedEof("expected '}'".to_string())),
                Some(Token::RBrace) => {
                    self.advance();
                    return Ok(blocks);
                }
                Some(Token::LabelDef(label)) => {
                    let label = label.clone();
                    self.advance();
                    if !labels.insert(label.clone()) {
                        return Err(ParseError::DuplicateDefinition {
                            line: self.line,
                            name: format!("%{label}"),
                        });
                    }
                    blocks.push(BasicBlock {
                        label,
                        instructions: Vec::new(),
                    });
                    self.end_of_line()?;
                }
                Some(_) => {
                    if blocks.is_empty() {
                        labels.insert(implicit_label.to_string());
                        blocks.push(BasicBlock {
                            label: implicit_label.to_string(),
                            instructions: Vec::new(),
                        });
                    }
                    let instruction = self.parse_instruction()?;
                    if let Some(block) = blocks.last_mut() {
                        block.instructions.push(instruction);
                    }
                }
            }
        }
    }

    /// One instruction line.
    fn parse_instruction(&mut self) -> ParseResult<Instruction> {
        let result = if let Some(Token::LocalIdent(_)) = self.peek() {
            let name = self.parse_local()?;
            self.expect(Token::Equals)?;
            Some(name)
        } else {
            None
        };

        let opcode = match self.next_token("instruction")? {
            Token::Word(w) => w,
            other => return Err(self.unexpected("instruction", &other)),
        };

        let kind = match opcode.as_str() {
            "tail" | "musttail" | "notail" => {
                self.expect_word("call")?;
                self.parse_call(Some(opcode.clone()))?
            }
            "call" => self.parse_call(None)?,
            "ret" => {
                if self.consume_word("void") {
                    InstructionKind::Ret(None)
                } else {
                    InstructionKind::Ret(Some(self.parse_operand()?))
                }
            }
            "br" => self.parse_br()?,
            "icmp" => {
                let pred = self.parse_word()?;
                let pred = IntPredicate::from_keyword(&pred)
                    .ok_or_else(|| self.error(format!("invalid icmp predicate '{pred}'")))?;
                let (ty, lhs, rhs) = self.parse_typed_pair()?;
                InstructionKind::ICmp { pred, ty, lhs, rhs }
            }
            "fcmp" => {
                let flags = self.parse_flags();
                let pred = self.parse_word()?;
                let pred = FloatPredicate::from_keyword(&pred)
                    .ok_or_else(|| self.error(format!("invalid fcmp predicate '{pred}'")))?;
                let (ty, lhs, rhs) = self.parse_typed_pair()?;
                InstructionKind::FCmp {
                    flags,
                    pred,
                    ty,
                    lhs,
                    rhs,
                }
            }
            "select" => {
                let cond = self.parse_operand()?;
                self.expect(Token::Comma)?;
                let if_true = self.parse_operand()?;
                self.expect(Token::Comma)?;
                let if_false = self.parse_operand()?;
                InstructionKind::Select {
                    cond,
                    if_true,
                    if_false,
                }
            }
            "phi" => self.parse_phi()?,
            "unreachable" => InstructionKind::Unreachable,
            word => {
                if let Some(op) = BinaryOp::from_keyword(word) {
                    let flags = self.parse_flags();
                    let (ty, lhs, rhs) = self.parse_typed_pair()?;
                    InstructionKind::Binary {
                        op,
                        flags,
                        ty,
                        lhs,
                        rhs,
                    }
                } else if let Some(op) = CastOp::from_keyword(word) {
                    let value = self.parse_operand()?;
                    self.expect_word("to")?;
                    let to = self.parse_type()?;
                    InstructionKind::Cast { op, value, to }
                } else if OPAQUE_OPCODES.contains(&word) {
                    InstructionKind::Opaque {
                        opcode: opcode.clone(),
                        body: self.rest_of_line(),
                    }
                } else {
                    return Err(ParseError::UnknownInstruction {
                        line: self.line,
                        opcode: opcode.clone(),
                    });
                }
            }
        };

        // Metadata attachments such as `, !dbg !12` carry nothing we model.
        while self.check(&Token::Comma)
            && matches!(self.peek_nth(1), Some(Token::MetadataName(_)))
        {
            self.advance();
            self.advance();
            self.advance();
        }
        if !self.check(&Token::RBrace) {
            self.end_of_line()?;
        }

        Ok(Instruction { result, kind })
    }

    /// Flag words before an operand type.
    fn parse_flags(&mut self) -> Vec<String> {
        let mut flags = Vec::new();
        while let Some(Token::Word(w)) = self.peek() {
            if !FLAG_WORDS.contains(&w.as_str()) {
                break;
            }
            flags.push(w.clone());
            self.advance();
        }
        flags
    }

    /// `T a, b`
    fn parse_typed_pair(&mut self) -> ParseResult<(Type, crate::value::Value, crate::value::Value)> {
        let ty = self.parse_type()?;
        let lhs = self.parse_value(&ty)?;
        self.expect(Token::Comma)?;
        let rhs = self.parse_value(&ty)?;
        Ok((ty, lhs, rhs))
    }

    /// Call after the `call` keyword.
    fn parse_call(&mut self, tail: Option<String>) -> ParseResult<InstructionKind> {
        let mut ret_attrs = Vec::new();
        while let Some(Token::Word(w)) = self.peek() {
            if Type::is_type_word(w) {
                break;
            }
            ret_attrs.push(self.parse_word()?);
        }
        let ret_ty = self.parse_type()?;
        let callee = match self.next_token("callee")? {
            Token::GlobalIdent(name) => name,
            other => return Err(self.unexpected("direct callee", &other)),
        };

        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if !self.consume(&Token::RParen) {
            loop {
                args.push(self.parse_operand()?);
                if self.consume(&Token::RParen) {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }

        let mut attr_groups = Vec::new();
        while let Some(Token::AttrGroupRef(id)) = self.peek() {
            attr_groups.push(*id);
            self.advance();
        }

        Ok(InstructionKind::Call {
            tail,
            ret_attrs,
            ret_ty,
            callee,
            args,
            attr_groups,
        })
    }

    /// Branch after the `br` keyword.
    fn parse_br(&mut self) -> ParseResult<InstructionKind> {
        if self.consume_word("label") {
            let dest = self.parse_local()?;
            return Ok(InstructionKind::Br { dest });
        }
        let ty = self.parse_type()?;
        let cond = self.parse_value(&ty)?;
        self.expect(Token::Comma)?;
        self.expect_word("label")?;
        let if_true = self.parse_local()?;
        self.expect(Token::Comma)?;
        self.expect_word("label")?;
        let if_false = self.parse_local()?;
        Ok(InstructionKind::CondBr {
            cond,
            if_true,
            if_false,
        })
    }

    /// Phi after the `phi` keyword.
    fn parse_phi(&mut self) -> ParseResult<InstructionKind> {
        let ty = self.parse_type()?;
        let mut incoming = Vec::new();
        loop {
            self.expect(Token::LBracket)?;
            let value = self.parse_value(&ty)?;
            self.expect(Token::Comma)?;
            let label = self.parse_local()?;
            self.expect(Token::RBracket)?;
            incoming.push((value, label));
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        Ok(InstructionKind::Phi { ty, incoming })
    }
}
