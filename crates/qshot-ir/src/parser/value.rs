//! Types, constants, operands and metadata items.

use crate::error::ParseResult;
use crate::lexer::Token;
use crate::module::MetadataItem;
use crate::types::Type;
use crate::value::{Constant, Operand, Value};

use super::Parser;

/// Words that start a constant rather than a parameter attribute.
const CONSTANT_WORDS: &[&str] = &[
    "true",
    "false",
    "null",
    "undef",
    "poison",
    "zeroinitializer",
    "inttoptr",
    "getelementptr",
];

impl Parser<'_> {
    /// Parse a type, including trailing `*`s.
    pub(super) fn parse_type(&mut self) -> ParseResult<Type> {
        let base = match self.next_token("type")? {
            Token::Word(w) => match w.as_str() {
                "void" => Type::Void,
                "half" => Type::Half,
                "float" => Type::Float,
                "double" => Type::Double,
                "ptr" => Type::Ptr(None),
                "label" => Type::Label,
                "metadata" => Type::Metadata,
                _ if Type::is_type_word(&w) => w[1..]
                    .parse()
                    .map(Type::Int)
                    .map_err(|_| self.error(format!("invalid integer type '{w}'")))?,
                _ => return Err(self.unexpected("type", &Token::Word(w.clone()))),
            },
            Token::LocalIdent(name) => Type::Named(name),
            Token::LBracket => {
                let len = self.parse_u64()?;
                self.expect_word("x")?;
                let elem = self.parse_type()?;
                self.expect(Token::RBracket)?;
                Type::Array(len, Box::new(elem))
            }
            Token::LBrace => {
                let mut fields = Vec::new();
                if !self.consume(&Token::RBrace) {
                    loop {
                        fields.push(self.parse_type()?);
                        if self.consume(&Token::RBrace) {
                            break;
                        }
                        self.expect(Token::Comma)?;
                    }
                }
                Type::Struct(fields)
            }
            other => return Err(self.unexpected("type", &other)),
        };

        let mut ty = base;
        while self.consume(&Token::Star) {
            ty = Type::Ptr(Some(Box::new(ty)));
        }
        Ok(ty)
    }

    /// Whether the current token starts a type.
    pub(super) fn at_type(&self) -> bool {
        match self.peek() {
            Some(Token::Word(w)) => Type::is_type_word(w),
            Some(Token::LocalIdent(_) | Token::LBracket | Token::LBrace) => true,
            _ => false,
        }
    }

    /// Parse a value of the given type.
    pub(super) fn parse_value(&mut self, ty: &Type) -> ParseResult<Value> {
        if let Some(Token::LocalIdent(_)) = self.peek() {
            let name = self.parse_local()?;
            return Ok(Value::Local(name));
        }
        Ok(Value::Const(self.parse_constant(ty)?))
    }

    /// Parse a constant of the given type.
    pub(super) fn parse_constant(&mut self, ty: &Type) -> ParseResult<Constant> {
        match self.next_token("constant")? {
            Token::IntLit(v) => Ok(Constant::Int(v)),
            Token::FloatLit(v) => Ok(Constant::Float(v)),
            Token::GlobalIdent(name) => Ok(Constant::Global(name)),
            Token::Word(w) => match w.as_str() {
                "true" => Ok(Constant::Bool(true)),
                "false" => Ok(Constant::Bool(false)),
                "null" => Ok(Constant::Null),
                "undef" => Ok(Constant::Undef),
                "poison" => Ok(Constant::Poison),
                "zeroinitializer" => Ok(Constant::ZeroInit),
                "inttoptr" => self.parse_inttoptr(),
                "getelementptr" => self.parse_constant_gep(),
                _ => Err(self.error(format!("invalid constant '{w}' for type {ty}"))),
            },
            other => Err(self.unexpected("constant", &other)),
        }
    }

    /// `inttoptr (i64 N to T)`, after the keyword.
    fn parse_inttoptr(&mut self) -> ParseResult<Constant> {
        self.expect(Token::LParen)?;
        let _source = self.parse_type()?;
        let value = match self.next_token("integer")? {
            Token::IntLit(v) => v,
            other => return Err(self.unexpected("integer", &other)),
        };
        self.expect_word("to")?;
        let ty = self.parse_type()?;
        self.expect(Token::RParen)?;
        Ok(Constant::IntToPtr { value, ty })
    }

    /// `getelementptr [inbounds] (T, T* @g, i32 0, ...)`, after the keyword.
    fn parse_constant_gep(&mut self) -> ParseResult<Constant> {
        let inbounds = self.consume_word("inbounds");
        self.expect(Token::LParen)?;
        let source = self.parse_type()?;
        self.expect(Token::Comma)?;
        let base_ty = self.parse_type()?;
        let base = match self.next_token("global")? {
            Token::GlobalIdent(name) => name,
            other => return Err(self.unexpected("global", &other)),
        };
        let mut indices = Vec::new();
        while self.consume(&Token::Comma) {
            let ty = self.parse_type()?;
            match self.next_token("integer")? {
                Token::IntLit(v) => indices.push((ty, v)),
                other => return Err(self.unexpected("integer", &other)),
            }
        }
        self.expect(Token::RParen)?;
        Ok(Constant::GetElementPtr {
            inbounds,
            source,
            base_ty,
            base,
            indices,
        })
    }

    /// Attribute words between a type and its value (`writeonly`, `align 8`).
    pub(super) fn parse_param_attrs(&mut self) -> ParseResult<Vec<String>> {
        let mut attrs = Vec::new();
        while let Some(Token::Word(w)) = self.peek() {
            if CONSTANT_WORDS.contains(&w.as_str()) {
                break;
            }
            let mut word = self.parse_word()?;
            if self.check(&Token::LParen) {
                word.push_str(&self.parenthesized_text()?);
            } else if let Some(Token::IntLit(n)) = self.peek() {
                word = format!("{word} {n}");
                self.advance();
            }
            attrs.push(word);
        }
        Ok(attrs)
    }

    /// `T [attrs] v`
    pub(super) fn parse_operand(&mut self) -> ParseResult<Operand> {
        let ty = self.parse_type()?;
        let attrs = self.parse_param_attrs()?;
        let value = self.parse_value(&ty)?;
        Ok(Operand { ty, attrs, value })
    }

    /// One element of a metadata tuple.
    pub(super) fn parse_metadata_item(&mut self) -> ParseResult<MetadataItem> {
        match self.peek() {
            Some(Token::Word(w)) if w == "null" => {
                self.advance();
                Ok(MetadataItem::Null)
            }
            Some(Token::MetadataString(_)) => match self.advance() {
                Some(Token::MetadataString(s)) => Ok(MetadataItem::Str(s)),
                _ => Err(self.error("metadata string")),
            },
            Some(Token::MetadataRef(_)) => match self.advance() {
                Some(Token::MetadataRef(id)) => Ok(MetadataItem::Node(id)),
                _ => Err(self.error("metadata reference")),
            },
            _ => {
                let ty = self.parse_type()?;
                let value = self.parse_constant(&ty)?;
                Ok(MetadataItem::Value(ty, value))
            }
        }
    }
}
