//! Parser for textual IR.

mod function;
mod value;

use rustc_hash::FxHashSet;

use crate::error::{ParseError, ParseResult};
use crate::lexer::{SpannedToken, Token, tokenize};
use crate::module::{
    Attribute, AttributeGroup, Global, Initializer, IrModule, MetadataNode, NamedMetadata,
    TypeDef,
};

/// Parse a textual IR source string into module contents.
pub fn parse_ir(source: &str) -> ParseResult<IrModule> {
    let mut parser = Parser::new(source)?;
    parser.parse_module()
}

/// Parser state.
pub(crate) struct Parser<'src> {
    source: &'src str,
    tokens: Vec<SpannedToken>,
    pos: usize,
    line: usize,
}

impl<'src> Parser<'src> {
    /// Create a new parser from source.
    fn new(source: &'src str) -> ParseResult<Self> {
        let mut tokens = Vec::new();
        let mut line = 1;
        for result in tokenize(source) {
            match result {
                Ok(t) => {
                    if t.token == Token::Newline {
                        line += 1;
                    }
                    tokens.push(t);
                }
                Err((_, message)) => return Err(ParseError::LexerError { line, message }),
            }
        }

        Ok(Self {
            source,
            tokens,
            pos: 0,
            line: 1,
        })
    }

    /// Check if we've reached the end.
    fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Peek at the current token.
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    /// Peek `n` tokens ahead.
    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|t| &t.token)
    }

    /// Advance and return the current token.
    fn advance(&mut self) -> Option<Token> {
        if self.is_eof() {
            return None;
        }
        let token = self.tokens[self.pos].token.clone();
        if token == Token::Newline {
            self.line += 1;
        }
        self.pos += 1;
        Some(token)
    }

    /// Advance, failing at end of input.
    fn next_token(&mut self, expected: &str) -> ParseResult<Token> {
        self.advance()
            .ok_or_else(|| ParseError::UnexpectedEof(format!("expected {expected}")))
    }

    /// Build an unexpected-token error at the current line.
    fn unexpected(&self, expected: &str, found: &Token) -> ParseError {
        ParseError::UnexpectedToken {
            line: self.line,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Build a generic error at the current line.
    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::Generic {
            line: self.line,
            message: message.into(),
        }
    }

    /// Expect a specific token.
    #[allow(clippy::needless_pass_by_value)]
    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        let found = self.next_token(&expected.to_string())?;
        if std::mem::discriminant(&found) != std::mem::discriminant(&expected) {
            return Err(self.unexpected(&expected.to_string(), &found));
        }
        Ok(())
    }

    /// Check if current token matches.
    fn check(&self, token: &Token) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(t) == std::mem::discriminant(token))
    }

    /// Consume token if it matches.
    fn consume(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Whether the current token is the given bare word.
    fn check_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w == word)
    }

    /// Consume the given bare word if present.
    fn consume_word(&mut self, word: &str) -> bool {
        if self.check_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expect a specific bare word.
    fn expect_word(&mut self, word: &str) -> ParseResult<()> {
        let found = self.next_token(word)?;
        match &found {
            Token::Word(w) if w == word => Ok(()),
            _ => Err(self.unexpected(word, &found)),
        }
    }

    /// Parse any bare word.
    fn parse_word(&mut self) -> ParseResult<String> {
        match self.next_token("word")? {
            Token::Word(w) => Ok(w),
            other => Err(self.unexpected("word", &other)),
        }
    }

    /// Parse a quoted string literal.
    fn parse_string(&mut self) -> ParseResult<String> {
        match self.next_token("string literal")? {
            Token::StringLit(s) => Ok(s),
            other => Err(self.unexpected("string literal", &other)),
        }
    }

    /// Parse an unsigned integer literal.
    fn parse_u64(&mut self) -> ParseResult<u64> {
        match self.next_token("integer")? {
            Token::IntLit(v) => u64::try_from(v).map_err(|_| self.error(format!("negative size {v}"))),
            other => Err(self.unexpected("integer", &other)),
        }
    }

    /// Parse a local identifier (`%name`).
    fn parse_local(&mut self) -> ParseResult<String> {
        match self.next_token("local identifier")? {
            Token::LocalIdent(name) => Ok(name),
            other => Err(self.unexpected("local identifier", &other)),
        }
    }

    /// Skip blank lines.
    fn skip_newlines(&mut self) {
        while self.consume(&Token::Newline) {}
    }

    /// Require the end of the current line (or of the input).
    fn end_of_line(&mut self) -> ParseResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(Token::Newline) => {
                self.advance();
                Ok(())
            }
            Some(other) => Err(self.unexpected("end of line", &other.clone())),
        }
    }

    /// Raw source text from the current token to the end of the line.
    fn rest_of_line(&mut self) -> String {
        let start = self.tokens.get(self.pos).map(|t| t.span.start);
        let mut end = start;
        while let Some(t) = self.tokens.get(self.pos) {
            if t.token == Token::Newline {
                break;
            }
            end = Some(t.span.end);
            self.pos += 1;
        }
        match (start, end) {
            (Some(s), Some(e)) if e > s => self.source[s..e].to_string(),
            _ => String::new(),
        }
    }

    /// Parse the entire module.
    fn parse_module(&mut self) -> ParseResult<IrModule> {
        let mut module = IrModule::default();
        let mut names = FxHashSet::default();

        loop {
            self.skip_newlines();
            let Some(token) = self.peek().cloned() else {
                break;
            };
            match token {
                Token::Word(word) => match word.as_str() {
                    "source_filename" => {
                        self.advance();
                        self.expect(Token::Equals)?;
                        module.source_filename = Some(self.parse_string()?);
                    }
                    "target" => {
                        self.advance();
                        let which = self.parse_word()?;
                        self.expect(Token::Equals)?;
                        let value = self.parse_string()?;
                        match which.as_str() {
                            "datalayout" => module.data_layout = Some(value),
                            "triple" => module.triple = Some(value),
                            _ => {
                                return Err(ParseError::UnknownDirective {
                                    line: self.line,
                                    directive: format!("target {which}"),
                                });
                            }
                        }
                    }
                    "declare" | "define" => {
                        let function = self.parse_function()?;
                        if !names.insert(format!("@{}", function.name)) {
                            return Err(ParseError::DuplicateDefinition {
                                line: self.line,
                                name: function.name,
                            });
                        }
                        module.functions.push(function);
                    }
                    "attributes" => {
                        self.advance();
                        module.attribute_groups.push(self.parse_attribute_group()?);
                    }
                    _ => {
                        return Err(ParseError::UnknownDirective {
                            line: self.line,
                            directive: word.clone(),
                        });
                    }
                },
                Token::LocalIdent(name) => {
                    self.advance();
                    module.type_defs.push(self.parse_type_def(name)?);
                }
                Token::GlobalIdent(name) => {
                    self.advance();
                    let global = self.parse_global(name)?;
                    if !names.insert(format!("@{}", global.name)) {
                        return Err(ParseError::DuplicateDefinition {
                            line: self.line,
                            name: global.name,
                        });
                    }
                    module.globals.push(global);
                }
                Token::MetadataName(name) => {
                    self.advance();
                    module.named_metadata.push(self.parse_named_metadata(name)?);
                }
                Token::MetadataRef(id) => {
                    self.advance();
                    module.metadata.push(self.parse_metadata_node(id)?);
                }
                other => {
                    return Err(ParseError::UnknownDirective {
                        line: self.line,
                        directive: other.to_string(),
                    });
                }
            }
            self.end_of_line()?;
        }

        Ok(module)
    }

    /// `%Name = type opaque | type { ... }`
    fn parse_type_def(&mut self, name: String) -> ParseResult<TypeDef> {
        self.expect(Token::Equals)?;
        self.expect_word("type")?;
        if self.consume_word("opaque") {
            return Ok(TypeDef { name, body: None });
        }
        match self.parse_type()? {
            crate::types::Type::Struct(fields) => Ok(TypeDef {
                name,
                body: Some(fields),
            }),
            other => Err(self.error(format!("unsupported type definition body {other}"))),
        }
    }

    /// `@name = [qualifiers] (constant|global) T [init] [, align N]`
    fn parse_global(&mut self, name: String) -> ParseResult<Global> {
        self.expect(Token::Equals)?;
        let mut qualifiers = Vec::new();
        let is_constant = loop {
            let word = self.parse_word()?;
            match word.as_str() {
                "constant" => break true,
                "global" => break false,
                _ => qualifiers.push(word),
            }
        };
        let ty = self.parse_type()?;

        let initializer = match self.peek() {
            Some(Token::CString(_)) => match self.advance() {
                Some(Token::CString(bytes)) => Some(Initializer::Bytes(bytes)),
                _ => None,
            },
            None | Some(Token::Newline | Token::Comma) => None,
            Some(_) => Some(Initializer::Constant(self.parse_constant(&ty)?)),
        };

        let mut align = None;
        while self.consume(&Token::Comma) {
            let key = self.parse_word()?;
            match key.as_str() {
                "align" => align = Some(self.parse_u64()?),
                other => return Err(self.error(format!("unsupported global property '{other}'"))),
            }
        }

        Ok(Global {
            name,
            qualifiers,
            is_constant,
            ty,
            initializer,
            align,
        })
    }

    /// `#N = { "key"="value" "flag" word ... }`
    fn parse_attribute_group(&mut self) -> ParseResult<AttributeGroup> {
        let id = match self.next_token("attribute group")? {
            Token::AttrGroupRef(id) => id,
            other => return Err(self.unexpected("attribute group", &other)),
        };
        self.expect(Token::Equals)?;
        self.expect(Token::LBrace)?;

        let mut attributes = Vec::new();
        loop {
            match self.next_token("attribute")? {
                Token::RBrace => break,
                Token::StringLit(key) => {
                    let value = if self.consume(&Token::Equals) {
                        Some(self.parse_string()?)
                    } else {
                        None
                    };
                    attributes.push(Attribute::Str { key, value });
                }
                Token::Word(mut word) => {
                    if self.check(&Token::LParen) {
                        word.push_str(&self.parenthesized_text()?);
                    }
                    attributes.push(Attribute::Word(word));
                }
                other => return Err(self.unexpected("attribute", &other)),
            }
        }

        Ok(AttributeGroup { id, attributes })
    }

    /// Raw text of a balanced parenthesized group, starting at `(`.
    fn parenthesized_text(&mut self) -> ParseResult<String> {
        let start = self.tokens[self.pos].span.start;
        let mut depth = 0usize;
        loop {
            let end = self.tokens.get(self.pos).map(|t| t.span.end);
            match self.next_token(")")? {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        let end = end.unwrap_or(start);
                        return Ok(self.source[start..end].to_string());
                    }
                }
                Token::Newline => return Err(self.error("unbalanced parentheses")),
                _ => {}
            }
        }
    }

    /// `!name = !{!0, !1}`
    fn parse_named_metadata(&mut self, name: String) -> ParseResult<NamedMetadata> {
        self.expect(Token::Equals)?;
        self.expect(Token::Bang)?;
        self.expect(Token::LBrace)?;
        let mut nodes = Vec::new();
        if !self.consume(&Token::RBrace) {
            loop {
                match self.next_token("metadata reference")? {
                    Token::MetadataRef(id) => nodes.push(id),
                    other => return Err(self.unexpected("metadata reference", &other)),
                }
                if self.consume(&Token::RBrace) {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }
        Ok(NamedMetadata { name, nodes })
    }

    /// `!N = [distinct] !{ items }`
    fn parse_metadata_node(&mut self, id: u32) -> ParseResult<MetadataNode> {
        self.expect(Token::Equals)?;
        let distinct = self.consume_word("distinct");
        self.expect(Token::Bang)?;
        self.expect(Token::LBrace)?;
        let mut items = Vec::new();
        if !self.consume(&Token::RBrace) {
            loop {
                items.push(self.parse_metadata_item()?);
                if self.consume(&Token::RBrace) {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }
        Ok(MetadataNode {
            id,
            distinct,
            items,
        })
    }
}
