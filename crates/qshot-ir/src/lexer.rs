//! Lexer for textual IR.

use logos::Logos;

/// Tokens of the textual IR dialect. Newlines are significant: they end
/// instructions and top-level entities.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r";[^\n]*")]
pub enum Token {
    #[token("\n")]
    Newline,

    #[regex(r"%[-a-zA-Z$._0-9]+", |lex| lex.slice()[1..].to_string())]
    #[regex(r#"%"[^"]*""#, |lex| unquote(lex.slice(), 1))]
    LocalIdent(String),

    #[regex(r"@[-a-zA-Z$._0-9]+", |lex| lex.slice()[1..].to_string())]
    #[regex(r#"@"[^"]*""#, |lex| unquote(lex.slice(), 1))]
    GlobalIdent(String),

    #[regex(r"#[0-9]+", |lex| lex.slice()[1..].parse().ok())]
    AttrGroupRef(u32),

    #[regex(r"![0-9]+", |lex| lex.slice()[1..].parse().ok())]
    MetadataRef(u32),

    #[regex(r"![a-zA-Z$._][-a-zA-Z$._0-9]*", |lex| lex.slice()[1..].to_string())]
    MetadataName(String),

    #[regex(r#"!"[^"]*""#, |lex| unquote(lex.slice(), 1))]
    MetadataString(String),

    #[token("!")]
    Bang,

    #[regex(r#"c"[^"]*""#, |lex| { let s = lex.slice(); unescape(&s[2..s.len() - 1]) })]
    CString(Vec<u8>),

    #[regex(r#""[^"]*""#, |lex| unquote(lex.slice(), 0))]
    StringLit(String),

    #[regex(r"[a-zA-Z$._][-a-zA-Z$._0-9]*:", |lex| { let s = lex.slice(); s[..s.len() - 1].to_string() })]
    #[regex(r"[0-9]+:", |lex| { let s = lex.slice(); s[..s.len() - 1].to_string() })]
    LabelDef(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_.]*", |lex| lex.slice().to_string())]
    Word(String),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse().ok())]
    IntLit(i64),

    #[regex(r"[-+]?[0-9]+\.[0-9]*([eE][-+]?[0-9]+)?", |lex| lex.slice().parse().ok())]
    #[regex(r"0x[0-9A-Fa-f]{16}", |lex| u64::from_str_radix(&lex.slice()[2..], 16).ok().map(f64::from_bits))]
    FloatLit(f64),

    #[token("=")]
    Equals,

    #[token(",")]
    Comma,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("<")]
    Lt,

    #[token(">")]
    Gt,

    #[token("*")]
    Star,

    #[token("...")]
    Ellipsis,
}

/// Decode `\XX` hex escapes and `\\`.
pub(crate) fn unescape(raw: &str) -> Option<Vec<u8>> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if bytes.get(i + 1) == Some(&b'\\') {
                out.push(b'\\');
                i += 2;
                continue;
            }
            let hex = raw.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Some(out)
}

/// Strip `prefix` sigil bytes and the quotes, then unescape to UTF-8.
fn unquote(raw: &str, prefix: usize) -> Option<String> {
    let inner = raw.get(prefix + 1..raw.len() - 1)?;
    String::from_utf8(unescape(inner)?).ok()
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Newline => write!(f, "end of line"),
            Token::LocalIdent(s) => write!(f, "%{s}"),
            Token::GlobalIdent(s) => write!(f, "@{s}"),
            Token::AttrGroupRef(n) => write!(f, "#{n}"),
            Token::MetadataRef(n) => write!(f, "!{n}"),
            Token::MetadataName(s) => write!(f, "!{s}"),
            Token::MetadataString(s) => write!(f, "!\"{s}\""),
            Token::Bang => write!(f, "!"),
            Token::CString(b) => write!(f, "c\"{}\"", String::from_utf8_lossy(b)),
            Token::StringLit(s) => write!(f, "\"{s}\""),
            Token::LabelDef(s) => write!(f, "{s}:"),
            Token::Word(s) => write!(f, "{s}"),
            Token::IntLit(v) => write!(f, "{v}"),
            Token::FloatLit(v) => write!(f, "{v}"),
            Token::Equals => write!(f, "="),
            Token::Comma => write!(f, ","),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Star => write!(f, "*"),
            Token::Ellipsis => write!(f, "..."),
        }
    }
}

/// A token with its span information.
#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: std::ops::Range<usize>,
}

/// Tokenize an IR source string.
pub fn tokenize(source: &str) -> Vec<Result<SpannedToken, (std::ops::Range<usize>, String)>> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        if let Ok(token) = result {
            tokens.push(Ok(SpannedToken { token, span }));
        } else {
            let slice = &source[span.clone()];
            tokens.push(Err((span, format!("Invalid token: '{slice}'"))));
        }
    }

    tokens
}
