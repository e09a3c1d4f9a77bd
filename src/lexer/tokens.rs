//! Token definitions for the Calico lexer

use crate::common::Span;
use logos::Logos;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A token with its kind, location, text and (for literals) typed value
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub literal: Option<Literal>,
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
    pub span: Span,
}

impl Token {
    /// Synthetic token with no real source location, used for the
    /// temporaries the engine manufactures for condition re-evaluation
    /// and string interpolation.
    pub fn synthetic(kind: TokenKind, text: impl Into<String>) -> Self {
        Token {
            kind,
            text: text.into(),
            literal: None,
            file: Arc::from("<synthetic>"),
            line: 0,
            column: 0,
            span: Span::default(),
        }
    }

    /// Variable name without the `@` sigil
    pub fn var_name(&self) -> &str {
        self.text.strip_prefix('@').unwrap_or(&self.text)
    }
}

/// Typed literal payload carried by literal tokens
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

/// Token kinds recognized by the lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Logos, Serialize, Deserialize)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*[^/])*\*/")]
pub enum TokenKind {
    // Keywords
    #[token("if")]
    If,
    #[token("elsif")]
    Elsif,
    #[token("else")]
    Else,
    #[token("end")]
    End,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("do")]
    Do,
    #[token("break")]
    Break,
    #[token("next")]
    Next,
    #[token("return")]
    Return,
    #[token("def")]
    Def,
    #[token("lambda")]
    Lambda,
    #[token("class")]
    Class,
    #[token("module")]
    Module,
    #[token("import")]
    Import,
    #[token("export")]
    Export,
    #[token("as")]
    As,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("this")]
    This,
    #[token("exit")]
    Exit,

    // Method/variable modifiers
    #[token("abstract")]
    Abstract,
    #[token("override")]
    Override,
    #[token("private")]
    Private,
    #[token("static")]
    Static,

    // Boolean literals
    #[token("true")]
    True,
    #[token("false")]
    False,

    // Literals
    #[regex(r"[0-9][0-9_]*", priority = 2)]
    IntLit,
    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*")]
    FloatLit,
    #[regex(r#""([^"\\]|\\.)*""#)]
    StringLit,

    // Identifiers and variables
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", priority = 1)]
    Ident,
    #[regex(r"@[a-zA-Z_][a-zA-Z0-9_]*")]
    Variable,

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("~")]
    Tilde,
    #[token("!")]
    Bang,
    #[token("=")]
    Eq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    // Compound operators
    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,

    // Delimiters
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

    // Punctuation
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token("::")]
    ColonColon,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,
    #[token("?")]
    Question,

    // Anything the lexer could not recognize; surfaces later as an
    // unrecognized-token interpreter error
    Unknown,
}

impl TokenKind {
    /// Check if this token is a keyword
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::If
                | TokenKind::Elsif
                | TokenKind::Else
                | TokenKind::End
                | TokenKind::While
                | TokenKind::For
                | TokenKind::In
                | TokenKind::Do
                | TokenKind::Break
                | TokenKind::Next
                | TokenKind::Return
                | TokenKind::Def
                | TokenKind::Lambda
                | TokenKind::Class
                | TokenKind::Module
                | TokenKind::Import
                | TokenKind::Export
                | TokenKind::As
                | TokenKind::Try
                | TokenKind::Catch
                | TokenKind::This
                | TokenKind::Exit
                | TokenKind::Abstract
                | TokenKind::Override
                | TokenKind::Private
                | TokenKind::Static
                | TokenKind::True
                | TokenKind::False
        )
    }

    /// Check if this token is a literal
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::IntLit
                | TokenKind::FloatLit
                | TokenKind::StringLit
                | TokenKind::True
                | TokenKind::False
        )
    }

    /// Check if this token is an operator
    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Slash
                | TokenKind::Percent
                | TokenKind::Caret
                | TokenKind::Amp
                | TokenKind::Pipe
                | TokenKind::Tilde
                | TokenKind::Bang
                | TokenKind::Eq
                | TokenKind::Lt
                | TokenKind::Gt
                | TokenKind::EqEq
                | TokenKind::Ne
                | TokenKind::Le
                | TokenKind::Ge
                | TokenKind::AmpAmp
                | TokenKind::PipePipe
                | TokenKind::Shl
                | TokenKind::Shr
        )
    }

    /// Does this token open a body that is closed by a matching `end`?
    ///
    /// Used by the engine's forward scans when capturing token-range
    /// bodies and when suppressing execution inside `try`.
    pub fn opens_block(&self) -> bool {
        matches!(
            self,
            TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Def
                | TokenKind::Lambda
                | TokenKind::Class
                | TokenKind::Module
                | TokenKind::Try
        )
    }

    /// Get the string representation of the token
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::If => "if",
            TokenKind::Elsif => "elsif",
            TokenKind::Else => "else",
            TokenKind::End => "end",
            TokenKind::While => "while",
            TokenKind::For => "for",
            TokenKind::In => "in",
            TokenKind::Do => "do",
            TokenKind::Break => "break",
            TokenKind::Next => "next",
            TokenKind::Return => "return",
            TokenKind::Def => "def",
            TokenKind::Lambda => "lambda",
            TokenKind::Class => "class",
            TokenKind::Module => "module",
            TokenKind::Import => "import",
            TokenKind::Export => "export",
            TokenKind::As => "as",
            TokenKind::Try => "try",
            TokenKind::Catch => "catch",
            TokenKind::This => "this",
            TokenKind::Exit => "exit",
            TokenKind::Abstract => "abstract",
            TokenKind::Override => "override",
            TokenKind::Private => "private",
            TokenKind::Static => "static",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::IntLit => "<int>",
            TokenKind::FloatLit => "<float>",
            TokenKind::StringLit => "<string>",
            TokenKind::Ident => "<ident>",
            TokenKind::Variable => "<variable>",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Caret => "^",
            TokenKind::Amp => "&",
            TokenKind::Pipe => "|",
            TokenKind::Tilde => "~",
            TokenKind::Bang => "!",
            TokenKind::Eq => "=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::EqEq => "==",
            TokenKind::Ne => "!=",
            TokenKind::Le => "<=",
            TokenKind::Ge => ">=",
            TokenKind::AmpAmp => "&&",
            TokenKind::PipePipe => "||",
            TokenKind::Shl => "<<",
            TokenKind::Shr => ">>",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Semi => ";",
            TokenKind::Colon => ":",
            TokenKind::ColonColon => "::",
            TokenKind::Dot => ".",
            TokenKind::DotDot => "..",
            TokenKind::Question => "?",
            TokenKind::Unknown => "<unknown>",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
