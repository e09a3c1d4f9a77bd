//! Single-pass lexer for Calico source text
//!
//! Built on [`logos`]. Lexing never fails: characters the token table does
//! not recognize fold into `Unknown` tokens and surface later as
//! unrecognized-token interpreter errors on the malformed token.

mod tokens;

pub use tokens::{Literal, Token, TokenKind};

use crate::common::Span;
use logos::Logos;
use std::sync::Arc;

/// Tokenize `source`, tagging every token with `file` and its line/column.
pub fn lex(file: &str, source: &str) -> Vec<Token> {
    let file: Arc<str> = Arc::from(file);
    let line_starts = line_starts(source);
    let mut tokens = Vec::new();

    for (result, range) in TokenKind::lexer(source).spanned() {
        let kind = result.unwrap_or(TokenKind::Unknown);
        let text = source[range.clone()].to_string();
        let (line, column) = position(&line_starts, range.start);
        let (kind, literal) = literal_value(kind, &text);
        tokens.push(Token {
            kind,
            text,
            literal,
            file: Arc::clone(&file),
            line,
            column,
            span: Span::new(range.start, range.end),
        });
    }

    tracing::debug!(file = %file, count = tokens.len(), "lexed source");
    tokens
}

/// Decode the typed payload of a literal token. A numeric literal that
/// overflows folds into `Unknown` rather than aborting the lex.
fn literal_value(kind: TokenKind, text: &str) -> (TokenKind, Option<Literal>) {
    match kind {
        TokenKind::IntLit => {
            let digits: String = text.chars().filter(|c| *c != '_').collect();
            match digits.parse::<i64>() {
                Ok(n) => (kind, Some(Literal::Int(n))),
                Err(_) => (TokenKind::Unknown, None),
            }
        }
        TokenKind::FloatLit => {
            let digits: String = text.chars().filter(|c| *c != '_').collect();
            match digits.parse::<f64>() {
                Ok(n) => (kind, Some(Literal::Float(n))),
                Err(_) => (TokenKind::Unknown, None),
            }
        }
        TokenKind::StringLit => {
            // Strip the surrounding quotes only; escapes and `${...}` spans
            // stay verbatim and are decoded lazily at evaluation time.
            let inner = &text[1..text.len() - 1];
            (kind, Some(Literal::Str(inner.to_string())))
        }
        TokenKind::True => (kind, Some(Literal::Bool(true))),
        TokenKind::False => (kind, Some(Literal::Bool(false))),
        _ => (kind, None),
    }
}

/// Byte offsets of every line start, for offset → line/column conversion
fn line_starts(source: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, b) in source.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

fn position(line_starts: &[usize], offset: usize) -> (u32, u32) {
    let line = match line_starts.binary_search(&offset) {
        Ok(i) => i,
        Err(i) => i - 1,
    };
    let column = offset - line_starts[line];
    (line as u32 + 1, column as u32 + 1)
}
