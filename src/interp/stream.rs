//! Token ranges and cursors
//!
//! Bodies (method, module, lambda, loop, conditional) are stored as
//! captured [`TokenRange`]s over a shared token vector, not as an AST.
//! A [`TokenStream`] is the cursor over one range; one stream exists per
//! active frame, on a stack mirroring the frame stack.

use crate::lexer::Token;
use std::rc::Rc;

/// A half-open window `[start, end)` into a shared token vector
#[derive(Debug, Clone)]
pub struct TokenRange {
    tokens: Rc<Vec<Token>>,
    pub start: usize,
    pub end: usize,
}

impl TokenRange {
    pub fn whole(tokens: Rc<Vec<Token>>) -> Self {
        let end = tokens.len();
        TokenRange { tokens, start: 0, end }
    }

    /// Narrow to `[start, end)` (absolute indices into the same vector)
    pub fn slice(&self, start: usize, end: usize) -> Self {
        debug_assert!(start <= end && end <= self.tokens.len());
        TokenRange {
            tokens: Rc::clone(&self.tokens),
            start,
            end,
        }
    }

    /// Token at absolute index `i`, bounded by the window
    pub fn get(&self, i: usize) -> Option<&Token> {
        if i < self.end {
            self.tokens.get(i)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Clone the window's tokens into a fresh vector (used when the
    /// engine builds synthetic statements around a captured range).
    pub fn to_vec(&self) -> Vec<Token> {
        self.tokens[self.start..self.end].to_vec()
    }
}

/// Cursor over a token range
#[derive(Debug)]
pub struct TokenStream {
    range: TokenRange,
    pos: usize,
}

impl TokenStream {
    pub fn new(range: TokenRange) -> Self {
        let pos = range.start;
        TokenStream { range, pos }
    }

    pub fn range(&self) -> &TokenRange {
        &self.range
    }

    /// Absolute cursor position
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.range.end);
    }

    pub fn peek(&self) -> Option<&Token> {
        self.range.get(self.pos)
    }

    /// Token `n` past the cursor
    pub fn peek_at(&self, n: usize) -> Option<&Token> {
        self.range.get(self.pos + n)
    }

    /// Advance one token
    pub fn bump(&mut self) {
        if self.pos < self.range.end {
            self.pos += 1;
        }
    }
}
