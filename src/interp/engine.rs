//! The interpreter engine
//!
//! A tree-walking evaluator that executes the token stream directly: no
//! bytecode, no separate AST pass. The engine owns a stack of frames and a
//! parallel stack of token streams (always the same height, always popped
//! together), dispatches per token kind, and mutates the active frame and
//! the per-instance method/class/module registries.
//!
//! Bodies are captured [`TokenRange`]s; loops and conditionals re-walk
//! them. Conditions and interpolation spans are evaluated by assigning
//! into a synthetic temporary inside an inherited sub-frame.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::rc::Rc;

use crate::diagnostics::{ErrorKind, Interrupt, ScriptError, SourceMap};
use crate::lexer::{self, Token, TokenKind};

use super::builtins::{BuiltinCall, Builtins, CoreBuiltins, LambdaHost};
use super::defs::{ClassDef, Method, MethodFlags, ModuleDef, Param};
use super::frame::Frame;
use super::idgen::IdGen;
use super::ops;
use super::serializer;
use super::stream::{TokenRange, TokenStream};
use super::value::{Object, Value};

/// Result alias threaded through every evaluation call
pub(crate) type Exec<T> = Result<T, Interrupt>;

/// Hard cap on frame-stack height. Each script frame costs dozens of host
/// stack levels (statement dispatch, the precedence ladder, invocation),
/// so the cap must trip well before a 2 MiB thread stack runs out.
const MAX_FRAMES: usize = 64;

/// One interpreter instance: frame/stream stacks plus the registries.
/// Instances are fully independent; nothing is shared or global.
pub struct Interpreter {
    pub(crate) frames: Vec<Frame>,
    pub(crate) streams: Vec<TokenStream>,
    pub(crate) methods: FxHashMap<String, Method>,
    pub(crate) classes: FxHashMap<String, ClassDef>,
    pub(crate) modules: FxHashMap<String, ModuleDef>,
    pub(crate) builtins: Option<Box<dyn Builtins>>,
    pub(crate) sources: SourceMap,
    pub(crate) ids: IdGen,
    /// Namespace prefix applied to `def` while a module body runs
    pub(crate) active_module: Option<String>,
    preserve_globals: bool,
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter::with_builtins(Box::new(CoreBuiltins::new()))
    }

    /// Build an interpreter around a host-supplied builtin dispatcher
    pub fn with_builtins(builtins: Box<dyn Builtins>) -> Self {
        Interpreter {
            frames: Vec::new(),
            streams: Vec::new(),
            methods: FxHashMap::default(),
            classes: FxHashMap::default(),
            modules: FxHashMap::default(),
            builtins: Some(builtins),
            sources: SourceMap::new(),
            ids: IdGen::new(),
            active_module: None,
            preserve_globals: false,
        }
    }

    /// Keep the top-level frame alive across `interpret` calls so
    /// top-level variables persist (interactive hosts).
    pub fn preserve_globals(&mut self, preserve: bool) {
        self.preserve_globals = preserve;
    }

    /// Top-level variable, if the top frame is preserved
    pub fn global(&self, name: &str) -> Option<Value> {
        self.frames.first().and_then(|f| f.vars.get(name).cloned())
    }

    /// Interpret source text; fatal errors are printed with full context.
    pub fn interpret_source(&mut self, file: &str, source: &str) -> i32 {
        match self.eval_source(file, source) {
            Ok(code) => code,
            Err(error) => {
                eprintln!("{:?}", self.sources.report(&error));
                1
            }
        }
    }

    /// Interpret a pre-lexed token sequence; fatal errors are printed.
    pub fn interpret_tokens(&mut self, tokens: Vec<Token>) -> i32 {
        match self.eval_tokens(tokens) {
            Ok(code) => code,
            Err(error) => {
                eprintln!("{:?}", self.sources.report(&error));
                1
            }
        }
    }

    /// Non-printing variant for embedding hosts and tests: `Ok` carries
    /// the exit code (0, or the code passed to `exit`), `Err` the fatal
    /// uncaught error.
    pub fn eval_source(&mut self, file: &str, source: &str) -> Result<i32, ScriptError> {
        self.sources.insert(file.to_string(), source.to_string());
        let tokens = lexer::lex(file, source);
        self.eval_tokens(tokens)
    }

    pub fn eval_tokens(&mut self, tokens: Vec<Token>) -> Result<i32, ScriptError> {
        let range = TokenRange::whole(Rc::new(tokens));
        if self.frames.is_empty() {
            self.frames.push(Frame::root());
        }
        self.streams.push(TokenStream::new(range));
        let result = self.execute();
        self.streams.pop();

        match result {
            Ok(()) => {
                if self.preserve_globals {
                    if let Some(top) = self.frames.first_mut() {
                        top.flags = Default::default();
                        top.error = None;
                        top.return_value = None;
                    }
                } else {
                    self.frames.pop();
                }
                Ok(0)
            }
            Err(Interrupt::Exit(code)) => {
                if !self.preserve_globals {
                    self.frames.clear();
                    self.streams.clear();
                }
                Ok(code)
            }
            Err(Interrupt::Error(error)) => {
                if !self.preserve_globals {
                    self.frames.clear();
                    self.streams.clear();
                }
                Err(*error)
            }
        }
    }

    // ---------------- frame/stream plumbing ----------------

    pub(crate) fn frame(&self) -> Exec<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| ScriptError::bare(ErrorKind::EmptyStack, "no active frame").into())
    }

    pub(crate) fn frame_mut(&mut self) -> Exec<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| ScriptError::bare(ErrorKind::EmptyStack, "no active frame").into())
    }

    pub(crate) fn stream(&self) -> Exec<&TokenStream> {
        self.streams
            .last()
            .ok_or_else(|| ScriptError::bare(ErrorKind::EmptyStack, "no active token stream").into())
    }

    pub(crate) fn stream_mut(&mut self) -> Exec<&mut TokenStream> {
        self.streams
            .last_mut()
            .ok_or_else(|| ScriptError::bare(ErrorKind::EmptyStack, "no active token stream").into())
    }

    pub(crate) fn peek(&self) -> Option<Token> {
        self.streams.last().and_then(|s| s.peek().cloned())
    }

    pub(crate) fn peek_kind(&self) -> Option<TokenKind> {
        self.streams.last().and_then(|s| s.peek().map(|t| t.kind))
    }

    pub(crate) fn peek_kind_at(&self, n: usize) -> Option<TokenKind> {
        self.streams.last().and_then(|s| s.peek_at(n).map(|t| t.kind))
    }

    /// Consume and return the next token
    pub(crate) fn bump(&mut self) -> Exec<Token> {
        let token = {
            let stream = self
                .streams
                .last_mut()
                .ok_or_else(|| ScriptError::bare(ErrorKind::EmptyStack, "no active token stream"))?;
            let token = stream.peek().cloned();
            if token.is_some() {
                stream.bump();
            }
            token
        };
        token.ok_or_else(|| self.eof_error())
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> Exec<Token> {
        let token = self.bump()?;
        if token.kind != kind {
            return Err(ScriptError::new(
                ErrorKind::Syntax,
                &token,
                format!("expected `{}`, found `{}`", kind, token.text),
            )
            .into());
        }
        Ok(token)
    }

    fn eof_error(&self) -> Interrupt {
        let last = self.streams.last().and_then(|s| {
            let range = s.range();
            if range.is_empty() {
                None
            } else {
                range.get(range.end - 1).cloned()
            }
        });
        match last {
            Some(token) => {
                ScriptError::new(ErrorKind::Syntax, &token, "unexpected end of input").into()
            }
            None => ScriptError::bare(ErrorKind::Syntax, "unexpected end of input").into(),
        }
    }

    /// Error pinned to the cursor (or, at end of stream, the last token)
    pub(crate) fn error_here(&self, kind: ErrorKind, message: impl Into<String>) -> Interrupt {
        let token = self.peek().or_else(|| {
            self.streams.last().and_then(|s| {
                let range = s.range();
                if range.is_empty() {
                    None
                } else {
                    range.get(range.end - 1).cloned()
                }
            })
        });
        match token {
            Some(token) => ScriptError::new(kind, &token, message).into(),
            None => ScriptError::bare(kind, message).into(),
        }
    }

    /// Push a frame and its stream together; the stacks never diverge.
    pub(crate) fn push_frame(&mut self, frame: Frame, stream: TokenStream, at: &Token) -> Exec<()> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(ScriptError::new(
                ErrorKind::InvalidOperation,
                at,
                format!("maximum nesting depth ({}) exceeded", MAX_FRAMES),
            )
            .into());
        }
        self.frames.push(frame);
        self.streams.push(stream);
        Ok(())
    }

    /// Pop a frame and its stream together
    pub(crate) fn pop_frame(&mut self) -> Exec<Frame> {
        self.streams.pop();
        self.frames
            .pop()
            .ok_or_else(|| ScriptError::bare(ErrorKind::EmptyStack, "frame stack underflow").into())
    }

    // ---------------- main loop ----------------

    /// Walk the active stream until it is exhausted or a control flag
    /// stops the body.
    pub(crate) fn execute(&mut self) -> Exec<()> {
        loop {
            if self.frame()?.interrupted() {
                return Ok(());
            }
            if self.frame()?.error.is_some() {
                self.suppress()?;
                continue;
            }
            let Some(token) = self.peek() else {
                return Ok(());
            };
            match self.statement(&token) {
                Ok(()) => {}
                Err(Interrupt::Error(error)) => {
                    let in_try = self.frames.last().map(|f| f.flags.in_try).unwrap_or(false);
                    if in_try && !error.fatal {
                        // captured into frame error state; execution is
                        // suppressed until the catch
                        self.frame_mut()?.error = Some(*error);
                    } else {
                        return Err(Interrupt::Error(error));
                    }
                }
                Err(exit) => return Err(exit),
            }
        }
    }

    /// With an error pending, advance token by token (tracking nested
    /// block depth) until the catch that belongs to this try.
    fn suppress(&mut self) -> Exec<()> {
        let mut depth = 0usize;
        loop {
            let Some(token) = self.peek() else {
                return Err(self.escape_error()?);
            };
            if token.kind == TokenKind::Catch && depth == 0 {
                return self.exec_catch();
            }
            if token.kind.opens_block() {
                depth += 1;
            } else if token.kind == TokenKind::End {
                if depth == 0 {
                    // try body ended with no catch: the error escapes
                    self.stream_mut()?.bump();
                    return Err(self.escape_error()?);
                }
                depth -= 1;
            }
            self.stream_mut()?.bump();
        }
    }

    fn escape_error(&mut self) -> Exec<Interrupt> {
        let frame = self.frame_mut()?;
        frame.flags.in_try = false;
        let error = frame
            .error
            .take()
            .unwrap_or_else(|| ScriptError::bare(ErrorKind::EmptyStack, "error state lost"));
        Ok(error.into())
    }

    // ---------------- statements ----------------

    fn statement(&mut self, token: &Token) -> Exec<()> {
        match token.kind {
            TokenKind::Semi => {
                self.stream_mut()?.bump();
                Ok(())
            }
            TokenKind::Variable => self.exec_variable_statement(),
            TokenKind::This => self.exec_this_statement(),
            TokenKind::If => self.exec_if(),
            TokenKind::While => self.exec_while(),
            TokenKind::For => self.exec_for(),
            TokenKind::Break => {
                self.stream_mut()?.bump();
                self.frame_mut()?.flags.loop_break = true;
                Ok(())
            }
            TokenKind::Next => {
                self.stream_mut()?.bump();
                self.frame_mut()?.flags.loop_continue = true;
                Ok(())
            }
            TokenKind::Return => self.exec_return(),
            TokenKind::Def => self.exec_def(),
            TokenKind::Class | TokenKind::Abstract => self.exec_class(),
            TokenKind::Module => self.exec_module_def(),
            TokenKind::Import => self.exec_import(),
            TokenKind::Export => self.exec_export(),
            TokenKind::Try => {
                self.stream_mut()?.bump();
                self.frame_mut()?.flags.in_try = true;
                Ok(())
            }
            TokenKind::Catch => self.exec_catch(),
            TokenKind::End => {
                // `end` closing a try runs through here; any other `end`
                // at statement level is stray
                if self.frame()?.flags.in_try {
                    self.stream_mut()?.bump();
                    self.frame_mut()?.flags.in_try = false;
                    Ok(())
                } else {
                    Err(ScriptError::new(ErrorKind::Syntax, token, "unexpected `end`").into())
                }
            }
            TokenKind::Exit => self.exec_exit(),
            TokenKind::Unknown => Err(ScriptError::new(
                ErrorKind::UnrecognizedToken,
                token,
                format!("unrecognized token `{}`", token.text),
            )
            .into()),
            _ => {
                self.expression()?;
                Ok(())
            }
        }
    }

    fn exec_variable_statement(&mut self) -> Exec<()> {
        match self.peek_kind_at(1) {
            Some(TokenKind::Eq) => self.exec_assign(),
            Some(TokenKind::LBracket) if self.is_indexed_assign()? => self.exec_index_assign(),
            Some(TokenKind::Dot)
                if self.peek_kind_at(2) == Some(TokenKind::Ident)
                    && self.peek_kind_at(3) == Some(TokenKind::Eq) =>
            {
                self.exec_field_assign()
            }
            _ => {
                self.expression()?;
                Ok(())
            }
        }
    }

    fn exec_assign(&mut self) -> Exec<()> {
        let var_tok = self.bump()?;
        let name = var_tok.var_name().to_string();
        self.expect(TokenKind::Eq)?;
        let value = self.expression()?;
        self.frame_mut()?.vars.insert(name, value);
        Ok(())
    }

    /// Does the variable ahead carry an `[...]...[...] =` chain?
    fn is_indexed_assign(&self) -> Exec<bool> {
        let stream = self.stream()?;
        let range = stream.range();
        let mut i = stream.pos() + 1;
        let start = i;
        while range.get(i).map(|t| t.kind) == Some(TokenKind::LBracket) {
            let mut depth = 0usize;
            loop {
                let Some(token) = range.get(i) else {
                    return Ok(false);
                };
                match token.kind {
                    TokenKind::LBracket => depth += 1,
                    TokenKind::RBracket => {
                        depth -= 1;
                        if depth == 0 {
                            i += 1;
                            break;
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
        }
        Ok(i > start && range.get(i).map(|t| t.kind) == Some(TokenKind::Eq))
    }

    fn exec_index_assign(&mut self) -> Exec<()> {
        let var_tok = self.bump()?;
        let name = var_tok.var_name().to_string();
        let mut target = self.frame()?.vars.get(&name).cloned().ok_or_else(|| {
            ScriptError::new(
                ErrorKind::VariableUndefined,
                &var_tok,
                format!("undefined variable `{}`", name),
            )
        })?;

        loop {
            let open = self.expect(TokenKind::LBracket)?;
            let index = self.expression()?;
            let slice_end = if self.peek_kind() == Some(TokenKind::DotDot) {
                self.bump()?;
                Some(self.expression()?)
            } else {
                None
            };
            self.expect(TokenKind::RBracket)?;

            if self.peek_kind() == Some(TokenKind::Eq) {
                self.bump()?;
                let value = self.expression()?;
                return match slice_end {
                    Some(end) => self.slice_set(&open, &target, index, end, value),
                    None => self.index_set(&open, &target, index, value),
                };
            }
            // intermediate step of a chain: read through
            target = match slice_end {
                Some(end) => self.slice_get(&open, target, index, end)?,
                None => self.index_get(&open, target, index)?,
            };
        }
    }

    fn index_set(&mut self, open: &Token, target: &Value, index: Value, value: Value) -> Exec<()> {
        match (target, &index) {
            (Value::List(items), Value::Int(i)) => {
                let mut items = items.borrow_mut();
                let len = items.len() as i64;
                if *i < 0 || *i >= len {
                    return Err(ScriptError::new(
                        ErrorKind::Index,
                        open,
                        format!("index {} out of bounds for list of {}", i, len),
                    )
                    .into());
                }
                items[*i as usize] = value;
                Ok(())
            }
            (Value::Hash(map), Value::Str(key)) => {
                map.borrow_mut().insert(key.clone(), value);
                Ok(())
            }
            (t, i) => Err(ScriptError::new(
                ErrorKind::Conversion,
                open,
                format!("cannot index {} with {}", t.type_name(), i.type_name()),
            )
            .into()),
        }
    }

    /// Slice assignment: the right-hand side is coerced to a list and
    /// spliced over the inclusive range.
    fn slice_set(
        &mut self,
        open: &Token,
        target: &Value,
        lo: Value,
        hi: Value,
        value: Value,
    ) -> Exec<()> {
        let Value::List(items) = target else {
            return Err(ScriptError::new(
                ErrorKind::Conversion,
                open,
                format!("cannot slice-assign into {}", target.type_name()),
            )
            .into());
        };
        let (lo, hi) = match (lo.as_int(), hi.as_int()) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(
                    ScriptError::new(ErrorKind::Range, open, "slice bounds must be ints").into(),
                );
            }
        };
        let mut items = items.borrow_mut();
        let len = items.len() as i64;
        if lo < 0 || hi >= len || lo > hi {
            return Err(ScriptError::new(
                ErrorKind::Range,
                open,
                format!("slice {}..{} out of bounds for list of {}", lo, hi, len),
            )
            .into());
        }
        let replacement = serializer::to_list(&value);
        items.splice(lo as usize..=hi as usize, replacement);
        Ok(())
    }

    fn exec_field_assign(&mut self) -> Exec<()> {
        let var_tok = self.bump()?;
        let name = var_tok.var_name().to_string();
        self.expect(TokenKind::Dot)?;
        let field_tok = self.bump()?;
        self.expect(TokenKind::Eq)?;
        let value = self.expression()?;
        let target = self.frame()?.vars.get(&name).cloned().ok_or_else(|| {
            ScriptError::new(
                ErrorKind::VariableUndefined,
                &var_tok,
                format!("undefined variable `{}`", name),
            )
        })?;
        match target {
            // writes are not privacy-checked; only qualified reads are
            Value::Object(object) => {
                object.borrow_mut().fields.insert(field_tok.text.clone(), value);
                Ok(())
            }
            other => Err(ScriptError::new(
                ErrorKind::InvalidOperation,
                &field_tok,
                format!("cannot assign a field on {}", other.type_name()),
            )
            .into()),
        }
    }

    fn exec_this_statement(&mut self) -> Exec<()> {
        // `this.field = expr` writes the instance variable (and creates it);
        // anything else starting with `this` is an expression
        if self.peek_kind_at(1) == Some(TokenKind::Dot)
            && self.peek_kind_at(2) == Some(TokenKind::Ident)
            && self.peek_kind_at(3) == Some(TokenKind::Eq)
        {
            let this_tok = self.bump()?;
            self.expect(TokenKind::Dot)?;
            let field_tok = self.bump()?;
            self.expect(TokenKind::Eq)?;
            let value = self.expression()?;
            let object = self.frame()?.object().cloned().ok_or_else(|| {
                ScriptError::new(
                    ErrorKind::InvalidContext,
                    &this_tok,
                    "`this` used outside of an instance method",
                )
            })?;
            object
                .borrow_mut()
                .fields
                .insert(field_tok.text.clone(), value.clone());
            // keep the flattened copy coherent for unqualified reads
            self.frame_mut()?.vars.insert(field_tok.text, value);
            Ok(())
        } else {
            self.expression()?;
            Ok(())
        }
    }

    fn exec_return(&mut self) -> Exec<()> {
        self.stream_mut()?.bump();
        let value = match self.peek_kind() {
            None
            | Some(TokenKind::End)
            | Some(TokenKind::Elsif)
            | Some(TokenKind::Else)
            | Some(TokenKind::Catch)
            | Some(TokenKind::Semi) => Value::Unit,
            _ => self.expression()?,
        };
        let frame = self.frame_mut()?;
        frame.return_value = Some(value);
        frame.flags.returning = true;
        Ok(())
    }

    fn exec_exit(&mut self) -> Exec<()> {
        let exit_tok = self.bump()?;
        let code = match self.peek_kind() {
            None
            | Some(TokenKind::End)
            | Some(TokenKind::Elsif)
            | Some(TokenKind::Else)
            | Some(TokenKind::Catch)
            | Some(TokenKind::Semi) => 0,
            _ => {
                let value = self.expression()?;
                value.as_int().ok_or_else(|| {
                    ScriptError::new(
                        ErrorKind::Conversion,
                        &exit_tok,
                        format!("exit code must be an int, got {}", value.type_name()),
                    )
                })?
            }
        };
        Err(Interrupt::Exit(code as i32))
    }

    // ---------------- body capture ----------------

    /// Capture from the cursor to the matching `end` (exclusive), leaving
    /// the cursor just past the `end`.
    pub(crate) fn block_range(&mut self, opener: &Token) -> Exec<TokenRange> {
        let (range, start) = {
            let stream = self.stream()?;
            (stream.range().clone(), stream.pos())
        };
        let mut depth = 0usize;
        let mut i = start;
        while let Some(token) = range.get(i) {
            if token.kind.opens_block() {
                depth += 1;
            } else if token.kind == TokenKind::End {
                if depth == 0 {
                    let body = range.slice(start, i);
                    self.stream_mut()?.set_pos(i + 1);
                    return Ok(body);
                }
                depth -= 1;
            }
            i += 1;
        }
        Err(ScriptError::new(ErrorKind::Syntax, opener, "missing `end`").into())
    }

    /// Capture a parenthesized condition, cursor past the `)`
    fn paren_range(&mut self, at: &Token) -> Exec<TokenRange> {
        self.expect(TokenKind::LParen)?;
        let (range, start) = {
            let stream = self.stream()?;
            (stream.range().clone(), stream.pos())
        };
        let mut depth = 0usize;
        let mut i = start;
        while let Some(token) = range.get(i) {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    if depth == 0 {
                        let inner = range.slice(start, i);
                        if inner.is_empty() {
                            return Err(
                                ScriptError::new(ErrorKind::Syntax, at, "empty condition").into()
                            );
                        }
                        self.stream_mut()?.set_pos(i + 1);
                        return Ok(inner);
                    }
                    depth -= 1;
                }
                _ => {}
            }
            i += 1;
        }
        Err(ScriptError::new(ErrorKind::Syntax, at, "missing `)`").into())
    }

    // ---------------- sub-frame execution ----------------

    /// Run a body in an inherited sub-frame and apply the teardown rules:
    /// fall-through merges variables the caller already declares; a return
    /// transfers the value and re-raises the flag on nested callers; loop
    /// flags merge variables and bubble to the caller.
    pub(crate) fn run_sub(
        &mut self,
        body: &TokenRange,
        seeds: &[(String, Value)],
        at: &Token,
    ) -> Exec<()> {
        let mut frame = Frame::inherited(self.frame()?);
        for (name, value) in seeds {
            frame.vars.insert(name.clone(), value.clone());
        }
        self.push_frame(frame, TokenStream::new(body.clone()), at)?;
        let result = self.execute();
        let child = self.pop_frame()?;
        result?;

        let nested = self.frames.len() > 1;
        let caller = self.frame_mut()?;
        caller.adopt_lambdas(&child);
        if child.flags.returning {
            caller.return_value = child.return_value.clone();
            if nested {
                caller.flags.returning = true;
            }
        } else {
            caller.absorb(&child);
            caller.flags.loop_break |= child.flags.loop_break;
            caller.flags.loop_continue |= child.flags.loop_continue;
        }
        Ok(())
    }

    /// Evaluate a captured token range by re-walking it as an assignment
    /// to a synthetic temporary inside an inherited sub-frame (the
    /// mechanism behind conditions, defaults and interpolation).
    pub(crate) fn eval_fragment(&mut self, range: &TokenRange, prefix: &str) -> Exec<Value> {
        let name = self.ids.next(prefix);
        let mut tokens = Vec::with_capacity(range.len() + 2);
        tokens.push(Token::synthetic(TokenKind::Variable, format!("@{}", name)));
        tokens.push(Token::synthetic(TokenKind::Eq, "="));
        tokens.extend(range.to_vec());
        let at = tokens[0].clone();

        let fragment = TokenRange::whole(Rc::new(tokens));
        let frame = Frame::inherited(self.frame()?);
        self.push_frame(frame, TokenStream::new(fragment), &at)?;
        let result = self.execute();
        let child = self.pop_frame()?;
        result?;

        let caller = self.frame_mut()?;
        caller.absorb(&child);
        caller.adopt_lambdas(&child);
        child.vars.get(&name).cloned().ok_or_else(|| {
            ScriptError::bare(ErrorKind::EmptyStack, "synthetic temporary lost").into()
        })
    }

    // ---------------- control flow ----------------

    fn exec_if(&mut self) -> Exec<()> {
        let if_tok = self.bump()?;
        let first_cond = self.paren_range(&if_tok)?;

        // one forward scan collects every branch's token range
        let mut branches: Vec<(Option<TokenRange>, TokenRange)> = Vec::new();
        let mut pending = Some(first_cond);
        let (range, mut i) = {
            let stream = self.stream()?;
            (stream.range().clone(), stream.pos())
        };
        let mut body_start = i;
        let mut depth = 0usize;
        loop {
            let Some(token) = range.get(i) else {
                return Err(ScriptError::new(ErrorKind::Syntax, &if_tok, "missing `end`").into());
            };
            if token.kind.opens_block() {
                depth += 1;
                i += 1;
                continue;
            }
            match token.kind {
                TokenKind::End if depth == 0 => {
                    branches.push((pending.take(), range.slice(body_start, i)));
                    i += 1;
                    break;
                }
                TokenKind::End => {
                    depth -= 1;
                    i += 1;
                }
                TokenKind::Elsif if depth == 0 => {
                    branches.push((pending.take(), range.slice(body_start, i)));
                    let elsif_tok = token.clone();
                    self.stream_mut()?.set_pos(i + 1);
                    pending = Some(self.paren_range(&elsif_tok)?);
                    i = self.stream()?.pos();
                    body_start = i;
                }
                TokenKind::Else if depth == 0 => {
                    branches.push((pending.take(), range.slice(body_start, i)));
                    i += 1;
                    body_start = i;
                }
                _ => i += 1,
            }
        }
        self.stream_mut()?.set_pos(i);

        // conditions evaluate in source order; the first true branch
        // short-circuits the rest
        for (cond, body) in branches {
            let taken = match &cond {
                Some(cond) => {
                    let value = self.eval_fragment(cond, "cond")?;
                    ops::condition(&value, &if_tok)?
                }
                None => true,
            };
            if taken {
                self.run_sub(&body, &[], &if_tok)?;
                break;
            }
        }
        Ok(())
    }

    fn exec_while(&mut self) -> Exec<()> {
        let while_tok = self.bump()?;
        let cond = self.paren_range(&while_tok)?;
        let body = self.block_range(&while_tok)?;

        loop {
            // the retained condition range is re-walked before every pass
            let value = self.eval_fragment(&cond, "cond")?;
            if !ops::condition(&value, &while_tok)? {
                break;
            }
            self.run_sub(&body, &[], &while_tok)?;
            if self.consume_loop_flags()? {
                break;
            }
        }
        Ok(())
    }

    fn exec_for(&mut self) -> Exec<()> {
        let for_tok = self.bump()?;
        let item_tok = self.bump()?;
        if !matches!(item_tok.kind, TokenKind::Variable | TokenKind::Ident) {
            return Err(
                ScriptError::new(ErrorKind::Syntax, &item_tok, "expected loop variable").into(),
            );
        }
        let item = item_tok.var_name().to_string();
        let second = if self.peek_kind() == Some(TokenKind::Comma) {
            self.bump()?;
            let tok = self.bump()?;
            if !matches!(tok.kind, TokenKind::Variable | TokenKind::Ident) {
                return Err(
                    ScriptError::new(ErrorKind::Syntax, &tok, "expected loop variable").into(),
                );
            }
            Some(tok.var_name().to_string())
        } else {
            None
        };
        self.expect(TokenKind::In)?;
        // the collection expression is evaluated exactly once
        let collection = self.expression()?;
        self.expect(TokenKind::Do)?;
        let body = self.block_range(&for_tok)?;

        match collection {
            Value::List(items) => {
                let snapshot = items.borrow().clone();
                for (index, value) in snapshot.into_iter().enumerate() {
                    let mut seeds = vec![(item.clone(), value)];
                    if let Some(second) = &second {
                        seeds.push((second.clone(), Value::Int(index as i64)));
                    }
                    self.run_sub(&body, &seeds, &for_tok)?;
                    if self.consume_loop_flags()? {
                        break;
                    }
                }
            }
            Value::Hash(map) => {
                // the explicit insertion order, never incidental map order
                let snapshot: Vec<(String, Value)> = map
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                for (key, value) in snapshot {
                    let mut seeds = vec![(item.clone(), Value::Str(key))];
                    if let Some(second) = &second {
                        seeds.push((second.clone(), value));
                    }
                    self.run_sub(&body, &seeds, &for_tok)?;
                    if self.consume_loop_flags()? {
                        break;
                    }
                }
            }
            other => {
                return Err(ScriptError::new(
                    ErrorKind::Conversion,
                    &for_tok,
                    format!("cannot iterate over {}", other.type_name()),
                )
                .into());
            }
        }
        Ok(())
    }

    /// Consume break/next bubbled up from a loop body. Returns true when
    /// the loop must stop (break, or a return passing through).
    fn consume_loop_flags(&mut self) -> Exec<bool> {
        let flags = &mut self.frame_mut()?.flags;
        if flags.loop_continue {
            flags.loop_continue = false;
            return Ok(false);
        }
        if flags.loop_break {
            flags.loop_break = false;
            return Ok(true);
        }
        Ok(flags.returning)
    }

    // ---------------- try/catch ----------------

    /// Handle `catch`, both with a pending error (run the handler) and on
    /// normal completion of the try body (skip it). Clears error state
    /// and the in-try flag either way.
    fn exec_catch(&mut self) -> Exec<()> {
        let catch_tok = self.bump()?;
        let mut binders = Vec::new();
        if self.peek_kind() == Some(TokenKind::LParen) {
            self.bump()?;
            loop {
                let token = self.bump()?;
                match token.kind {
                    TokenKind::Ident | TokenKind::Variable => {
                        binders.push(token.var_name().to_string());
                    }
                    _ => {
                        return Err(ScriptError::new(
                            ErrorKind::Syntax,
                            &token,
                            "expected a binder name in `catch(...)`",
                        )
                        .into());
                    }
                }
                match self.peek_kind() {
                    Some(TokenKind::Comma) => {
                        self.bump()?;
                    }
                    Some(TokenKind::RParen) => {
                        self.bump()?;
                        break;
                    }
                    _ => return Err(self.error_here(ErrorKind::Syntax, "expected `,` or `)`")),
                }
            }
        }
        if binders.len() > 2 {
            return Err(ScriptError::new(
                ErrorKind::Syntax,
                &catch_tok,
                "catch binds at most two names (kind, message)",
            )
            .into());
        }

        let body = self.block_range(&catch_tok)?;
        let error = {
            let frame = self.frame_mut()?;
            frame.flags.in_try = false;
            frame.error.take()
        };
        if let Some(error) = error {
            let seeds: Vec<(String, Value)> = match binders.as_slice() {
                [] => Vec::new(),
                [msg] => vec![(msg.clone(), Value::Str(error.message.clone()))],
                [kind, msg] => vec![
                    (kind.clone(), Value::Str(error.kind.tag().to_string())),
                    (msg.clone(), Value::Str(error.message.clone())),
                ],
                _ => unreachable!(),
            };
            self.run_sub(&body, &seeds, &catch_tok)?;
        }
        Ok(())
    }

    // ---------------- definitions ----------------

    fn exec_def(&mut self) -> Exec<()> {
        let def_tok = self.bump()?;
        let method = self.parse_method(&def_tok, MethodFlags::default())?;
        if self.classes.contains_key(&method.name) {
            return Err(ScriptError::new(
                ErrorKind::IllegalName,
                &def_tok,
                format!("`{}` already names a class", method.name),
            )
            .into());
        }
        let key = match &self.active_module {
            Some(module) => format!("{}::{}", module, method.name),
            None => method.name.clone(),
        };
        tracing::debug!(method = %key, "defined method");
        self.methods.insert(key, method);
        Ok(())
    }

    /// Parse `name(params) body end` after a `def`
    fn parse_method(&mut self, def_tok: &Token, mut flags: MethodFlags) -> Exec<Method> {
        let name_tok = self.bump()?;
        if name_tok.kind != TokenKind::Ident {
            return Err(ScriptError::new(
                ErrorKind::IllegalName,
                &name_tok,
                format!("`{}` cannot name a method", name_tok.text),
            )
            .into());
        }
        let params = self.parse_params()?;
        let body = self.block_range(def_tok)?;
        if name_tok.text == "initialize" {
            flags.is_ctor = true;
        }
        Ok(Method {
            name: name_tok.text.clone(),
            params,
            body,
            flags,
            home: self.active_module.clone(),
        })
    }

    pub(crate) fn parse_params(&mut self) -> Exec<Vec<Param>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if self.peek_kind() == Some(TokenKind::RParen) {
            self.bump()?;
            return Ok(params);
        }
        loop {
            let token = self.bump()?;
            let name = match token.kind {
                TokenKind::Ident | TokenKind::Variable => token.var_name().to_string(),
                _ => {
                    return Err(ScriptError::new(
                        ErrorKind::Syntax,
                        &token,
                        "expected a parameter name",
                    )
                    .into());
                }
            };
            let default = if self.peek_kind() == Some(TokenKind::Eq) {
                self.bump()?;
                Some(self.default_range(&token)?)
            } else {
                None
            };
            params.push(Param { name, default });
            match self.peek_kind() {
                Some(TokenKind::Comma) => {
                    self.bump()?;
                }
                Some(TokenKind::RParen) => {
                    self.bump()?;
                    break;
                }
                _ => {
                    return Err(
                        self.error_here(ErrorKind::Syntax, "expected `,` or `)` after parameter")
                    );
                }
            }
        }
        Ok(params)
    }

    /// Capture a default-value expression up to the comma or `)` that
    /// closes it, honoring nested brackets.
    fn default_range(&mut self, at: &Token) -> Exec<TokenRange> {
        let (range, start) = {
            let stream = self.stream()?;
            (stream.range().clone(), stream.pos())
        };
        let mut depth = 0usize;
        let mut i = start;
        while let Some(token) = range.get(i) {
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                TokenKind::Comma if depth == 0 => break,
                _ => {}
            }
            i += 1;
        }
        if i == start {
            return Err(ScriptError::new(ErrorKind::Syntax, at, "empty default value").into());
        }
        let captured = range.slice(start, i);
        self.stream_mut()?.set_pos(i);
        Ok(captured)
    }

    fn exec_class(&mut self) -> Exec<()> {
        let first = self.bump()?;
        let is_abstract = if first.kind == TokenKind::Abstract {
            self.expect(TokenKind::Class)?;
            true
        } else {
            false
        };
        let name_tok = self.bump()?;
        if name_tok.kind != TokenKind::Ident {
            return Err(ScriptError::new(
                ErrorKind::IllegalName,
                &name_tok,
                format!("`{}` cannot name a class", name_tok.text),
            )
            .into());
        }
        let name = name_tok.text.clone();
        if self.classes.contains_key(&name) {
            return Err(ScriptError::new(
                ErrorKind::ClassRedefinition,
                &name_tok,
                format!("class `{}` is already defined", name),
            )
            .into());
        }

        let mut base = None;
        let mut methods: IndexMap<String, Method> = IndexMap::new();
        let mut private_vars: FxHashSet<String> = FxHashSet::default();
        if self.peek_kind() == Some(TokenKind::Lt) {
            self.bump()?;
            let base_tok = self.bump()?;
            if base_tok.kind != TokenKind::Ident {
                return Err(ScriptError::new(
                    ErrorKind::Syntax,
                    &base_tok,
                    "expected a base class name",
                )
                .into());
            }
            let base_def = self.classes.get(&base_tok.text).ok_or_else(|| {
                ScriptError::new(
                    ErrorKind::ClassUndefined,
                    &base_tok,
                    format!("undefined base class `{}`", base_tok.text),
                )
            })?;
            // static flattening: the base's table is copied in now
            methods = base_def.methods.clone();
            private_vars = base_def.private_vars.clone();
            base = Some(base_tok.text.clone());
        }
        let inherited: FxHashSet<String> = methods.keys().cloned().collect();

        // the class body is walked once, at definition time
        loop {
            let token = self.bump()?;
            match token.kind {
                TokenKind::End => break,
                TokenKind::Semi => continue,
                TokenKind::Private if self.peek_kind() == Some(TokenKind::LParen) => {
                    self.bump()?;
                    loop {
                        let tok = self.bump()?;
                        match tok.kind {
                            TokenKind::Ident | TokenKind::Variable => {
                                private_vars.insert(tok.var_name().to_string());
                            }
                            _ => {
                                return Err(ScriptError::new(
                                    ErrorKind::Syntax,
                                    &tok,
                                    "expected a variable name in `private(...)`",
                                )
                                .into());
                            }
                        }
                        match self.peek_kind() {
                            Some(TokenKind::Comma) => {
                                self.bump()?;
                            }
                            Some(TokenKind::RParen) => {
                                self.bump()?;
                                break;
                            }
                            _ => {
                                return Err(
                                    self.error_here(ErrorKind::Syntax, "expected `,` or `)`")
                                );
                            }
                        }
                    }
                }
                TokenKind::Abstract
                | TokenKind::Override
                | TokenKind::Private
                | TokenKind::Static
                | TokenKind::Def => {
                    let mut flags = MethodFlags::default();
                    let mut token = token;
                    loop {
                        match token.kind {
                            TokenKind::Abstract => flags.is_abstract = true,
                            TokenKind::Override => flags.is_override = true,
                            TokenKind::Private => flags.is_private = true,
                            TokenKind::Static => flags.is_static = true,
                            TokenKind::Def => break,
                            _ => {
                                return Err(ScriptError::new(
                                    ErrorKind::Syntax,
                                    &token,
                                    "expected `def` after method modifiers",
                                )
                                .into());
                            }
                        }
                        token = self.bump()?;
                    }
                    let method = self.parse_method(&token, flags)?;
                    if inherited.contains(&method.name) && !method.flags.is_override {
                        return Err(ScriptError::new(
                            ErrorKind::OverrideRequired,
                            &token,
                            format!(
                                "`{}` redefines a method inherited from `{}` and must be marked `override`",
                                method.name,
                                base.as_deref().unwrap_or("<base>")
                            ),
                        )
                        .into());
                    }
                    methods.insert(method.name.clone(), method);
                }
                _ => {
                    return Err(ScriptError::new(
                        ErrorKind::Syntax,
                        &token,
                        "only method definitions and `private(...)` belong in a class body",
                    )
                    .into());
                }
            }
        }

        if !is_abstract {
            for method in methods.values() {
                if method.flags.is_abstract {
                    return Err(ScriptError::new(
                        ErrorKind::AbstractMethod,
                        &name_tok,
                        format!("concrete class `{}` leaves `{}` abstract", name, method.name),
                    )
                    .into());
                }
            }
        }

        tracing::debug!(class = %name, methods = methods.len(), "defined class");
        self.classes.insert(
            name.clone(),
            ClassDef {
                name,
                base,
                is_abstract,
                methods,
                private_vars,
            },
        );
        Ok(())
    }

    // ---------------- modules ----------------

    fn exec_module_def(&mut self) -> Exec<()> {
        let module_tok = self.bump()?;
        let name_tok = self.bump()?;
        if name_tok.kind != TokenKind::Ident {
            return Err(ScriptError::new(
                ErrorKind::IllegalName,
                &name_tok,
                format!("`{}` cannot name a module", name_tok.text),
            )
            .into());
        }
        let body = self.block_range(&module_tok)?;
        self.modules.insert(
            name_tok.text.clone(),
            ModuleDef {
                name: name_tok.text.clone(),
                home: self.active_module.clone(),
                body,
            },
        );
        Ok(())
    }

    fn exec_import(&mut self) -> Exec<()> {
        self.stream_mut()?.bump();
        let target = self.bump()?;
        let alias = if self.peek_kind() == Some(TokenKind::As) {
            self.bump()?;
            let alias_tok = self.bump()?;
            if alias_tok.kind != TokenKind::Ident {
                return Err(ScriptError::new(
                    ErrorKind::IllegalName,
                    &alias_tok,
                    format!("`{}` cannot name an alias", alias_tok.text),
                )
                .into());
            }
            Some(alias_tok)
        } else {
            None
        };

        match target.kind {
            TokenKind::StringLit => {
                if let Some(alias_tok) = &alias {
                    return Err(ScriptError::new(
                        ErrorKind::Syntax,
                        alias_tok,
                        "`as` applies to module imports, not file imports",
                    )
                    .into());
                }
                let path = match &target.literal {
                    Some(crate::lexer::Literal::Str(s)) => s.clone(),
                    _ => String::new(),
                };
                self.import_file(&target, &path)
            }
            TokenKind::Ident => {
                self.import_module(&target)?;
                if let Some(alias_tok) = alias {
                    self.alias_module(&target, &alias_tok)?;
                }
                Ok(())
            }
            _ => Err(ScriptError::new(
                ErrorKind::Syntax,
                &target,
                "expected a module name or file path after `import`",
            )
            .into()),
        }
    }

    /// Execute a module body in a fresh sub-frame with its namespace
    /// active, so its `def`s register as `module::name`.
    fn import_module(&mut self, name_tok: &Token) -> Exec<()> {
        let module = self.modules.get(&name_tok.text).cloned().ok_or_else(|| {
            ScriptError::new(
                ErrorKind::ModuleUndefined,
                name_tok,
                format!("undefined module `{}`", name_tok.text),
            )
        })?;
        tracing::debug!(module = %module.name, "importing module");
        let saved = self.active_module.replace(module.name.clone());
        let result = self.run_sub(&module.body, &[], name_tok);
        self.active_module = saved;
        result
    }

    /// `import M as A`: every `M::method` is stripped of its prefix and
    /// re-registered as a static method on a synthetic class `A`; the
    /// originals and the module entry are removed. Aliasing consumes the
    /// module.
    fn alias_module(&mut self, name_tok: &Token, alias_tok: &Token) -> Exec<()> {
        let alias = alias_tok.text.clone();
        if self.classes.contains_key(&alias) {
            return Err(ScriptError::new(
                ErrorKind::ClassRedefinition,
                alias_tok,
                format!("`{}` already names a class", alias),
            )
            .into());
        }
        let prefix = format!("{}::", name_tok.text);
        let mut keys: Vec<String> = self
            .methods
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        keys.sort();
        let mut table = IndexMap::new();
        for key in keys {
            if let Some(mut method) = self.methods.remove(&key) {
                let short = key[prefix.len()..].to_string();
                method.flags.is_static = true;
                method.name = short.clone();
                table.insert(short, method);
            }
        }
        self.modules.remove(&name_tok.text);
        tracing::debug!(module = %name_tok.text, alias = %alias, methods = table.len(), "aliased module");
        self.classes.insert(
            alias.clone(),
            ClassDef {
                name: alias,
                base: None,
                is_abstract: false,
                methods: table,
                private_vars: FxHashSet::default(),
            },
        );
        Ok(())
    }

    /// `import "path"`: read, lex and execute a second source file inline,
    /// sharing this instance's registries. Read failures are host faults
    /// and always fatal.
    fn import_file(&mut self, at: &Token, path: &str) -> Exec<()> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            ScriptError::host(
                ErrorKind::InvalidOperation,
                at,
                format!("cannot read `{}`: {}", path, e),
            )
        })?;
        tracing::debug!(path = %path, "importing file");
        self.sources.insert(path.to_string(), source.clone());
        let tokens = lexer::lex(path, &source);
        let range = TokenRange::whole(Rc::new(tokens));
        self.run_sub(&range, &[], at)
    }

    fn exec_export(&mut self) -> Exec<()> {
        self.stream_mut()?.bump();
        let name_tok = self.bump()?;
        if name_tok.kind != TokenKind::Ident {
            return Err(ScriptError::new(
                ErrorKind::Syntax,
                &name_tok,
                "expected a module name after `export`",
            )
            .into());
        }
        self.import_module(&name_tok)?;
        // the module name propagates through the caller's return slot
        self.frame_mut()?.return_value = Some(Value::Str(name_tok.text.clone()));
        Ok(())
    }

    // ---------------- invocation ----------------

    /// Invoke a method or lambda: bind parameters (defaults evaluate in
    /// the caller's frame), run the body in an isolated frame, write
    /// instance variables back, and substitute the object context for an
    /// unset default return.
    pub(crate) fn invoke_method(
        &mut self,
        call_tok: &Token,
        method: &Method,
        args: Vec<Value>,
        object: Option<Rc<RefCell<Object>>>,
    ) -> Exec<Value> {
        if args.len() > method.params.len() {
            let required = method.required_params();
            let expected = if required == method.params.len() {
                format!("{}", required)
            } else {
                format!("{} to {}", required, method.params.len())
            };
            return Err(ScriptError::new(
                ErrorKind::ParameterCountMismatch,
                call_tok,
                format!(
                    "`{}` takes {} parameter(s), got {}",
                    method.name,
                    expected,
                    args.len()
                ),
            )
            .into());
        }
        let mut bound = Vec::with_capacity(method.params.len());
        for (i, param) in method.params.iter().enumerate() {
            let value = match args.get(i) {
                Some(value) => value.clone(),
                None => match &param.default {
                    Some(range) => self.eval_fragment(range, "dflt")?,
                    None => {
                        return Err(ScriptError::new(
                            ErrorKind::ParameterMissing,
                            call_tok,
                            format!("`{}` requires parameter `{}`", method.name, param.name),
                        )
                        .into());
                    }
                },
            };
            bound.push((param.name.clone(), value));
        }

        let mut frame = Frame::isolated(object);
        for (name, value) in bound {
            // a lambda argument carries its definition into the callee
            if let Value::Lambda(lambda_name) = &value {
                if let Some(def) = self.find_lambda(lambda_name) {
                    frame.lambdas.insert(lambda_name.clone(), def);
                }
            }
            frame.vars.insert(name, value);
        }

        tracing::trace!(method = %method.name, "invoking");
        self.push_frame(frame, TokenStream::new(method.body.clone()), call_tok)?;
        // the defining namespace is active while the body runs
        let saved = std::mem::replace(&mut self.active_module, method.home.clone());
        let result = self.execute();
        self.active_module = saved;
        let child = self.pop_frame()?;
        result?;

        child.write_back_object();
        // an unset (or unit) return yields the receiver, so constructors
        // and mutators hand the object back by default
        let value = match &child.return_value {
            Some(Value::Unit) | None => match child.object() {
                Some(object) => Value::Object(Rc::clone(object)),
                None => Value::Unit,
            },
            Some(value) => value.clone(),
        };
        // a returned lambda must stay callable after its frame pops
        if let Value::Lambda(name) = &value {
            if let Some(def) = child.lambdas.get(name) {
                self.frame_mut()?.lambdas.insert(name.clone(), def.clone());
            }
        }
        Ok(value)
    }

    /// `Class.new(...)`: abstract classes cannot be instantiated; a
    /// missing `initialize` is an error.
    pub(crate) fn instantiate(
        &mut self,
        call_tok: &Token,
        class_name: &str,
        args: Vec<Value>,
    ) -> Exec<Value> {
        let class = self.classes.get(class_name).cloned().ok_or_else(|| {
            ScriptError::new(
                ErrorKind::ClassUndefined,
                call_tok,
                format!("undefined class `{}`", class_name),
            )
        })?;
        if class.is_abstract {
            return Err(ScriptError::new(
                ErrorKind::InvalidContext,
                call_tok,
                format!("cannot instantiate abstract class `{}`", class_name),
            )
            .into());
        }
        let ctor = class.methods.get("initialize").cloned().ok_or_else(|| {
            ScriptError::new(
                ErrorKind::MethodUndefined,
                call_tok,
                format!("class `{}` has no `initialize` constructor", class_name),
            )
        })?;
        let object = Rc::new(RefCell::new(Object {
            id: self.ids.next("obj"),
            class_name: class_name.to_string(),
            fields: IndexMap::new(),
        }));
        self.invoke_method(call_tok, &ctor, args, Some(Rc::clone(&object)))?;
        Ok(Value::Object(object))
    }

    /// Class-qualified call: `new`, or a static/ctor-flagged method
    pub(crate) fn class_call(
        &mut self,
        call_tok: &Token,
        class_name: &str,
        method_name: &str,
        args: Vec<Value>,
    ) -> Exec<Value> {
        if method_name == "new" {
            return self.instantiate(call_tok, class_name, args);
        }
        let method = self
            .classes
            .get(class_name)
            .and_then(|c| c.methods.get(method_name))
            .cloned()
            .ok_or_else(|| {
                ScriptError::new(
                    ErrorKind::MethodUndefined,
                    call_tok,
                    format!("class `{}` has no method `{}`", class_name, method_name),
                )
            })?;
        if !(method.flags.is_static || method.flags.is_ctor) {
            return Err(ScriptError::new(
                ErrorKind::InvalidContext,
                call_tok,
                format!(
                    "`{}::{}` is not static; call it on an instance",
                    class_name, method_name
                ),
            )
            .into());
        }
        if method.flags.is_private && !self.same_class_context(class_name) {
            return Err(ScriptError::new(
                ErrorKind::InvalidContext,
                call_tok,
                format!("`{}` is private to class `{}`", method_name, class_name),
            )
            .into());
        }
        self.invoke_method(call_tok, &method, args, None)
    }

    /// Instance call: class method table first, then the builtin
    /// dispatcher as universal fallback.
    pub(crate) fn instance_call(
        &mut self,
        call_tok: &Token,
        object: Rc<RefCell<Object>>,
        method_name: &str,
        args: Vec<Value>,
    ) -> Exec<Value> {
        let class_name = object.borrow().class_name.clone();
        let method = self
            .classes
            .get(&class_name)
            .and_then(|c| c.methods.get(method_name))
            .cloned();
        match method {
            Some(method) => {
                if method.flags.is_private && !self.same_class_context(&class_name) {
                    return Err(ScriptError::new(
                        ErrorKind::InvalidContext,
                        call_tok,
                        format!("`{}` is private to class `{}`", method_name, class_name),
                    )
                    .into());
                }
                self.invoke_method(call_tok, &method, args, Some(object))
            }
            None => self.call_builtin(call_tok, method_name, Some(Value::Object(object)), args),
        }
    }

    /// Is the current frame's object context an instance of `class_name`?
    pub(crate) fn same_class_context(&self, class_name: &str) -> bool {
        self.frames
            .last()
            .and_then(|f| f.object())
            .map(|o| o.borrow().class_name == class_name)
            .unwrap_or(false)
    }

    pub(crate) fn find_lambda(&self, name: &str) -> Option<Method> {
        self.frames.iter().rev().find_map(|f| f.lambdas.get(name).cloned())
    }

    pub(crate) fn call_builtin(
        &mut self,
        token: &Token,
        name: &str,
        receiver: Option<Value>,
        args: Vec<Value>,
    ) -> Exec<Value> {
        let mut builtins = self.builtins.take().ok_or_else(|| {
            ScriptError::bare(ErrorKind::EmptyStack, "builtin dispatcher unavailable")
        })?;
        let result = builtins.dispatch(
            self,
            BuiltinCall {
                token,
                name,
                receiver,
                args,
            },
        );
        self.builtins = Some(builtins);
        result
    }
}

impl LambdaHost for Interpreter {
    fn call_lambda(
        &mut self,
        token: &Token,
        lambda: &Value,
        args: Vec<Value>,
    ) -> Result<Value, Interrupt> {
        match lambda {
            Value::Lambda(name) => {
                let method = self.find_lambda(name).ok_or_else(|| {
                    ScriptError::new(
                        ErrorKind::MethodUndefined,
                        token,
                        format!("lambda `{}` is no longer in scope", name),
                    )
                })?;
                self.invoke_method(token, &method, args, None)
            }
            other => Err(ScriptError::new(
                ErrorKind::Conversion,
                token,
                format!("expected a lambda, got {}", other.type_name()),
            )
            .into()),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
