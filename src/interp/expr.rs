//! Expression evaluation
//!
//! Precedence-climbing directly over the token stream. Everything is
//! evaluated eagerly, including both operands of `&&`/`||` and both arms
//! of the ternary; the operators themselves only select or combine the
//! already-computed values.
//!
//! Identifier resolution order is fixed: class, then method, then
//! variable, then the builtin dispatcher as universal fallback.

use std::rc::Rc;

use crate::diagnostics::{ErrorKind, ScriptError};
use crate::lexer::{Literal, Token, TokenKind};

use super::builtins::LambdaHost;
use super::defs::{Method, MethodFlags};
use super::engine::{Exec, Interpreter};
use super::ops;
use super::serializer;
use super::stream::TokenRange;
use super::value::Value;

/// Binary operators, loosest first. Each row is one precedence level;
/// all operators within a row associate left.
const LEVELS: &[&[TokenKind]] = &[
    &[TokenKind::PipePipe],
    &[TokenKind::AmpAmp],
    &[TokenKind::Pipe],
    &[TokenKind::Caret],
    &[TokenKind::Amp],
    &[TokenKind::EqEq, TokenKind::Ne],
    &[TokenKind::Lt, TokenKind::Le, TokenKind::Gt, TokenKind::Ge],
    &[TokenKind::Shl, TokenKind::Shr],
    &[TokenKind::Plus, TokenKind::Minus],
    &[TokenKind::Star, TokenKind::Slash, TokenKind::Percent],
];

impl Interpreter {
    pub(crate) fn expression(&mut self) -> Exec<Value> {
        let cond = self.binary_level(0)?;
        if self.peek_kind() != Some(TokenKind::Question) {
            return Ok(cond);
        }
        let question = self.bump()?;
        // both arms run; the condition only picks which value survives
        let when_true = self.expression()?;
        self.expect(TokenKind::Colon)?;
        let when_false = self.expression()?;
        if ops::condition(&cond, &question)? {
            Ok(when_true)
        } else {
            Ok(when_false)
        }
    }

    fn binary_level(&mut self, level: usize) -> Exec<Value> {
        if level == LEVELS.len() {
            return self.unary_expr();
        }
        let mut lhs = self.binary_level(level + 1)?;
        while let Some(kind) = self.peek_kind() {
            if !LEVELS[level].contains(&kind) {
                break;
            }
            let op_tok = self.bump()?;
            let rhs = self.binary_level(level + 1)?;
            lhs = ops::binary(kind, lhs, rhs, &op_tok)?;
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Exec<Value> {
        match self.peek_kind() {
            Some(TokenKind::Minus) | Some(TokenKind::Bang) | Some(TokenKind::Tilde) => {
                let op_tok = self.bump()?;
                let value = self.unary_expr()?;
                ops::unary(op_tok.kind, value, &op_tok)
            }
            _ => self.postfix(),
        }
    }

    /// Postfix chains: `.name`, `.name(args)`, `[index]`, `[lo..hi]`
    fn postfix(&mut self) -> Exec<Value> {
        let mut value = self.primary()?;
        loop {
            match self.peek_kind() {
                Some(TokenKind::Dot) => {
                    self.bump()?;
                    let name_tok = self.bump()?;
                    if name_tok.kind != TokenKind::Ident {
                        return Err(ScriptError::new(
                            ErrorKind::Syntax,
                            &name_tok,
                            "expected a member name after `.`",
                        )
                        .into());
                    }
                    if self.peek_kind() == Some(TokenKind::LParen) {
                        let args = self.call_args()?;
                        value = self.dot_call(&name_tok, value, args)?;
                    } else {
                        value = self.dot_access(&name_tok, value)?;
                    }
                }
                Some(TokenKind::LBracket) => {
                    let open = self.bump()?;
                    let index = self.expression()?;
                    if self.peek_kind() == Some(TokenKind::DotDot) {
                        self.bump()?;
                        let hi = self.expression()?;
                        self.expect(TokenKind::RBracket)?;
                        value = self.slice_get(&open, value, index, hi)?;
                    } else {
                        self.expect(TokenKind::RBracket)?;
                        value = self.index_get(&open, value, index)?;
                    }
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn primary(&mut self) -> Exec<Value> {
        let token = self.bump()?;
        match token.kind {
            TokenKind::IntLit => match &token.literal {
                Some(Literal::Int(n)) => Ok(Value::Int(*n)),
                _ => Err(ScriptError::new(ErrorKind::Syntax, &token, "malformed int literal").into()),
            },
            TokenKind::FloatLit => match &token.literal {
                Some(Literal::Float(f)) => Ok(Value::Float(*f)),
                _ => {
                    Err(ScriptError::new(ErrorKind::Syntax, &token, "malformed float literal").into())
                }
            },
            TokenKind::True => Ok(Value::Bool(true)),
            TokenKind::False => Ok(Value::Bool(false)),
            TokenKind::StringLit => Ok(Value::Str(self.interpolate(&token)?)),
            TokenKind::LParen => {
                let value = self.expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(value)
            }
            TokenKind::LBracket => self.bracket_literal(&token),
            TokenKind::LBrace => self.hash_literal(&token),
            TokenKind::Lambda => self.lambda_literal(&token),
            TokenKind::This => {
                let object = self.frame()?.object().cloned().ok_or_else(|| {
                    ScriptError::new(
                        ErrorKind::InvalidContext,
                        &token,
                        "`this` used outside of an instance method",
                    )
                })?;
                Ok(Value::Object(object))
            }
            TokenKind::Variable => {
                let name = token.var_name().to_string();
                let value = self.frame()?.vars.get(&name).cloned().ok_or_else(|| {
                    ScriptError::new(
                        ErrorKind::VariableUndefined,
                        &token,
                        format!("undefined variable `{}`", name),
                    )
                })?;
                if matches!(value, Value::Lambda(_))
                    && self.peek_kind() == Some(TokenKind::LParen)
                {
                    let args = self.call_args()?;
                    return self.call_lambda(&token, &value, args);
                }
                Ok(value)
            }
            TokenKind::Ident => self.identifier(&token),
            TokenKind::Unknown => Err(ScriptError::new(
                ErrorKind::UnrecognizedToken,
                &token,
                format!("unrecognized token `{}`", token.text),
            )
            .into()),
            _ => Err(ScriptError::new(
                ErrorKind::Syntax,
                &token,
                format!("unexpected `{}` in expression", token.text),
            )
            .into()),
        }
    }

    /// A bare identifier: class reference, qualified or plain method call,
    /// variable read, lambda call, builtin call. First match wins.
    fn identifier(&mut self, token: &Token) -> Exec<Value> {
        let name = token.text.clone();

        if self.classes.contains_key(&name) {
            self.expect(TokenKind::Dot)?;
            let member = self.bump()?;
            if member.kind != TokenKind::Ident {
                return Err(ScriptError::new(
                    ErrorKind::Syntax,
                    &member,
                    "expected a method name after `.`",
                )
                .into());
            }
            let args = if self.peek_kind() == Some(TokenKind::LParen) {
                self.call_args()?
            } else {
                Vec::new()
            };
            return self.class_call(&member, &name, &member.text, args);
        }

        if self.peek_kind() == Some(TokenKind::ColonColon) {
            self.bump()?;
            let member = self.bump()?;
            if member.kind != TokenKind::Ident {
                return Err(ScriptError::new(
                    ErrorKind::Syntax,
                    &member,
                    "expected a method name after `::`",
                )
                .into());
            }
            let qualified = format!("{}::{}", name, member.text);
            let method = self.methods.get(&qualified).cloned().ok_or_else(|| {
                ScriptError::new(
                    ErrorKind::MethodUndefined,
                    &member,
                    format!("undefined method `{}`", qualified),
                )
            })?;
            let args = if self.peek_kind() == Some(TokenKind::LParen) {
                self.call_args()?
            } else {
                Vec::new()
            };
            return self.invoke_method(&member, &method, args, None);
        }

        // inside a module body the module's own namespace shadows the
        // unqualified registry
        if self.peek_kind() == Some(TokenKind::LParen) {
            let scoped = self
                .active_module
                .as_ref()
                .and_then(|m| self.methods.get(&format!("{}::{}", m, name)).cloned());
            if let Some(method) = scoped.or_else(|| self.methods.get(&name).cloned()) {
                let args = self.call_args()?;
                return self.invoke_method(token, &method, args, None);
            }
        }

        if let Some(value) = self.frame()?.vars.get(&name).cloned() {
            if matches!(value, Value::Lambda(_)) && self.peek_kind() == Some(TokenKind::LParen) {
                let args = self.call_args()?;
                return self.call_lambda(token, &value, args);
            }
            return Ok(value);
        }

        if self.frame()?.lambdas.contains_key(&name)
            && self.peek_kind() == Some(TokenKind::LParen)
        {
            let args = self.call_args()?;
            return self.call_lambda(token, &Value::Lambda(name), args);
        }

        let args = if self.peek_kind() == Some(TokenKind::LParen) {
            self.call_args()?
        } else {
            Vec::new()
        };
        self.call_builtin(token, &name, None, args)
    }

    /// Parenthesized argument list, arguments evaluated left to right
    pub(crate) fn call_args(&mut self) -> Exec<Vec<Value>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if self.peek_kind() == Some(TokenKind::RParen) {
            self.bump()?;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
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
                        self.error_here(ErrorKind::Syntax, "expected `,` or `)` in argument list")
                    );
                }
            }
        }
        Ok(args)
    }

    /// `[...]` is either a list literal or an inclusive int range
    /// (`[lo..hi]`, empty when lo > hi); a forward scan for `..` before
    /// the balancing `]` decides which.
    fn bracket_literal(&mut self, open: &Token) -> Exec<Value> {
        if self.peek_kind() == Some(TokenKind::RBracket) {
            self.bump()?;
            return Ok(Value::list(Vec::new()));
        }
        if self.range_ahead()? {
            let lo = self.expression()?;
            self.expect(TokenKind::DotDot)?;
            let hi = self.expression()?;
            self.expect(TokenKind::RBracket)?;
            let (lo, hi) = match (lo.as_int(), hi.as_int()) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(ScriptError::new(
                        ErrorKind::Range,
                        open,
                        format!(
                            "range bounds must be ints, got {} and {}",
                            lo.type_name(),
                            hi.type_name()
                        ),
                    )
                    .into());
                }
            };
            return Ok(Value::list((lo..=hi).map(Value::Int).collect()));
        }
        let mut items = Vec::new();
        loop {
            items.push(self.expression()?);
            match self.peek_kind() {
                Some(TokenKind::Comma) => {
                    self.bump()?;
                }
                Some(TokenKind::RBracket) => {
                    self.bump()?;
                    break;
                }
                _ => {
                    return Err(
                        self.error_here(ErrorKind::Syntax, "expected `,` or `]` in list literal")
                    );
                }
            }
        }
        Ok(Value::list(items))
    }

    /// Is there a `..` at bracket depth one before the `]` that closes
    /// the bracket already consumed?
    fn range_ahead(&self) -> Exec<bool> {
        let stream = self.stream()?;
        let range = stream.range();
        let mut depth = 1usize;
        let mut i = stream.pos();
        while let Some(token) = range.get(i) {
            match token.kind {
                TokenKind::LBracket => depth += 1,
                TokenKind::RBracket => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(false);
                    }
                }
                TokenKind::DotDot if depth == 1 => return Ok(true),
                _ => {}
            }
            i += 1;
        }
        Ok(false)
    }

    /// `{"key": value, ...}` hash literal, insertion order preserved
    fn hash_literal(&mut self, open: &Token) -> Exec<Value> {
        let mut map = indexmap::IndexMap::new();
        if self.peek_kind() == Some(TokenKind::RBrace) {
            self.bump()?;
            return Ok(Value::hash(map));
        }
        loop {
            let key = self.expression()?;
            let key = match key.as_str() {
                Some(s) => s.to_string(),
                None => {
                    return Err(ScriptError::new(
                        ErrorKind::Conversion,
                        open,
                        format!("hash keys must be strings, got {}", key.type_name()),
                    )
                    .into());
                }
            };
            self.expect(TokenKind::Colon)?;
            let value = self.expression()?;
            map.insert(key, value);
            match self.peek_kind() {
                Some(TokenKind::Comma) => {
                    self.bump()?;
                }
                Some(TokenKind::RBrace) => {
                    self.bump()?;
                    break;
                }
                _ => {
                    return Err(
                        self.error_here(ErrorKind::Syntax, "expected `,` or `}` in hash literal")
                    );
                }
            }
        }
        Ok(Value::hash(map))
    }

    /// `lambda(params) body end`: the definition is registered by a
    /// generated name in the current frame; the expression's value is
    /// that name.
    fn lambda_literal(&mut self, lambda_tok: &Token) -> Exec<Value> {
        let params = self.parse_params()?;
        let body = self.block_range(lambda_tok)?;
        let name = self.ids.next("lambda");
        let method = Method {
            name: name.clone(),
            params,
            body,
            flags: MethodFlags {
                is_lambda: true,
                ..MethodFlags::default()
            },
            home: None,
        };
        self.frame_mut()?.lambdas.insert(name.clone(), method);
        Ok(Value::Lambda(name))
    }

    /// `.name(args)`: class method on objects, builtin on everything else
    fn dot_call(&mut self, name_tok: &Token, receiver: Value, args: Vec<Value>) -> Exec<Value> {
        match receiver {
            Value::Object(object) => {
                let name = name_tok.text.clone();
                self.instance_call(name_tok, object, &name, args)
            }
            other => {
                let name = name_tok.text.clone();
                self.call_builtin(name_tok, &name, Some(other), args)
            }
        }
    }

    /// `.name` without parentheses: instance-variable read, privacy
    /// enforced against the caller's object context
    fn dot_access(&mut self, name_tok: &Token, receiver: Value) -> Exec<Value> {
        match receiver {
            Value::Object(object) => {
                let class_name = object.borrow().class_name.clone();
                let name = &name_tok.text;
                let private = self
                    .classes
                    .get(&class_name)
                    .map(|c| c.private_vars.contains(name))
                    .unwrap_or(false);
                if private && !self.same_class_context(&class_name) {
                    return Err(ScriptError::new(
                        ErrorKind::InvalidContext,
                        name_tok,
                        format!("`{}` is private to class `{}`", name, class_name),
                    )
                    .into());
                }
                object.borrow().fields.get(name).cloned().ok_or_else(|| {
                    ScriptError::new(
                        ErrorKind::VariableUndefined,
                        name_tok,
                        format!("no instance variable `{}` on `{}`", name, class_name),
                    )
                    .into()
                })
            }
            other => {
                let name = name_tok.text.clone();
                self.call_builtin(name_tok, &name, Some(other), Vec::new())
            }
        }
    }

    pub(crate) fn index_get(&mut self, open: &Token, target: Value, index: Value) -> Exec<Value> {
        match (&target, &index) {
            (Value::List(items), Value::Int(i)) => {
                let items = items.borrow();
                let len = items.len() as i64;
                if *i < 0 || *i >= len {
                    return Err(ScriptError::new(
                        ErrorKind::Index,
                        open,
                        format!("index {} out of bounds for list of {}", i, len),
                    )
                    .into());
                }
                Ok(items[*i as usize].clone())
            }
            (Value::Hash(map), Value::Str(key)) => {
                map.borrow().get(key).cloned().ok_or_else(|| {
                    ScriptError::new(
                        ErrorKind::HashKeyMissing,
                        open,
                        format!("hash has no key {:?}", key),
                    )
                    .into()
                })
            }
            (Value::Str(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let len = chars.len() as i64;
                if *i < 0 || *i >= len {
                    return Err(ScriptError::new(
                        ErrorKind::Index,
                        open,
                        format!("index {} out of bounds for string of {}", i, len),
                    )
                    .into());
                }
                Ok(Value::Str(chars[*i as usize].to_string()))
            }
            (t, i) => Err(ScriptError::new(
                ErrorKind::Conversion,
                open,
                format!("cannot index {} with {}", t.type_name(), i.type_name()),
            )
            .into()),
        }
    }

    /// Inclusive slice read `[lo..hi]` on lists and strings
    pub(crate) fn slice_get(
        &mut self,
        open: &Token,
        target: Value,
        lo: Value,
        hi: Value,
    ) -> Exec<Value> {
        let (lo, hi) = match (lo.as_int(), hi.as_int()) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(
                    ScriptError::new(ErrorKind::Range, open, "slice bounds must be ints").into(),
                );
            }
        };
        match &target {
            Value::List(items) => {
                let items = items.borrow();
                let len = items.len() as i64;
                if lo < 0 || hi >= len || lo > hi {
                    return Err(ScriptError::new(
                        ErrorKind::Range,
                        open,
                        format!("slice {}..{} out of bounds for list of {}", lo, hi, len),
                    )
                    .into());
                }
                Ok(Value::list(items[lo as usize..=hi as usize].to_vec()))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let len = chars.len() as i64;
                if lo < 0 || hi >= len || lo > hi {
                    return Err(ScriptError::new(
                        ErrorKind::Range,
                        open,
                        format!("slice {}..{} out of bounds for string of {}", lo, hi, len),
                    )
                    .into());
                }
                Ok(Value::Str(chars[lo as usize..=hi as usize].iter().collect()))
            }
            t => Err(ScriptError::new(
                ErrorKind::Conversion,
                open,
                format!("cannot slice {}", t.type_name()),
            )
            .into()),
        }
    }

    /// Decode escapes and evaluate `${...}` spans. Spans were kept
    /// verbatim by the lexer; each is lexed here and evaluated through a
    /// synthetic-temporary fragment, then rendered with the serializer.
    pub(crate) fn interpolate(&mut self, token: &Token) -> Exec<String> {
        let raw = match &token.literal {
            Some(Literal::Str(s)) => s.clone(),
            _ => String::new(),
        };
        let chars: Vec<char> = raw.chars().collect();
        let mut out = String::with_capacity(raw.len());
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '\\' && i + 1 < chars.len() {
                let escaped = match chars[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                };
                out.push(escaped);
                i += 2;
                continue;
            }
            if c == '$' && chars.get(i + 1) == Some(&'{') {
                let mut depth = 1usize;
                let mut j = i + 2;
                while j < chars.len() {
                    match chars[j] {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    j += 1;
                }
                if depth != 0 {
                    return Err(ScriptError::new(
                        ErrorKind::Syntax,
                        token,
                        "unbalanced `${...}` interpolation",
                    )
                    .into());
                }
                let span: String = chars[i + 2..j].iter().collect();
                let tokens = crate::lexer::lex(token.file.as_ref(), &span);
                if tokens.is_empty() {
                    return Err(ScriptError::new(
                        ErrorKind::Syntax,
                        token,
                        "empty `${}` interpolation",
                    )
                    .into());
                }
                let range = TokenRange::whole(Rc::new(tokens));
                let value = self.eval_fragment(&range, "interp")?;
                out.push_str(&serializer::serialize(&value));
                i = j + 1;
                continue;
            }
            out.push(c);
            i += 1;
        }
        Ok(out)
    }
}
