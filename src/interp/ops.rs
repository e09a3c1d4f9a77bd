//! Binary and unary operator dispatch
//!
//! Each operator is a total function over pairs of runtime types; any
//! combination without a rule raises a conversion error naming both types.

use super::serializer;
use super::value::Value;
use crate::diagnostics::{ErrorKind, Interrupt, ScriptError};
use crate::lexer::{Token, TokenKind};

pub fn binary(op: TokenKind, lhs: Value, rhs: Value, token: &Token) -> Result<Value, Interrupt> {
    use TokenKind::*;
    use Value::*;

    let result = match (op, &lhs, &rhs) {
        // Arithmetic
        (Plus, Int(a), Int(b)) => Int(a.wrapping_add(*b)),
        (Plus, Float(a), Float(b)) => Float(a + b),
        (Plus, Int(a), Float(b)) => Float(*a as f64 + b),
        (Plus, Float(a), Int(b)) => Float(a + *b as f64),
        (Plus, Str(a), b) => Str(format!("{}{}", a, serializer::serialize(b))),
        (Plus, a, Str(b)) => Str(format!("{}{}", serializer::serialize(a), b)),
        (Plus, List(a), List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Value::list(items)
        }

        (Minus, Int(a), Int(b)) => Int(a.wrapping_sub(*b)),
        (Minus, Float(a), Float(b)) => Float(a - b),
        (Minus, Int(a), Float(b)) => Float(*a as f64 - b),
        (Minus, Float(a), Int(b)) => Float(a - *b as f64),

        (Star, Int(a), Int(b)) => Int(a.wrapping_mul(*b)),
        (Star, Float(a), Float(b)) => Float(a * b),
        (Star, Int(a), Float(b)) => Float(*a as f64 * b),
        (Star, Float(a), Int(b)) => Float(a * *b as f64),
        (Star, Str(s), Int(n)) => Str(s.repeat((*n).max(0) as usize)),

        (Slash, Int(a), Int(b)) => {
            if *b == 0 {
                return Err(ScriptError::new(ErrorKind::DivideByZero, token, "division by zero").into());
            }
            Int(a.wrapping_div(*b))
        }
        (Slash, Float(a), Float(b)) => Float(a / b),
        (Slash, Int(a), Float(b)) => Float(*a as f64 / b),
        (Slash, Float(a), Int(b)) => Float(a / *b as f64),

        (Percent, Int(a), Int(b)) => {
            if *b == 0 {
                return Err(ScriptError::new(ErrorKind::DivideByZero, token, "modulo by zero").into());
            }
            Int(a.wrapping_rem(*b))
        }
        (Percent, Float(a), Float(b)) => Float(a % b),
        (Percent, Int(a), Float(b)) => Float(*a as f64 % b),
        (Percent, Float(a), Int(b)) => Float(a % *b as f64),

        // Equality works across all types; mismatched types are unequal
        (EqEq, a, b) => Bool(a == b),
        (Ne, a, b) => Bool(a != b),

        // Relational
        (Lt, a, b) => Bool(compare(op, a, b, token)?),
        (Le, a, b) => Bool(compare(op, a, b, token)?),
        (Gt, a, b) => Bool(compare(op, a, b, token)?),
        (Ge, a, b) => Bool(compare(op, a, b, token)?),

        // Logical (operands are evaluated eagerly by the caller)
        (AmpAmp, Bool(a), Bool(b)) => Bool(*a && *b),
        (PipePipe, Bool(a), Bool(b)) => Bool(*a || *b),

        // Bitwise and shifts
        (Amp, Int(a), Int(b)) => Int(a & b),
        (Pipe, Int(a), Int(b)) => Int(a | b),
        (Caret, Int(a), Int(b)) => Int(a ^ b),
        (Shl, Int(a), Int(b)) => Int(a.wrapping_shl(*b as u32)),
        (Shr, Int(a), Int(b)) => Int(a.wrapping_shr(*b as u32)),

        (op, a, b) => {
            return Err(ScriptError::new(
                ErrorKind::Conversion,
                token,
                format!(
                    "cannot apply `{}` to {} and {}",
                    op,
                    a.type_name(),
                    b.type_name()
                ),
            )
            .into());
        }
    };
    Ok(result)
}

fn compare(op: TokenKind, lhs: &Value, rhs: &Value, token: &Token) -> Result<bool, Interrupt> {
    use std::cmp::Ordering;

    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => match (lhs.as_float(), rhs.as_float()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => {
                return Err(ScriptError::new(
                    ErrorKind::Conversion,
                    token,
                    format!(
                        "cannot compare {} with {}",
                        lhs.type_name(),
                        rhs.type_name()
                    ),
                )
                .into());
            }
        },
    };

    Ok(match op {
        TokenKind::Lt => ordering == Ordering::Less,
        TokenKind::Le => ordering != Ordering::Greater,
        TokenKind::Gt => ordering == Ordering::Greater,
        TokenKind::Ge => ordering != Ordering::Less,
        _ => unreachable!("not a relational operator"),
    })
}

pub fn unary(op: TokenKind, value: Value, token: &Token) -> Result<Value, Interrupt> {
    let result = match (op, &value) {
        (TokenKind::Minus, Value::Int(n)) => Value::Int(n.wrapping_neg()),
        (TokenKind::Minus, Value::Float(f)) => Value::Float(-f),
        (TokenKind::Bang, Value::Bool(b)) => Value::Bool(!b),
        (TokenKind::Tilde, Value::Int(n)) => Value::Int(!n),
        (op, v) => {
            return Err(ScriptError::new(
                ErrorKind::Conversion,
                token,
                format!("cannot apply `{}` to {}", op, v.type_name()),
            )
            .into());
        }
    };
    Ok(result)
}

/// Conditions must be booleans; anything else is a conversion error.
pub fn condition(value: &Value, token: &Token) -> Result<bool, Interrupt> {
    value.as_bool().ok_or_else(|| {
        ScriptError::new(
            ErrorKind::Conversion,
            token,
            format!("condition must be a bool, got {}", value.type_name()),
        )
        .into()
    })
}
