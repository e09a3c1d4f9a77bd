//! Builtin dispatcher
//!
//! The engine treats builtins as an external collaborator behind the
//! [`Builtins`] trait: the universal fallback for unresolved identifiers
//! and for dot-notation calls on any value. [`CoreBuiltins`] is the
//! shipped implementation; hosts can swap in their own (file I/O, sockets,
//! FFI) via [`super::engine::Interpreter::with_builtins`].
//!
//! Specialized builtins that invoke script lambdas (list map/select/reduce)
//! call back into the engine through [`LambdaHost`].

use super::serializer;
use super::value::Value;
use crate::diagnostics::{ErrorKind, Interrupt, ScriptError};
use crate::lexer::Token;
use std::cell::RefCell;
use std::rc::Rc;

/// One builtin invocation: call-site token, name, optional receiver and
/// already-evaluated arguments.
pub struct BuiltinCall<'a> {
    pub token: &'a Token,
    pub name: &'a str,
    pub receiver: Option<Value>,
    pub args: Vec<Value>,
}

/// Callback surface the engine provides to builtins
pub trait LambdaHost {
    /// Invoke a script lambda value with the given arguments
    fn call_lambda(
        &mut self,
        token: &Token,
        lambda: &Value,
        args: Vec<Value>,
    ) -> Result<Value, Interrupt>;
}

/// The builtin dispatcher boundary
pub trait Builtins {
    fn dispatch(
        &mut self,
        host: &mut dyn LambdaHost,
        call: BuiltinCall<'_>,
    ) -> Result<Value, Interrupt>;
}

/// Default builtin set
#[derive(Default)]
pub struct CoreBuiltins {
    /// Optional capture of everything printed, for embedding hosts
    sink: Option<Rc<RefCell<Vec<String>>>>,
}

impl CoreBuiltins {
    pub fn new() -> Self {
        CoreBuiltins::default()
    }

    pub fn with_sink(sink: Rc<RefCell<Vec<String>>>) -> Self {
        CoreBuiltins { sink: Some(sink) }
    }

    fn emit(&mut self, line: String, newline: bool) {
        if newline {
            println!("{}", line);
        } else {
            print!("{}", line);
        }
        if let Some(sink) = &self.sink {
            sink.borrow_mut().push(line);
        }
    }
}

impl Builtins for CoreBuiltins {
    fn dispatch(
        &mut self,
        host: &mut dyn LambdaHost,
        call: BuiltinCall<'_>,
    ) -> Result<Value, Interrupt> {
        match call.receiver {
            Some(ref receiver) => self.dispatch_method(host, receiver.clone(), call),
            None => self.dispatch_free(call),
        }
    }
}

impl CoreBuiltins {
    /// Free-function builtins: the last stop of identifier resolution
    fn dispatch_free(&mut self, call: BuiltinCall<'_>) -> Result<Value, Interrupt> {
        let BuiltinCall { token, name, args, .. } = call;
        match name {
            "print" | "println" => {
                let parts: Vec<String> = args.iter().map(serializer::serialize).collect();
                self.emit(parts.join(" "), name == "println");
                Ok(Value::Unit)
            }
            "typeof" => {
                let value = require_arg(&args, 0, token, name)?;
                Ok(Value::Str(value.type_name().to_string()))
            }
            "str" => {
                let value = require_arg(&args, 0, token, name)?;
                Ok(Value::Str(serializer::serialize(value)))
            }
            "int" => to_int(require_arg(&args, 0, token, name)?, token),
            "float" => to_float(require_arg(&args, 0, token, name)?, token),
            "len" => {
                let value = require_arg(&args, 0, token, name)?;
                length(value, token)
            }
            _ => Err(ScriptError::new(
                ErrorKind::MethodUndefined,
                token,
                format!("unknown method or builtin `{}`", name),
            )
            .into()),
        }
    }

    /// Receiver-dispatched builtins, keyed on the receiver's runtime type
    fn dispatch_method(
        &mut self,
        host: &mut dyn LambdaHost,
        receiver: Value,
        call: BuiltinCall<'_>,
    ) -> Result<Value, Interrupt> {
        let BuiltinCall { token, name, args, .. } = call;
        match (&receiver, name) {
            (_, "size") => length(&receiver, token),
            (_, "to_str") => Ok(Value::Str(serializer::serialize(&receiver))),

            // Lists
            (Value::List(items), "map") => {
                let lambda = require_arg(&args, 0, token, name)?.clone();
                let snapshot = items.borrow().clone();
                let mut out = Vec::with_capacity(snapshot.len());
                for item in snapshot {
                    out.push(host.call_lambda(token, &lambda, vec![item])?);
                }
                Ok(Value::list(out))
            }
            (Value::List(items), "select") => {
                let lambda = require_arg(&args, 0, token, name)?.clone();
                let snapshot = items.borrow().clone();
                let mut out = Vec::new();
                for item in snapshot {
                    let keep = host.call_lambda(token, &lambda, vec![item.clone()])?;
                    match keep.as_bool() {
                        Some(true) => out.push(item),
                        Some(false) => {}
                        None => {
                            return Err(ScriptError::new(
                                ErrorKind::Conversion,
                                token,
                                format!("select predicate returned {}", keep.type_name()),
                            )
                            .into());
                        }
                    }
                }
                Ok(Value::list(out))
            }
            (Value::List(items), "reduce") => {
                let lambda = require_arg(&args, 0, token, name)?.clone();
                let snapshot = items.borrow().clone();
                let mut iter = snapshot.into_iter();
                let mut acc = match args.get(1) {
                    Some(init) => init.clone(),
                    None => iter.next().ok_or_else(|| {
                        ScriptError::new(
                            ErrorKind::InvalidOperation,
                            token,
                            "reduce of an empty list with no initial value",
                        )
                    })?,
                };
                for item in iter {
                    acc = host.call_lambda(token, &lambda, vec![acc, item])?;
                }
                Ok(acc)
            }
            (Value::List(items), "push") => {
                let value = require_arg(&args, 0, token, name)?.clone();
                items.borrow_mut().push(value);
                Ok(receiver.clone())
            }
            (Value::List(items), "contains") => {
                let value = require_arg(&args, 0, token, name)?;
                Ok(Value::Bool(items.borrow().iter().any(|v| v == value)))
            }
            (Value::List(items), "join") => {
                let sep = match args.first() {
                    Some(Value::Str(s)) => s.clone(),
                    Some(v) => serializer::serialize(v),
                    None => String::new(),
                };
                let parts: Vec<String> =
                    items.borrow().iter().map(serializer::serialize).collect();
                Ok(Value::Str(parts.join(&sep)))
            }

            // Hashes (insertion order throughout)
            (Value::Hash(map), "keys") => Ok(Value::list(
                map.borrow().keys().map(|k| Value::Str(k.clone())).collect(),
            )),
            (Value::Hash(map), "values") => Ok(Value::list(map.borrow().values().cloned().collect())),
            (Value::Hash(map), "contains") => {
                let key = require_str_arg(&args, 0, token, name)?;
                Ok(Value::Bool(map.borrow().contains_key(&key)))
            }
            (Value::Hash(map), "remove") => {
                let key = require_str_arg(&args, 0, token, name)?;
                // shift_remove keeps the remaining keys in insertion order
                Ok(map.borrow_mut().shift_remove(&key).unwrap_or(Value::Unit))
            }

            // Strings
            (Value::Str(s), "upper") => Ok(Value::Str(s.to_uppercase())),
            (Value::Str(s), "lower") => Ok(Value::Str(s.to_lowercase())),
            (Value::Str(s), "trim") => Ok(Value::Str(s.trim().to_string())),
            (Value::Str(s), "contains") => {
                let needle = require_str_arg(&args, 0, token, name)?;
                Ok(Value::Bool(s.contains(&needle)))
            }
            (Value::Str(s), "split") => {
                let sep = require_str_arg(&args, 0, token, name)?;
                Ok(Value::list(
                    s.split(&sep).map(|p| Value::Str(p.to_string())).collect(),
                ))
            }

            // Object reflection
            (Value::Object(obj), "to_hash") => {
                let obj = obj.borrow();
                Ok(Value::hash(obj.fields.clone()))
            }
            (Value::Object(obj), "class_name") => {
                Ok(Value::Str(obj.borrow().class_name.clone()))
            }

            _ => Err(ScriptError::new(
                ErrorKind::MethodUndefined,
                token,
                format!("no builtin `{}` for {}", name, receiver.type_name()),
            )
            .into()),
        }
    }
}

fn length(value: &Value, token: &Token) -> Result<Value, Interrupt> {
    match value {
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::List(items) => Ok(Value::Int(items.borrow().len() as i64)),
        Value::Hash(map) => Ok(Value::Int(map.borrow().len() as i64)),
        v => Err(ScriptError::new(
            ErrorKind::Conversion,
            token,
            format!("{} has no length", v.type_name()),
        )
        .into()),
    }
}

fn to_int(value: &Value, token: &Token) -> Result<Value, Interrupt> {
    match value {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(f) => Ok(Value::Int(*f as i64)),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            ScriptError::new(
                ErrorKind::Conversion,
                token,
                format!("cannot convert {:?} to int", s),
            )
            .into()
        }),
        v => Err(ScriptError::new(
            ErrorKind::Conversion,
            token,
            format!("cannot convert {} to int", v.type_name()),
        )
        .into()),
    }
}

fn to_float(value: &Value, token: &Token) -> Result<Value, Interrupt> {
    match value {
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            ScriptError::new(
                ErrorKind::Conversion,
                token,
                format!("cannot convert {:?} to float", s),
            )
            .into()
        }),
        v => Err(ScriptError::new(
            ErrorKind::Conversion,
            token,
            format!("cannot convert {} to float", v.type_name()),
        )
        .into()),
    }
}

fn require_arg<'a>(
    args: &'a [Value],
    index: usize,
    token: &Token,
    name: &str,
) -> Result<&'a Value, Interrupt> {
    args.get(index).ok_or_else(|| {
        ScriptError::new(
            ErrorKind::ParameterMissing,
            token,
            format!("`{}` expects at least {} argument(s)", name, index + 1),
        )
        .into()
    })
}

fn require_str_arg(
    args: &[Value],
    index: usize,
    token: &Token,
    name: &str,
) -> Result<String, Interrupt> {
    match require_arg(args, index, token, name)? {
        Value::Str(s) => Ok(s.clone()),
        v => Err(ScriptError::new(
            ErrorKind::Conversion,
            token,
            format!("`{}` expects a string, got {}", name, v.type_name()),
        )
        .into()),
    }
}
