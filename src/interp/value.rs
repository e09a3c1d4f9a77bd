//! Runtime values for the interpreter

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::serializer;

/// Runtime value. Lists, hashes and objects are shared: every alias sees
/// every mutation.
#[derive(Clone)]
pub enum Value {
    /// The unset default: what a body yields when it never returns
    Unit,
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// Boolean
    Bool(bool),
    /// String (by value)
    Str(String),
    /// Ordered mutable sequence (shared)
    List(Rc<RefCell<Vec<Value>>>),
    /// Insertion-ordered string → value map (shared)
    Hash(Rc<RefCell<IndexMap<String, Value>>>),
    /// Class instance (shared)
    Object(Rc<RefCell<Object>>),
    /// Lambda reference, by name; the definition lives in a frame
    Lambda(String),
}

/// A class instance: identity, class name, instance-variable map
#[derive(Debug, Clone)]
pub struct Object {
    pub id: String,
    pub class_name: String,
    pub fields: IndexMap<String, Value>,
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn hash(map: IndexMap<String, Value>) -> Value {
        Value::Hash(Rc::new(RefCell::new(map)))
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Object(_) => "object",
            Value::Lambda(_) => "lambda",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) => *a as f64 == *b,
            (Value::Float(a), Value::Int(b)) => *a == *b as f64,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => *a.borrow() == *b.borrow(),
            (Value::Hash(a), Value::Hash(b)) => *a.borrow() == *b.borrow(),
            // Objects compare by identity, not structure
            (Value::Object(a), Value::Object(b)) => a.borrow().id == b.borrow().id,
            (Value::Lambda(a), Value::Lambda(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", serializer::serialize(self))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", serializer::literal(self))
    }
}
