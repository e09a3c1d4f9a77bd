//! The tree-walking interpreter
//!
//! Split by concern: the [`engine`] owns the frame and stream stacks and
//! statement dispatch, [`expr`] evaluates expressions, [`ops`] implements
//! the operators, [`builtins`] the host-function boundary, and the rest
//! are the supporting data types.

pub mod builtins;
pub mod defs;
mod engine;
mod expr;
pub mod frame;
mod idgen;
pub mod ops;
pub mod serializer;
pub mod stream;
pub mod value;

pub use builtins::{BuiltinCall, Builtins, CoreBuiltins, LambdaHost};
pub use engine::Interpreter;
pub use value::{Object, Value};
