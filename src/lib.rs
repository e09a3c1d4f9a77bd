//! Calico: a small dynamically-typed, class-based scripting language.
//!
//! The crate lexes source text into a token stream ([`lexer`]) and
//! executes that stream directly with a tree-walking interpreter
//! ([`interp`]); there is no AST and no bytecode. Method, loop and module
//! bodies are captured token ranges that are re-walked on demand.
//!
//! ```no_run
//! use calico::Interpreter;
//!
//! let mut interp = Interpreter::new();
//! let code = interp.interpret_source("hello.cal", r#"println("hello")"#);
//! assert_eq!(code, 0);
//! ```

pub mod common;
pub mod diagnostics;
pub mod interp;
pub mod lexer;

pub use diagnostics::{ErrorKind, ScriptError, SourceMap};
pub use interp::{BuiltinCall, Builtins, CoreBuiltins, Interpreter, LambdaHost, Value};
pub use lexer::{lex, Literal, Token, TokenKind};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One-shot convenience: interpret a source string with the core builtin
/// set, printing any fatal error, and return the exit code.
pub fn interpret(source: &str) -> i32 {
    Interpreter::new().interpret_source("<script>", source)
}
