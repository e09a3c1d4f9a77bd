//! Runtime error taxonomy and fatal-error reporting
//!
//! Every condition the interpreter can raise belongs to the closed
//! [`ErrorKind`] taxonomy and carries the source token it was raised on.
//! Uncaught errors are rendered with miette so the report shows
//! file/line/column with a caret under the offending token.

use crate::common::Span;
use crate::lexer::Token;
use miette::{Diagnostic, NamedSource, SourceSpan};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

/// Convert our Span to miette's SourceSpan
impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        SourceSpan::new(span.start.into(), span.len())
    }
}

/// The closed set of error kinds the language can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    UnrecognizedToken,
    Range,
    Index,
    Conversion,
    DivideByZero,
    VariableUndefined,
    MethodUndefined,
    ClassUndefined,
    ModuleUndefined,
    ParameterMissing,
    ParameterCountMismatch,
    InvalidContext,
    InvalidOperation,
    IllegalName,
    ClassRedefinition,
    OverrideRequired,
    AbstractMethod,
    HashKeyMissing,
    EmptyStack,
}

impl ErrorKind {
    /// Short tag, also the value bound by `catch (kind, msg)`
    pub fn tag(&self) -> &'static str {
        match self {
            ErrorKind::Syntax => "syntax-error",
            ErrorKind::UnrecognizedToken => "unrecognized-token",
            ErrorKind::Range => "range-error",
            ErrorKind::Index => "index-error",
            ErrorKind::Conversion => "conversion-error",
            ErrorKind::DivideByZero => "divide-by-zero",
            ErrorKind::VariableUndefined => "variable-undefined",
            ErrorKind::MethodUndefined => "method-undefined",
            ErrorKind::ClassUndefined => "class-undefined",
            ErrorKind::ModuleUndefined => "module-undefined",
            ErrorKind::ParameterMissing => "parameter-missing",
            ErrorKind::ParameterCountMismatch => "parameter-count-mismatch",
            ErrorKind::InvalidContext => "invalid-context",
            ErrorKind::InvalidOperation => "invalid-operation",
            ErrorKind::IllegalName => "illegal-name",
            ErrorKind::ClassRedefinition => "class-redefinition",
            ErrorKind::OverrideRequired => "override-required",
            ErrorKind::AbstractMethod => "unimplemented-abstract-method",
            ErrorKind::HashKeyMissing => "hash-key-missing",
            ErrorKind::EmptyStack => "empty-stack",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// An error raised during interpretation, pinned to a source token
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message} ({file}:{line}:{column})")]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
    pub span: Span,
    /// Host-level faults bypass try/catch entirely
    pub fatal: bool,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, token: &Token, message: impl Into<String>) -> Self {
        ScriptError {
            kind,
            message: message.into(),
            file: Arc::clone(&token.file),
            line: token.line,
            column: token.column,
            span: token.span,
            fatal: false,
        }
    }

    /// Host fault (file I/O during import, interpreter invariant breach):
    /// always fatal, never capturable by `try`.
    pub fn host(kind: ErrorKind, token: &Token, message: impl Into<String>) -> Self {
        let mut e = ScriptError::new(kind, token, message);
        e.fatal = true;
        e
    }

    /// Error with no source position, for invariant breaches raised when
    /// no token is at hand.
    pub fn bare(kind: ErrorKind, message: impl Into<String>) -> Self {
        ScriptError {
            kind,
            message: message.into(),
            file: Arc::from("<host>"),
            line: 0,
            column: 0,
            span: Span::default(),
            fatal: true,
        }
    }
}

/// Exceptional control transfer threaded through every evaluation call
#[derive(Debug, Clone)]
pub enum Interrupt {
    Error(Box<ScriptError>),
    /// `exit` statement: immediate termination with an exit code
    Exit(i32),
}

impl From<ScriptError> for Interrupt {
    fn from(e: ScriptError) -> Self {
        Interrupt::Error(Box::new(e))
    }
}

/// Diagnostics registry: file path → source text, consulted only when an
/// uncaught error needs its surrounding context printed.
#[derive(Debug, Default)]
pub struct SourceMap {
    sources: FxHashMap<Arc<str>, Arc<str>>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap::default()
    }

    pub fn insert(&mut self, file: impl Into<Arc<str>>, source: impl Into<Arc<str>>) {
        self.sources.insert(file.into(), source.into());
    }

    pub fn get(&self, file: &str) -> Option<&Arc<str>> {
        self.sources.get(file)
    }

    /// Build the printable report for a fatal error. With a registered
    /// source the report carries a caret under the failing token.
    pub fn report(&self, error: &ScriptError) -> miette::Report {
        match self.sources.get(error.file.as_ref()) {
            Some(src) => miette::Report::new(FatalError {
                kind: error.kind.tag(),
                message: error.message.clone(),
                span: error.span.into(),
                src: NamedSource::new(error.file.to_string(), src.to_string()),
            }),
            None => miette::Report::msg(error.to_string()),
        }
    }
}

/// Fatal-error diagnostic with attached source context
#[derive(Error, Debug, Diagnostic)]
#[error("{kind}: {message}")]
struct FatalError {
    kind: &'static str,
    message: String,
    #[label("{kind} here")]
    span: SourceSpan,
    #[source_code]
    src: NamedSource<String>,
}
