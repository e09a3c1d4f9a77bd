//! Method, class and module definitions
//!
//! These are what the registries hold. Bodies are captured token ranges;
//! nothing here is pre-parsed beyond the definition header.

use super::stream::TokenRange;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;

/// A declared parameter: name plus optional default-value tokens,
/// evaluated at call time in the caller's frame.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<TokenRange>,
}

/// Method modifiers
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodFlags {
    pub is_abstract: bool,
    pub is_override: bool,
    pub is_private: bool,
    pub is_static: bool,
    pub is_ctor: bool,
    pub is_lambda: bool,
}

/// A method (also the representation of lambdas and module-level defs)
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub params: Vec<Param>,
    pub body: TokenRange,
    pub flags: MethodFlags,
    /// Module namespace active when the method was defined; re-activated
    /// while the body runs so sibling methods resolve unqualified
    pub home: Option<String>,
}

impl Method {
    /// Number of parameters with no default
    pub fn required_params(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_none()).count()
    }
}

/// A class definition. Single inheritance: the base class's method table
/// is copied in at definition time (static flattening, not virtual
/// dispatch), so `methods` is always self-contained.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub base: Option<String>,
    pub is_abstract: bool,
    pub methods: IndexMap<String, Method>,
    /// Read-side allow-list: names declared via `private(...)`
    pub private_vars: FxHashSet<String>,
}

/// A module: a named body executed once per import. Methods defined while
/// the module is active are registered as `name::method`.
#[derive(Debug, Clone)]
pub struct ModuleDef {
    pub name: String,
    /// Namespace that was active when the module itself was defined
    pub home: Option<String>,
    pub body: TokenRange,
}
