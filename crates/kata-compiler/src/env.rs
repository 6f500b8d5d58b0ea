//! Type environment with lexically scoped bindings.
//!
//! [`TypeEnv`] manages a stack of scopes. Bindings keep declaration order so
//! unused-variable warnings come out in a stable order.

use kata_types::{Span, Type};

// ══════════════════════════════════════════════════════════════════════════════
// Scope Kind
// ══════════════════════════════════════════════════════════════════════════════

/// What kind of code context a scope represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Top-level statements of the snippet.
    Root,
    /// A function body, parameters included.
    Function,
    /// A `{ }` block or a loop header.
    Block,
}

/// How a name was introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Let,
    Const,
    Parameter,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub ty: Type,
    pub kind: BindingKind,
    pub span: Span,
    /// Whether the value was ever read.
    pub used: bool,
}

// ══════════════════════════════════════════════════════════════════════════════
// Scope
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    bindings: Vec<Binding>,
}

// ══════════════════════════════════════════════════════════════════════════════
// TypeEnv
// ══════════════════════════════════════════════════════════════════════════════

/// A stack of scopes for name resolution and type tracking.
#[derive(Debug)]
pub struct TypeEnv {
    scopes: Vec<Scope>,
}

impl TypeEnv {
    /// Create a new type environment with the root scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                kind: ScopeKind::Root,
                bindings: Vec::new(),
            }],
        }
    }

    pub fn push_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope {
            kind,
            bindings: Vec::new(),
        });
    }

    /// Pop the innermost scope, returning its bindings in declaration order.
    pub fn pop_scope(&mut self) -> Vec<Binding> {
        if self.scopes.len() == 1 {
            return std::mem::take(&mut self.scopes[0].bindings);
        }
        self.scopes.pop().map(|s| s.bindings).unwrap_or_default()
    }

    /// Define a binding in the innermost scope.
    /// Returns `false` if the name is already defined in that scope.
    pub fn define(&mut self, name: &str, ty: Type, kind: BindingKind, span: Span) -> bool {
        if self.defined_in_current_scope(name) {
            return false;
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.push(Binding {
                name: name.to_string(),
                ty,
                kind,
                span,
                used: false,
            });
        }
        true
    }

    /// Look up a binding, innermost scope first, and mark it as read.
    pub fn resolve(&mut self, name: &str) -> Option<&Binding> {
        let binding = self
            .scopes
            .iter_mut()
            .rev()
            .find_map(|s| s.bindings.iter_mut().rev().find(|b| b.name == name))?;
        binding.used = true;
        Some(binding)
    }

    /// Look up a binding without marking it as read.
    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.bindings.iter().rev().find(|b| b.name == name))
    }

    /// Every name visible from the innermost scope, innermost first.
    pub fn visible_names(&self) -> impl Iterator<Item = &str> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|s| s.bindings.iter().rev().map(|b| b.name.as_str()))
    }

    pub fn defined_in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .last()
            .is_some_and(|s| s.bindings.iter().any(|b| b.name == name))
    }

    /// Whether the innermost scope is the root scope.
    pub fn at_root(&self) -> bool {
        self.scopes.len() == 1
    }

    /// Check if we are inside a function body.
    pub fn in_function(&self) -> bool {
        self.scopes.iter().any(|s| s.kind == ScopeKind::Function)
    }
}

impl Default for TypeEnv {
    fn default() -> Self {
        Self::new()
    }
}
