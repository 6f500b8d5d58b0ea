//! Shared types for the Kata toolchain.
//!
//! This crate defines the AST node types, source spans, diagnostics, the
//! semantic [`Type`] used by the checker and the emitter, and the host ABI
//! shared between the WebAssembly emitter and the execution sandbox.

mod diagnostic;
mod module;
mod span;
pub mod abi;
pub mod ast;
pub mod builtin;
pub mod ty;

pub use diagnostic::{
    Diagnostic, DiagnosticCategory, DiagnosticCode, Diagnostics, Severity, MAX_DIAGNOSTICS,
};
pub use module::ExecutableModule;
pub use span::{SourceFile, Span};
pub use ty::{Type, TypeTable};

/// Result type used throughout the Kata compiler.
pub type Result<T> = std::result::Result<T, Diagnostic>;
