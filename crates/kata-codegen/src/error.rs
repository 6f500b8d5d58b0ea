//! Codegen error types.

use thiserror::Error;

/// Errors that can occur during Wasm code generation.
///
/// The checker guarantees well-typed input, so any of these reaching a
/// caller means the toolchain itself is at fault.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// An AST feature the emitter does not lower.
    #[error("unsupported feature: {0}")]
    Unsupported(String),

    /// An internal consistency check failed.
    #[error("internal codegen error: {0}")]
    Internal(String),

    /// The generated module failed validation.
    #[error("Wasm validation failed: {0}")]
    ValidationFailed(String),

    /// A name could not be resolved to a local, global or function.
    #[error("unresolved symbol: {0}")]
    UnresolvedSymbol(String),

    /// Too many locals, functions, or other entities for a Wasm module.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

/// Codegen result type alias.
pub type CodegenResult<T> = Result<T, CodegenError>;
