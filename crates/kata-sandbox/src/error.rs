//! Sandbox error types.

use thiserror::Error;

/// Errors setting up a sandbox.
///
/// Problems of a single run are never errors; they are reported as a
/// [`Fault`](crate::Fault) on the [`RunResult`](crate::RunResult).
#[derive(Debug, Error)]
pub enum SandboxError {
    /// A limit is zero or out of range.
    #[error("invalid sandbox limit: {0}")]
    InvalidLimits(String),
}

/// Sandbox result type alias.
pub type SandboxResult<T> = Result<T, SandboxError>;
