//! Kata execution sandbox.
//!
//! Runs a module produced by the Kata emitter inside `wasmi`. Every console
//! call of the snippet is a host import that appends to the output buffer of
//! the run's own store, so nothing a snippet prints reaches the host process.
//!
//! ```text
//! ExecutableModule → Sandbox::execute → RunResult { output | fault + partial }
//! ```
//!
//! Runs share nothing but the compiled-code [`wasmi::Engine`]: heap, output,
//! gas counter and bindings are rebuilt for each call.

pub mod error;
pub mod fault;
pub mod format;
pub mod heap;
pub mod host;
pub mod limits;
pub mod output;
pub mod sandbox;

pub use error::{SandboxError, SandboxResult};
pub use fault::Fault;
pub use limits::SandboxLimits;
pub use output::{CapturedOutput, OutputEvent, Stream};
pub use sandbox::{RunResult, Sandbox};
