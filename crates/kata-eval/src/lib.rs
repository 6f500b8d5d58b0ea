//! Kata evaluator and quiz session.
//!
//! ```text
//! Session ─request_run─▶ Evaluator ─compile─▶ CompilerHost
//!                            │
//!                            └─execute─▶ Sandbox ─▶ ExecutionOutcome
//! ```
//!
//! The [`Evaluator`] runs one compile, execute and compare cycle. The
//! [`Session`] owns the learner's source and the latest outcome, and exposes
//! what the quiz view renders.

pub mod config;
pub mod evaluator;
pub mod normalize;
pub mod outcome;
pub mod session;
pub mod toolchain;

pub use config::{ConfigError, KataConfig};
pub use evaluator::Evaluator;
pub use normalize::OutputMatch;
pub use outcome::ExecutionOutcome;
pub use session::{
    QuizDefinition, RunStatus, RunTicket, Session, SessionState, SessionView, SharedSession,
    SolvedCallback, LABEL_LOADING, LABEL_RUN,
};
#[cfg(not(target_arch = "wasm32"))]
pub use toolchain::ToolchainLoader;
pub use toolchain::{Toolchain, ToolchainError, ToolchainStatus};
