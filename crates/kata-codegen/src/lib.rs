//! Kata WebAssembly emitter: lowers a checked AST to a `.wasm` module.
//!
//! # Architecture
//!
//! The emitter takes a [`kata_types::ast::Program`] that passed the checker,
//! together with the [`kata_types::TypeTable`] the checker produced, and
//! builds a self-contained module following the Kata host contract:
//!
//! ## Imports
//! - every [`kata_types::abi::HostFn`] from the `env` module, in order
//!
//! ## Exports
//! - `run(gas_limit)`: executes the top-level statements
//! - `memory`: linear memory holding string literal bytes
//!
//! ## Value Representation
//!
//! Numbers are `f64`, booleans `i32`, and strings, arrays and errors are
//! `i32` handles into the host heap. See [`types`].

pub mod compiler;
pub mod error;
pub mod expr;
pub mod gas;
pub mod stmt;
pub mod types;

pub use compiler::compile;
pub use error::{CodegenError, CodegenResult};
