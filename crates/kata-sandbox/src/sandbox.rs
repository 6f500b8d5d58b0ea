//! The sandbox: one shared engine, a fresh store per run.

use kata_types::abi;
use kata_types::ExecutableModule;
use serde::{Deserialize, Serialize};
use wasmi::core::TrapCode;
use wasmi::{Engine, Linker, Module, Store};

use crate::error::SandboxResult;
use crate::fault::Fault;
use crate::host::{self, HostState};
use crate::limits::SandboxLimits;
use crate::output::CapturedOutput;

/// Result of executing one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunResult {
    /// `run` returned normally.
    Completed { output: CapturedOutput },
    /// The run stopped early. `partial` holds what was printed before.
    Faulted {
        fault: Fault,
        partial: CapturedOutput,
    },
}

impl RunResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunResult::Completed { .. })
    }

    /// Everything the run printed, complete or not.
    pub fn output(&self) -> &CapturedOutput {
        match self {
            RunResult::Completed { output } => output,
            RunResult::Faulted { partial, .. } => partial,
        }
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            RunResult::Completed { .. } => None,
            RunResult::Faulted { fault, .. } => Some(fault),
        }
    }
}

/// Executes emitted modules in isolation.
///
/// The [`Engine`] is shared by all runs. Every call to [`Sandbox::execute`]
/// builds its own `Store`, `Linker`, heap and output buffer, and drops them
/// before returning.
#[derive(Debug, Clone)]
pub struct Sandbox {
    engine: Engine,
    limits: SandboxLimits,
}

impl Sandbox {
    pub fn new(limits: SandboxLimits) -> SandboxResult<Self> {
        limits.validate()?;
        Ok(Self {
            engine: Engine::default(),
            limits,
        })
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Run `module` from a clean slate.
    pub fn execute(&self, module: &ExecutableModule) -> RunResult {
        let _span = tracing::debug_span!("execute", fingerprint = %module.fingerprint).entered();

        let mut store = Store::new(&self.engine, HostState::new(self.limits.clone()));
        let outcome = self.run_in(&mut store, module);
        let state = store.into_data();

        match outcome {
            Ok(()) => {
                tracing::debug!(lines = state.output.len(), "run completed");
                RunResult::Completed {
                    output: state.output,
                }
            }
            Err(error) => {
                let fault = state.fault.unwrap_or_else(|| classify(&error));
                tracing::debug!(%fault, lines = state.output.len(), "run faulted");
                RunResult::Faulted {
                    fault,
                    partial: state.output,
                }
            }
        }
    }

    fn run_in(
        &self,
        store: &mut Store<HostState>,
        module: &ExecutableModule,
    ) -> Result<(), wasmi::Error> {
        let module = Module::new(&self.engine, &module.wasm[..])?;
        let mut linker = <Linker<HostState>>::new(&self.engine);
        host::link(&mut linker)?;

        let instance = linker.instantiate(&mut *store, &module)?.start(&mut *store)?;
        let run = instance.get_typed_func::<i32, ()>(&*store, abi::ENTRY_EXPORT)?;
        // `validate` keeps the limit within i32.
        let gas_limit = i32::try_from(self.limits.gas_limit).unwrap_or(i32::MAX);
        run.call(&mut *store, gas_limit)
    }
}

/// A fault for an error no host function recorded.
fn classify(error: &wasmi::Error) -> Fault {
    match error.as_trap_code() {
        Some(TrapCode::StackOverflow) => Fault::StackOverflow,
        Some(_) => Fault::Trap(error.to_string()),
        None => Fault::Internal(error.to_string()),
    }
}
