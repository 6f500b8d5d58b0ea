//! One evaluation cycle: compile, run, compare.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kata_compiler::{internal_fault_diagnostics, Compilation};
use kata_sandbox::RunResult;

use crate::outcome::ExecutionOutcome;
use crate::toolchain::Toolchain;

/// Turns a source snapshot and a target into an [`ExecutionOutcome`].
///
/// Clones share the toolchain and the execution counter.
#[derive(Debug, Clone)]
pub struct Evaluator {
    toolchain: Arc<Toolchain>,
    executions: Arc<AtomicUsize>,
}

impl Evaluator {
    pub fn new(toolchain: Arc<Toolchain>) -> Self {
        Self {
            toolchain,
            executions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn toolchain(&self) -> &Arc<Toolchain> {
        &self.toolchain
    }

    /// How many times the sandbox has been entered.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn evaluate(&self, source: &str, target: &str) -> ExecutionOutcome {
        let _span = tracing::debug_span!("evaluate", bytes = source.len()).entered();

        let compilation = match self.toolchain.compiler().compile(source) {
            Ok(compilation) => compilation,
            Err(err) => {
                tracing::warn!(error = %err, "compiler fault");
                let diagnostics =
                    internal_fault_diagnostics(&err, &self.toolchain.config().file_name);
                return self.finish(ExecutionOutcome::CompileFailed { diagnostics });
            }
        };

        let (module, warnings) = match compilation {
            Compilation::Emitted { module, warnings } => (module, warnings),
            Compilation::Diagnostics(diagnostics) => {
                return self.finish(ExecutionOutcome::CompileFailed { diagnostics });
            }
        };

        self.executions.fetch_add(1, Ordering::SeqCst);
        let outcome = match self.toolchain.sandbox().execute(&module) {
            RunResult::Completed { output } => {
                let matched_target = self
                    .toolchain
                    .config()
                    .output_match
                    .matches(&output.text(), target);
                ExecutionOutcome::Completed {
                    output,
                    matched_target,
                    warnings,
                }
            }
            RunResult::Faulted { fault, partial } => ExecutionOutcome::RuntimeFailed {
                fault,
                partial_output: partial,
                warnings,
            },
        };
        self.finish(outcome)
    }

    fn finish(&self, outcome: ExecutionOutcome) -> ExecutionOutcome {
        match &outcome {
            ExecutionOutcome::CompileFailed { diagnostics } => tracing::info!(
                outcome = outcome.label(),
                errors = diagnostics.total_errors,
                "evaluation finished"
            ),
            ExecutionOutcome::RuntimeFailed { fault, .. } => tracing::info!(
                outcome = outcome.label(),
                %fault,
                "evaluation finished"
            ),
            ExecutionOutcome::Completed { output, .. } => tracing::info!(
                outcome = outcome.label(),
                lines = output.len(),
                "evaluation finished"
            ),
        }
        outcome
    }
}
