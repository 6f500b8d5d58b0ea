//! The verdict of one evaluation.

use kata_sandbox::{CapturedOutput, Fault};
use kata_types::Diagnostics;
use serde::{Deserialize, Serialize};

/// Result of one compile-run-compare cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Blocking diagnostics; nothing ran.
    CompileFailed { diagnostics: Diagnostics },

    /// The program stopped early. Whatever it printed first is kept.
    RuntimeFailed {
        fault: Fault,
        partial_output: CapturedOutput,
        warnings: Diagnostics,
    },

    /// The program ran to the end.
    Completed {
        output: CapturedOutput,
        matched_target: bool,
        warnings: Diagnostics,
    },
}

impl ExecutionOutcome {
    /// Completed with output matching the target.
    pub fn is_solved(&self) -> bool {
        matches!(
            self,
            ExecutionOutcome::Completed {
                matched_target: true,
                ..
            }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::CompileFailed { .. } => "compile_failed",
            ExecutionOutcome::RuntimeFailed { .. } => "runtime_failed",
            ExecutionOutcome::Completed {
                matched_target: true,
                ..
            } => "matched",
            ExecutionOutcome::Completed { .. } => "mismatched",
        }
    }

    /// Captured output, partial or complete.
    pub fn output(&self) -> Option<&CapturedOutput> {
        match self {
            ExecutionOutcome::CompileFailed { .. } => None,
            ExecutionOutcome::RuntimeFailed { partial_output, .. } => Some(partial_output),
            ExecutionOutcome::Completed { output, .. } => Some(output),
        }
    }

    /// Captured output as one block of text; empty when nothing ran.
    pub fn output_text(&self) -> String {
        self.output().map(CapturedOutput::text).unwrap_or_default()
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            ExecutionOutcome::RuntimeFailed { fault, .. } => Some(fault),
            _ => None,
        }
    }

    /// Compiler diagnostics: blocking ones for a failed compile, warnings
    /// otherwise.
    pub fn diagnostics(&self) -> &Diagnostics {
        match self {
            ExecutionOutcome::CompileFailed { diagnostics } => diagnostics,
            ExecutionOutcome::RuntimeFailed { warnings, .. }
            | ExecutionOutcome::Completed { warnings, .. } => warnings,
        }
    }

    /// Every message for the errors panel: rendered diagnostics, then the
    /// fault description.
    pub fn messages(&self) -> Vec<String> {
        let mut messages: Vec<String> = self.diagnostics().iter().map(ToString::to_string).collect();
        if let Some(fault) = self.fault() {
            messages.push(fault.to_string());
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kata_sandbox::Stream;
    use kata_types::{Diagnostic, DiagnosticCode, Span};

    fn output(lines: &[&str]) -> CapturedOutput {
        let mut out = CapturedOutput::new();
        for line in lines {
            out.push(Stream::Log, *line);
        }
        out
    }

    #[test]
    fn test_compile_failed_has_no_output() {
        let mut diagnostics = Diagnostics::empty();
        diagnostics.push(Diagnostic::new(
            "main.ts",
            DiagnosticCode::TYPE_MISMATCH,
            "nope",
            Span::point(2, 9),
            "",
        ));
        let outcome = ExecutionOutcome::CompileFailed { diagnostics };
        assert!(!outcome.is_solved());
        assert_eq!(outcome.output_text(), "");
        assert_eq!(outcome.messages(), vec!["2:9: error E201 [type] nope"]);
        assert_eq!(outcome.label(), "compile_failed");
    }

    #[test]
    fn test_runtime_failure_keeps_partial_output() {
        let outcome = ExecutionOutcome::RuntimeFailed {
            fault: Fault::Uncaught("Error: boom".into()),
            partial_output: output(&["before"]),
            warnings: Diagnostics::empty(),
        };
        assert_eq!(outcome.output_text(), "before");
        assert_eq!(outcome.messages(), vec!["Error: boom"]);
        assert!(!outcome.is_solved());
    }

    #[test]
    fn test_completed_verdicts() {
        let solved = ExecutionOutcome::Completed {
            output: output(&["5"]),
            matched_target: true,
            warnings: Diagnostics::empty(),
        };
        assert!(solved.is_solved());
        assert!(solved.messages().is_empty());
        assert_eq!(solved.label(), "matched");

        let wrong = ExecutionOutcome::Completed {
            output: output(&["6"]),
            matched_target: false,
            warnings: Diagnostics::empty(),
        };
        assert!(!wrong.is_solved());
        assert_eq!(wrong.label(), "mismatched");
    }

    #[test]
    fn test_serialized_tag() {
        let outcome = ExecutionOutcome::Completed {
            output: output(&["5"]),
            matched_target: true,
            warnings: Diagnostics::empty(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["matched_target"], true);
        assert_eq!(json["output"]["events"][0]["text"], "5");
    }
}
