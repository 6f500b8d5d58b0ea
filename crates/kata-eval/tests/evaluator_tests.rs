//! Evaluator integration tests: compile, run and compare against a target.

use std::sync::Arc;

use kata_eval::{ExecutionOutcome, Evaluator, KataConfig, OutputMatch, Toolchain};
use kata_sandbox::{Fault, SandboxLimits};
use kata_types::DiagnosticCode;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn evaluator_with(config: KataConfig) -> Evaluator {
    init_tracing();
    Evaluator::new(Arc::new(Toolchain::load(config).expect("toolchain loads")))
}

fn evaluator() -> Evaluator {
    evaluator_with(KataConfig::default())
}

// ══════════════════════════════════════════════════════════════════════════════
// Verdicts
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_matching_output_completes() {
    let outcome = evaluator().evaluate("console.log(\"5\")", "5");
    match &outcome {
        ExecutionOutcome::Completed {
            output,
            matched_target,
            warnings,
        } => {
            assert_eq!(output.text(), "5");
            assert!(matched_target);
            assert!(warnings.is_empty());
        }
        other => panic!("expected Completed, got {other:?}"),
    }
    assert!(outcome.is_solved());
}

#[test]
fn test_case_mismatch_is_not_solved() {
    let outcome = evaluator().evaluate("console.log('Hello')", "hello");
    assert!(matches!(
        outcome,
        ExecutionOutcome::Completed {
            matched_target: false,
            ..
        }
    ));
    assert_eq!(outcome.output_text(), "Hello");
}

#[test]
fn test_target_trailing_whitespace_ignored() {
    let source = "console.log('a')\nconsole.log('b')";
    assert!(evaluator().evaluate(source, "a\r\nb\n\n").is_solved());
}

#[test]
fn test_exact_mode_is_strict() {
    let evaluator = evaluator_with(KataConfig {
        output_match: OutputMatch::Exact,
        ..KataConfig::default()
    });
    assert!(evaluator.evaluate("console.log('a')", "a").is_solved());
    assert!(!evaluator.evaluate("console.log('a')", "a\n").is_solved());
}

#[test]
fn test_multi_line_target() {
    let source = r#"
for (let i = 1; i <= 3; i++) {
  console.log(i * i)
}
"#;
    assert!(evaluator().evaluate(source, "1\n4\n9").is_solved());
}

// ══════════════════════════════════════════════════════════════════════════════
// Failures
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_compile_failure_never_executes() {
    let evaluator = evaluator();
    let outcome = evaluator.evaluate("console.log(\"5)", "5");
    let ExecutionOutcome::CompileFailed { diagnostics } = &outcome else {
        panic!("expected CompileFailed, got {outcome:?}");
    };
    assert!(diagnostics.has_errors());
    assert!(diagnostics
        .errors()
        .any(|d| d.code == DiagnosticCode::UNTERMINATED_STRING));
    assert_eq!(evaluator.executions(), 0);
    assert_eq!(outcome.output_text(), "");
}

#[test]
fn test_type_error_message_is_rendered() {
    let outcome = evaluator().evaluate("let x: number = 'a'", "");
    let messages = outcome.messages();
    assert!(!messages.is_empty());
    assert!(messages[0].starts_with("1:"), "{}", messages[0]);
    assert!(messages[0].contains("error E201 [type]"), "{}", messages[0]);
}

#[test]
fn test_runtime_fault_keeps_partial_output() {
    let evaluator = evaluator();
    let outcome = evaluator.evaluate(
        "const xs = [1, 2, 3]\nconsole.log('before')\nconsole.log(xs[5])",
        "before",
    );
    let ExecutionOutcome::RuntimeFailed {
        fault,
        partial_output,
        ..
    } = &outcome
    else {
        panic!("expected RuntimeFailed, got {outcome:?}");
    };
    assert!(matches!(fault, Fault::TypeError(_)));
    assert_eq!(partial_output.text(), "before");
    assert!(!outcome.is_solved(), "partial output never solves");
    assert_eq!(evaluator.executions(), 1);
}

#[test]
fn test_thrown_error_is_reported() {
    let outcome = evaluator().evaluate("throw new Error('boom')", "");
    assert_eq!(outcome.fault(), Some(&Fault::Uncaught("Error: boom".into())));
    assert_eq!(outcome.messages(), vec!["Error: boom".to_string()]);
}

#[test]
fn test_budget_from_config() {
    let evaluator = evaluator_with(KataConfig {
        limits: SandboxLimits {
            gas_limit: 1_000,
            ..SandboxLimits::default()
        },
        ..KataConfig::default()
    });
    let outcome = evaluator.evaluate("while (true) {\n  console.log('x')\n}", "");
    assert_eq!(
        outcome.fault(),
        Some(&Fault::BudgetExhausted { limit: 1_000 })
    );
    assert!(!outcome.output_text().is_empty());
}

#[test]
fn test_warnings_ride_along() {
    let outcome = evaluator().evaluate("const unused = 1\nconsole.log('ok')", "ok");
    assert!(outcome.is_solved());
    assert_eq!(outcome.diagnostics().total_warnings, 1);
    let messages = outcome.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("warning W600"), "{}", messages[0]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Isolation and determinism
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_partial_output_does_not_leak() {
    let evaluator = evaluator();
    let failed = evaluator.evaluate("console.log('leak')\nthrow 'x'", "");
    assert_eq!(failed.output_text(), "leak");
    let next = evaluator.evaluate("console.log('clean')", "clean");
    assert_eq!(next.output_text(), "clean");
    assert!(next.is_solved());
}

#[test]
fn test_clones_share_the_execution_count() {
    let evaluator = evaluator();
    let clone = evaluator.clone();
    evaluator.evaluate("console.log(1)", "1");
    clone.evaluate("console.log(2)", "2");
    clone.evaluate("console.log(", "");
    assert_eq!(evaluator.executions(), 2);
}

#[test]
fn test_evaluation_determinism_100_iterations() {
    let source = r#"
function label(n: number): string {
  if (n % 15 === 0) {
    return "FizzBuzz"
  }
  if (n % 3 === 0) {
    return "Fizz"
  }
  if (n % 5 === 0) {
    return "Buzz"
  }
  return String(n)
}
const out: string[] = []
for (let i = 1; i <= 15; i++) {
  out.push(label(i))
}
console.log(out.join(" "))
"#;
    let evaluator = evaluator();
    let reference = evaluator.evaluate(source, "");
    assert_eq!(
        reference.output_text(),
        "1 2 Fizz 4 Buzz Fizz 7 8 Fizz Buzz 11 Fizz 13 14 FizzBuzz"
    );
    for i in 0..100 {
        assert_eq!(
            evaluator.evaluate(source, ""),
            reference,
            "Determinism failure at iteration {i}"
        );
    }
}
