//! Browser binding tests. Run with `wasm-pack test --node`.

#![cfg(target_arch = "wasm32")]

use kata_wasm::{compile, version, QuizSession};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

const QUIZ: &str = r#"{
  "start_code": "console.log(\"\")",
  "target_output": "5",
  "language": "typescript",
  "description": "Print five"
}"#;

fn parse(json: &str) -> serde_json::Value {
    serde_json::from_str(json).unwrap()
}

#[wasm_bindgen_test]
fn test_invalid_quiz_is_an_error() {
    assert!(QuizSession::new("{}").is_err());
}

#[wasm_bindgen_test]
fn test_solves_after_toolchain_init() {
    let mut session = QuizSession::new(QUIZ).unwrap();
    assert!(!session.run_enabled());
    assert_eq!(session.run_label(), "Loading...");

    assert!(session.init_toolchain(None));
    assert_eq!(session.run_label(), "Run Code →");

    session.set_source("console.log(\"5\")");
    let view = parse(&session.run());
    assert_eq!(view["state"], "succeeded");
    assert_eq!(view["captured_output"], "5");
    assert!(session.solved());
}

#[wasm_bindgen_test]
fn test_runtime_fault_lists_message() {
    let mut session = QuizSession::new(QUIZ).unwrap();
    session.init_toolchain(None);
    session.set_source("console.log('a')\nthrow new Error('boom')");
    let view = parse(&session.run());
    assert_eq!(view["state"], "failed");
    assert_eq!(view["captured_output"], "a");
    assert_eq!(view["diagnostics"][0], "Error: boom");
}

#[wasm_bindgen_test]
fn test_view_object() {
    let session = QuizSession::new(QUIZ).unwrap();
    let view = session.view_object().unwrap();
    assert!(view.is_object());
    assert_ne!(view, JsValue::UNDEFINED);
}

#[wasm_bindgen_test]
fn test_closed_session_refuses_runs() {
    let mut session = QuizSession::new(QUIZ).unwrap();
    session.init_toolchain(None);
    session.close();
    let view = parse(&session.run());
    assert_eq!(view["has_run_once"], false);
}

#[wasm_bindgen_test]
fn test_free_functions() {
    assert_eq!(parse(&compile("console.log(1)"))["success"], true);
    assert!(!version().is_empty());
}
