//! Kata quiz session as a WASM module for browser environments.
//!
//! Exposes [`QuizSession`] and the compiler entry points via `wasm-bindgen`.
//! Snippets are compiled and run inside this module; nothing is evaluated by
//! the page's own JavaScript engine.
//!
//! # Usage (JavaScript)
//!
//! ```js
//! import init, { QuizSession } from 'kata-wasm';
//!
//! await init();
//!
//! const session = new QuizSession(JSON.stringify({
//!   start_code: 'console.log("")',
//!   target_output: '5',
//!   language: 'typescript',
//!   description: 'Print five',
//! }));
//! session.onSolved((code) => saveSolution(code));
//! session.initToolchain();
//! session.setSource('console.log("5")');
//! const view = JSON.parse(session.run());
//! // { state: "succeeded", captured_output: "5", solved: true, ... }
//! ```

use std::sync::Arc;

use kata_eval::{KataConfig, QuizDefinition, Session, Toolchain, ToolchainError};
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    /// A JavaScript `(code: string) => void`.
    #[wasm_bindgen(typescript_type = "(code: string) => void")]
    pub type SolvedHandler;

    #[wasm_bindgen(method, structural, js_name = call)]
    fn call(this: &SolvedHandler, this_arg: &JsValue, code: &str);
}

/// Serialize for the JS side. A serialization failure still yields JSON.
fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| format!(r#"{{"error":"Serialization error: {e}"}}"#))
}

fn parse_quiz(quiz_json: &str) -> Result<QuizDefinition, String> {
    serde_json::from_str(quiz_json).map_err(|e| format!("invalid quiz definition: {e}"))
}

fn load_toolchain(config_json: Option<&str>) -> Result<Arc<Toolchain>, ToolchainError> {
    let config = match config_json {
        Some(json) => KataConfig::from_json(json)?,
        None => KataConfig::default(),
    };
    Toolchain::load(config).map(Arc::new)
}

// ══════════════════════════════════════════════════════════════════════════════
// QuizSession
// ══════════════════════════════════════════════════════════════════════════════

/// One learner's attempt at one quiz.
#[wasm_bindgen]
pub struct QuizSession {
    session: Session,
    on_solved: Option<SolvedHandler>,
}

#[wasm_bindgen]
impl QuizSession {
    /// Create a session from a JSON quiz definition
    /// (`start_code`, `target_output`, `language`, `description`).
    #[wasm_bindgen(constructor)]
    pub fn new(quiz_json: &str) -> Result<QuizSession, JsError> {
        let quiz = parse_quiz(quiz_json).map_err(|e| JsError::new(&e))?;
        Ok(Self::from_quiz(quiz))
    }

    /// Load the compiler and sandbox. `config_json` is an optional
    /// `KataConfig`. Returns whether the toolchain is ready; a failure is
    /// reported through `view().toolchain_error` and is not retried.
    #[wasm_bindgen(js_name = initToolchain)]
    pub fn init_toolchain(&mut self, config_json: Option<String>) -> bool {
        self.session
            .install_toolchain(load_toolchain(config_json.as_deref()));
        self.session.toolchain_ready()
    }

    #[wasm_bindgen(js_name = setSource)]
    pub fn set_source(&mut self, code: &str) {
        self.session.set_source(code);
    }

    /// Run the current source and return the view as JSON. A run refused
    /// because the control is disabled returns the unchanged view.
    pub fn run(&mut self) -> String {
        let status = self.session.run();
        if status.is_some_and(|s| s.newly_solved) {
            if let Some(handler) = &self.on_solved {
                handler.call(&JsValue::NULL, self.session.source());
            }
        }
        self.view()
    }

    /// The view as JSON.
    pub fn view(&self) -> String {
        to_json(&self.session.view())
    }

    /// The view as a plain JS object.
    #[wasm_bindgen(js_name = viewObject)]
    pub fn view_object(&self) -> Result<JsValue, JsError> {
        serde_wasm_bindgen::to_value(&self.session.view()).map_err(|e| JsError::new(&e.to_string()))
    }

    /// Called with the exact code each time the quiz becomes solved.
    #[wasm_bindgen(js_name = onSolved)]
    pub fn on_solved(&mut self, handler: SolvedHandler) {
        self.on_solved = Some(handler);
    }

    #[wasm_bindgen(getter)]
    pub fn solved(&self) -> bool {
        self.session.solved()
    }

    #[wasm_bindgen(getter, js_name = runEnabled)]
    pub fn run_enabled(&self) -> bool {
        self.session.run_enabled()
    }

    #[wasm_bindgen(getter, js_name = runLabel)]
    pub fn run_label(&self) -> String {
        self.session.run_label().to_string()
    }

    /// Release the session. Later runs are refused.
    pub fn close(&mut self) {
        self.on_solved = None;
        self.session.close();
    }
}

impl QuizSession {
    fn from_quiz(quiz: QuizDefinition) -> Self {
        Self {
            session: Session::new(quiz),
            on_solved: None,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Compiler entry points
// ══════════════════════════════════════════════════════════════════════════════

/// Compile a snippet without running it.
///
/// Returns a JSON `CompileReport`:
/// ```json
/// {
///   "success": true,
///   "fingerprint": "3f1c…",
///   "module_size": 1423,
///   "diagnostics": { "entries": [], "total_errors": 0, "total_warnings": 0 }
/// }
/// ```
#[wasm_bindgen]
pub fn compile(source: &str) -> String {
    to_json(&kata_compiler::compile_to_report(source))
}

/// Front-end diagnostics only, for editor integration.
#[wasm_bindgen]
pub fn type_check(source: &str, filename: &str) -> String {
    to_json(&kata_compiler::type_check(source, filename))
}

/// Return the toolchain version string.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIZ: &str = r#"{"start_code": "console.log(4)", "target_output": "5"}"#;

    fn view_json(session: &QuizSession) -> serde_json::Value {
        serde_json::from_str(&session.view()).unwrap()
    }

    #[test]
    fn test_session_round_trip() {
        let mut session = QuizSession::from_quiz(parse_quiz(QUIZ).unwrap());
        assert_eq!(view_json(&session)["run_label"], "Loading...");
        assert!(session.init_toolchain(None));

        let view: serde_json::Value = serde_json::from_str(&session.run()).unwrap();
        assert_eq!(view["state"], "failed");
        assert_eq!(view["captured_output"], "4");

        session.set_source("console.log(5)");
        let view: serde_json::Value = serde_json::from_str(&session.run()).unwrap();
        assert_eq!(view["state"], "succeeded");
        assert!(session.solved());
    }

    #[test]
    fn test_bad_config_is_reported_in_view() {
        let mut session = QuizSession::from_quiz(parse_quiz(QUIZ).unwrap());
        assert!(!session.init_toolchain(Some(r#"{"limits": {"gas_limit": 0}}"#.into())));
        let view = view_json(&session);
        assert_eq!(view["toolchain_ready"], false);
        assert!(view["toolchain_error"]
            .as_str()
            .unwrap()
            .starts_with("configuration rejected"));
        assert!(!session.run_enabled());
    }

    #[test]
    fn test_parse_quiz_rejects_missing_target() {
        assert!(parse_quiz(r#"{"start_code": ""}"#).is_err());
    }

    #[test]
    fn test_compile_json() {
        let report: serde_json::Value = serde_json::from_str(&compile("console.log(1)")).unwrap();
        assert_eq!(report["success"], true);
        let report: serde_json::Value = serde_json::from_str(&compile("console.log(\"1)")).unwrap();
        assert_eq!(report["success"], false);
        assert_eq!(report["diagnostics"]["entries"][0]["code"], 101);
    }

    #[test]
    fn test_version() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }
}
