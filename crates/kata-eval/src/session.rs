//! Per-attempt quiz session: the state the presentation layer renders.
//!
//! ```text
//! Idle ──request_run──▶ Running ──complete_run──▶ Succeeded | Failed
//!                          ▲                            │
//!                          └────────request_run─────────┘
//! ```
//!
//! A run is two-phase: [`Session::request_run`] snapshots the source and
//! hands out a [`RunTicket`]; [`Session::complete_run`] applies the outcome
//! for that ticket. Only one ticket is in flight at a time.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::evaluator::Evaluator;
use crate::outcome::ExecutionOutcome;
use crate::toolchain::{Toolchain, ToolchainError, ToolchainStatus};

/// Label of the run control while it is disabled.
pub const LABEL_LOADING: &str = "Loading...";
/// Label of the run control while it accepts a run.
pub const LABEL_RUN: &str = "Run Code →";

/// Callback receiving the exact source that solved the quiz.
pub type SolvedCallback = Box<dyn FnMut(&str) + Send>;

// ══════════════════════════════════════════════════════════════════════════════
// Inputs and outputs
// ══════════════════════════════════════════════════════════════════════════════

/// One quiz, as authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizDefinition {
    pub start_code: String,
    pub target_output: String,
    /// Display only.
    #[serde(default)]
    pub language: String,
    /// Display only.
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// An accepted run request and the source it evaluates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTicket {
    id: u64,
    source: String,
}

impl RunTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The source snapshot taken when the run was accepted.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// What applying an outcome did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub state: SessionState,
    /// The session just moved into `Succeeded` from another state.
    pub newly_solved: bool,
}

/// Serializable snapshot of everything the view renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub state: SessionState,
    pub toolchain_ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolchain_error: Option<String>,
    pub running: bool,
    pub has_run_once: bool,
    pub captured_output: String,
    pub diagnostics: Vec<String>,
    pub solved: bool,
    pub run_enabled: bool,
    pub run_label: String,
}

// ══════════════════════════════════════════════════════════════════════════════
// Session
// ══════════════════════════════════════════════════════════════════════════════

/// State of one learner's attempt at one quiz.
pub struct Session {
    quiz: QuizDefinition,
    source: String,
    toolchain: ToolchainStatus,
    evaluator: Option<Evaluator>,
    state: SessionState,
    has_run_once: bool,
    last_outcome: Option<ExecutionOutcome>,
    next_ticket: u64,
    in_flight: Option<u64>,
    on_solved: Option<SolvedCallback>,
    closed: bool,
}

impl Session {
    /// Start an attempt with the quiz's starting code in the editor.
    pub fn new(quiz: QuizDefinition) -> Self {
        tracing::debug!(language = %quiz.language, "session opened");
        Self {
            source: quiz.start_code.clone(),
            quiz,
            toolchain: ToolchainStatus::Loading,
            evaluator: None,
            state: SessionState::Idle,
            has_run_once: false,
            last_outcome: None,
            next_ticket: 1,
            in_flight: None,
            on_solved: None,
            closed: false,
        }
    }

    /// Finish the loading phase. Only the first result is kept.
    pub fn install_toolchain(&mut self, result: Result<Arc<Toolchain>, ToolchainError>) {
        if !self.toolchain.is_loading() {
            tracing::debug!("toolchain already settled; ignoring");
            return;
        }
        match result {
            Ok(toolchain) => {
                tracing::debug!("toolchain installed");
                self.evaluator = Some(Evaluator::new(Arc::clone(&toolchain)));
                self.toolchain = ToolchainStatus::Ready(toolchain);
            }
            Err(err) => {
                tracing::warn!(error = %err, "toolchain failed to load");
                self.toolchain = ToolchainStatus::Failed(err);
            }
        }
    }

    /// Register the callback fired on every transition into `Succeeded`.
    pub fn on_solved(&mut self, callback: impl FnMut(&str) + Send + 'static) {
        self.on_solved = Some(Box::new(callback));
    }

    /// Replace the editor contents. A run already in flight keeps its snapshot.
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
    }

    /// Accept a run if the control is enabled.
    pub fn request_run(&mut self) -> Option<RunTicket> {
        self.begin().map(|(ticket, _)| ticket)
    }

    /// Apply the outcome of `ticket`. Tickets that are no longer in flight
    /// are ignored.
    pub fn complete_run(
        &mut self,
        ticket: RunTicket,
        outcome: ExecutionOutcome,
    ) -> Option<RunStatus> {
        if self.in_flight != Some(ticket.id) {
            tracing::debug!(ticket = ticket.id, "stale run outcome ignored");
            return None;
        }
        self.in_flight = None;
        self.has_run_once = true;

        let was_solved = self.solved();
        let solved = outcome.is_solved();
        self.state = if solved {
            SessionState::Succeeded
        } else {
            SessionState::Failed
        };
        let newly_solved = solved && !was_solved;
        tracing::info!(
            ticket = ticket.id,
            outcome = outcome.label(),
            newly_solved,
            "run finished"
        );
        self.last_outcome = Some(outcome);

        if newly_solved {
            if let Some(callback) = self.on_solved.as_mut() {
                callback(&ticket.source);
            }
        }
        Some(RunStatus {
            state: self.state,
            newly_solved,
        })
    }

    /// Request, evaluate and complete a run in one step.
    pub fn run(&mut self) -> Option<RunStatus> {
        let (ticket, evaluator) = self.begin()?;
        let outcome = evaluator.evaluate(ticket.source(), &self.quiz.target_output);
        self.complete_run(ticket, outcome)
    }

    fn begin(&mut self) -> Option<(RunTicket, Evaluator)> {
        if self.closed {
            tracing::debug!("run requested on a closed session");
            return None;
        }
        let Some(evaluator) = self.evaluator.clone() else {
            tracing::debug!("run requested before the toolchain is ready");
            return None;
        };
        if let Some(in_flight) = self.in_flight {
            tracing::debug!(in_flight, "concurrent run rejected");
            return None;
        }

        let id = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight = Some(id);
        self.state = SessionState::Running;
        tracing::debug!(ticket = id, "run accepted");
        Some((
            RunTicket {
                id,
                source: self.source.clone(),
            },
            evaluator,
        ))
    }

    /// Tear the session down. Later requests are refused and the solved
    /// callback is dropped.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.in_flight = None;
        self.on_solved = None;
        tracing::debug!(runs = self.next_ticket - 1, "session closed");
    }

    // ── accessors ─────────────────────────────────────────────────────────

    pub fn quiz(&self) -> &QuizDefinition {
        &self.quiz
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn toolchain(&self) -> &ToolchainStatus {
        &self.toolchain
    }

    pub fn evaluator(&self) -> Option<&Evaluator> {
        self.evaluator.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn toolchain_ready(&self) -> bool {
        self.toolchain.is_ready()
    }

    pub fn running(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn has_run_once(&self) -> bool {
        self.has_run_once
    }

    /// The latest outcome; it stays visible while the next run is in flight.
    pub fn last_outcome(&self) -> Option<&ExecutionOutcome> {
        self.last_outcome.as_ref()
    }

    /// Output of the latest run; empty before the first.
    pub fn captured_output(&self) -> String {
        self.last_outcome
            .as_ref()
            .map(ExecutionOutcome::output_text)
            .unwrap_or_default()
    }

    /// Rendered diagnostics and fault of the latest run.
    pub fn diagnostics(&self) -> Vec<String> {
        self.last_outcome
            .as_ref()
            .map(ExecutionOutcome::messages)
            .unwrap_or_default()
    }

    pub fn solved(&self) -> bool {
        self.last_outcome
            .as_ref()
            .is_some_and(ExecutionOutcome::is_solved)
    }

    pub fn run_enabled(&self) -> bool {
        !self.closed && self.toolchain_ready() && !self.running()
    }

    pub fn run_label(&self) -> &'static str {
        if self.toolchain.is_loading() || self.running() {
            LABEL_LOADING
        } else {
            LABEL_RUN
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            state: self.state,
            toolchain_ready: self.toolchain_ready(),
            toolchain_error: self.toolchain.error().map(ToString::to_string),
            running: self.running(),
            has_run_once: self.has_run_once,
            captured_output: self.captured_output(),
            diagnostics: self.diagnostics(),
            solved: self.solved(),
            run_enabled: self.run_enabled(),
            run_label: self.run_label().to_string(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("toolchain", &self.toolchain)
            .field("has_run_once", &self.has_run_once)
            .field("in_flight", &self.in_flight)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// SharedSession
// ══════════════════════════════════════════════════════════════════════════════

/// A session shared between threads.
///
/// Evaluation happens outside the lock, so a request arriving mid-run sees the
/// session `Running` and is dropped. The solved callback runs while the lock
/// is held and must not call back into the session.
#[derive(Debug, Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<Session>>,
}

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn run(&self) -> Option<RunStatus> {
        let (ticket, evaluator, target) = {
            let mut session = self.lock();
            let (ticket, evaluator) = session.begin()?;
            (ticket, evaluator, session.quiz.target_output.clone())
        };
        let outcome = evaluator.evaluate(ticket.source(), &target);
        self.lock().complete_run(ticket, outcome)
    }

    /// Run `f` with exclusive access to the session.
    pub fn with<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn view(&self) -> SessionView {
        self.lock().view()
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
