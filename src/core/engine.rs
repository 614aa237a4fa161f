// src/core/engine.rs
//! Host-facing engine: one interpreter run at a time, plus the debugger,
//! input coordinator and event bus it owns. Cheap to clone; clones drive the
//! same engine, so one task can execute while another submits input or
//! debugger commands.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::core::ast::Program;
use crate::core::compiler::{analyze, validate, Analysis, Validation};
use crate::core::debugger::{Breakpoint, DebugState, Debugger, SessionInfo, SessionTarget, StepMode};
use crate::core::diagnostics::Diagnostic;
use crate::core::error::{InputError, SessionError};
use crate::core::events::{EventBus, EventKind, RuntimeEvent};
use crate::core::input::{InputCoordinator, Validator};
use crate::core::sketch::LineSketch;
use crate::core::value::Value;
use crate::core::vm::{Interpreter, RunContext, RunOutcome};

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Overrides `EngineConfig::default_timeout_ms`; 0 disables the budget.
    pub timeout_ms: Option<u64>,
    pub debug_mode: bool,
    /// Pause before the first statement (implies `debug_mode`).
    pub step_mode: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub outputs: Vec<String>,
    pub variables: BTreeMap<String, Value>,
    pub error: Option<Diagnostic>,
    /// Front-end diagnostics (warnings included) plus the runtime error.
    pub diagnostics: Vec<Diagnostic>,
    pub duration_ms: u64,
}

struct EngineInner {
    config: EngineConfig,
    bus: EventBus,
    input: InputCoordinator,
    debugger: Arc<Debugger>,
    running: AtomicBool,
    abort: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("running", &self.is_running())
            .field("debugger", &self.inner.debugger)
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Clears the single-execution flag however `execute` returns.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

enum Plan {
    Program(Arc<Program>),
    Sketch(Arc<LineSketch>),
    Rejected,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let bus = EventBus::new(config.event_history);
        let input = InputCoordinator::new(bus.clone());
        let debugger = Arc::new(Debugger::new(bus.clone()));
        let (abort, _) = watch::channel(false);
        let inner = EngineInner { config, bus, input, debugger, running: AtomicBool::new(false), abort };
        Self { inner: Arc::new(inner) }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /* ── Execution ────────────────────────────────────────── */

    /// Run `source` to completion. Fails fast with `AlreadyRunning` when
    /// another execution is active; every other failure is reported inside
    /// the result, followed by exactly one `execution.complete` event.
    pub async fn execute(&self, source: &str, options: ExecuteOptions) -> Result<ExecutionResult, SessionError> {
        let inner = &*self.inner;
        if inner.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(SessionError::AlreadyRunning);
        }
        let _guard = RunGuard(&inner.running);
        inner.abort.send_replace(false);

        let debug = options.debug_mode || options.step_mode;
        let analysis = analyze(source);
        let plan = if debug {
            match self.ensure_session(source, &analysis)? {
                SessionTarget::Program(program) => Plan::Program(program),
                SessionTarget::Sketch(sketch) => Plan::Sketch(sketch),
            }
        } else {
            analysis.program.clone().map(|p| Plan::Program(Arc::new(p))).unwrap_or(Plan::Rejected)
        };

        let timeout_ms = options.timeout_ms.unwrap_or(inner.config.default_timeout_ms);
        let started = Instant::now();
        let debug_mode = debug;
        tracing::info!(debug_mode, step = options.step_mode, timeout_ms, "execution started");
        inner.bus.publish(
            EventKind::ExecutionStart,
            json!({ "debug": debug, "step": options.step_mode, "timeout_ms": timeout_ms }),
        );

        let ctx = RunContext {
            config: inner.config.clone(),
            bus: inner.bus.clone(),
            input: inner.input.clone(),
            debugger: debug.then(|| inner.debugger.clone()),
            abort: inner.abort.subscribe(),
            timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        };
        if debug {
            inner.debugger.begin_run(options.step_mode);
        }
        let outcome = match &plan {
            Plan::Program(program) => Some(Interpreter::new(ctx).run(program).await),
            Plan::Sketch(sketch) => Some(Interpreter::new(ctx).run_sketch(sketch).await),
            Plan::Rejected => None,
        };

        let result = self.conclude(&analysis, matches!(plan, Plan::Sketch(_)), outcome, started);
        inner.input.cancel_all();
        if debug {
            inner.debugger.finish_run(result.success);
            if inner.debugger.has_session() {
                let _ = inner.debugger.close_session();
            }
        }
        tracing::info!(success = result.success, duration_ms = result.duration_ms, "execution finished");
        inner.bus.publish(
            EventKind::ExecutionComplete,
            json!({
                "success": result.success,
                "duration_ms": result.duration_ms,
                "outputs": result.outputs.len(),
                "error": result.error.as_ref().map(|d| d.to_string()),
            }),
        );
        Ok(result)
    }

    fn conclude(
        &self,
        analysis: &Analysis,
        degraded: bool,
        outcome: Option<RunOutcome>,
        started: Instant,
    ) -> ExecutionResult {
        let mut diagnostics = analysis.diagnostics.clone();
        let (outputs, variables, runtime_error) = match outcome {
            Some(RunOutcome { outputs, variables, error }) => (outputs, variables, error),
            None => (Vec::new(), BTreeMap::new(), None),
        };

        let error = match runtime_error {
            Some(e) => {
                let diag = e.to_diagnostic();
                diagnostics.push(diag.clone());
                Some(diag)
            }
            None => analysis.errors().next().cloned(),
        };
        for diag in diagnostics.iter().filter(|d| d.is_error()) {
            self.inner.bus.publish(
                EventKind::ExecutionError,
                json!({
                    "kind": diag.kind,
                    "message": diag.message,
                    "line": diag.location.line,
                    "column": diag.location.column,
                }),
            );
        }

        let success = error.is_none() && !degraded;
        ExecutionResult {
            success,
            outputs,
            variables,
            error,
            diagnostics,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Reuse the active session when it holds the same source, otherwise
    /// replace it.
    fn ensure_session(&self, source: &str, analysis: &Analysis) -> Result<SessionTarget, SessionError> {
        let debugger = &self.inner.debugger;
        if let Some((active_source, target)) = debugger.session_target() {
            if active_source == source {
                return Ok(target);
            }
            debugger.close_session()?;
        }
        let target = session_target(source, analysis);
        debugger.open_session(source, target.clone())?;
        Ok(target)
    }

    pub fn validate(&self, source: &str) -> Validation {
        validate(source)
    }

    /// Cooperative cancellation of the running execution; pending input
    /// waiters are released. Returns whether anything was running.
    pub fn abort(&self) -> bool {
        let running = self.is_running();
        if running {
            tracing::info!("abort requested");
            self.inner.abort.send_replace(true);
        }
        self.inner.input.cancel_all();
        running
    }

    /* ── Debug control ────────────────────────────────────── */

    pub fn start_session(&self, source: &str) -> Result<SessionInfo, SessionError> {
        let debugger = &self.inner.debugger;
        if debugger.has_session() {
            return Err(SessionError::SessionActive);
        }
        let analysis = analyze(source);
        debugger.open_session(source, session_target(source, &analysis))
    }

    /// Destroy the session, aborting its run and cancelling input waiters.
    pub fn stop(&self) -> Result<SessionInfo, SessionError> {
        if !self.inner.debugger.has_session() {
            return Err(SessionError::NoActiveSession);
        }
        if self.is_running() {
            self.inner.abort.send_replace(true);
        }
        let info = self.inner.debugger.close_session()?;
        self.inner.input.cancel_all();
        Ok(info)
    }

    pub fn session(&self) -> Option<SessionInfo> {
        self.inner.debugger.session()
    }

    pub fn debug_state(&self) -> DebugState {
        self.inner.debugger.state()
    }

    pub fn add_breakpoint(
        &self,
        line: usize,
        condition: Option<&str>,
        log_message: Option<&str>,
    ) -> Result<Breakpoint, SessionError> {
        self.inner.debugger.add_breakpoint(line, condition, log_message)
    }

    pub fn remove_breakpoint(&self, line: usize) -> Result<Breakpoint, SessionError> {
        self.inner.debugger.remove_breakpoint(line)
    }

    pub fn toggle_breakpoint(&self, line: usize) -> Result<bool, SessionError> {
        self.inner.debugger.toggle_breakpoint(line)
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.inner.debugger.breakpoints()
    }

    pub fn continue_(&self) -> Result<(), SessionError> {
        self.inner.debugger.continue_()
    }

    pub fn step_over(&self) -> Result<(), SessionError> {
        self.inner.debugger.step(StepMode::Over)
    }

    pub fn step_into(&self) -> Result<(), SessionError> {
        self.inner.debugger.step(StepMode::Into)
    }

    pub fn step_out(&self) -> Result<(), SessionError> {
        self.inner.debugger.step(StepMode::Out)
    }

    pub fn add_watch(&self, expr: &str) -> Result<(), SessionError> {
        self.inner.debugger.add_watch(expr)
    }

    pub fn remove_watch(&self, expr: &str) -> bool {
        self.inner.debugger.remove_watch(expr)
    }

    pub fn watches(&self) -> Vec<String> {
        self.inner.debugger.watch_sources()
    }

    /* ── Input ────────────────────────────────────────────── */

    pub async fn request_input(
        &self,
        prompt: &str,
        timeout: Option<Duration>,
        validator: Option<Validator>,
    ) -> Result<String, InputError> {
        self.inner.input.request(prompt, timeout, validator).await
    }

    pub fn submit_input(&self, text: &str) -> Result<(), InputError> {
        self.inner.input.submit(text)
    }

    pub fn pending_inputs(&self) -> usize {
        self.inner.input.pending()
    }

    /* ── Events ───────────────────────────────────────────── */

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RuntimeEvent> {
        self.inner.bus.subscribe()
    }

    pub fn history(&self) -> Vec<RuntimeEvent> {
        self.inner.bus.history()
    }
}

fn session_target(source: &str, analysis: &Analysis) -> SessionTarget {
    match &analysis.program {
        Some(program) => SessionTarget::Program(Arc::new(program.clone())),
        None => SessionTarget::Sketch(Arc::new(LineSketch::build(source))),
    }
}
