// src/core/debugger.rs
//! Debugger state machine: breakpoints, watches, step requests and the
//! pause/resume handshake with the running interpreter.
//!
//! The host only talks to the interpreter through this type. Shared state
//! sits behind a short-lived lock that is never held across an await; the
//! interpreter parks on a [`Notify`] while paused.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Notify;

use crate::core::ast::{Expr, Program, StringPart};
use crate::core::diagnostics::Location;
use crate::core::error::SessionError;
use crate::core::events::{EventBus, EventKind};
use crate::core::parser::{parse_expression_source, parse_template};
use crate::core::sketch::LineSketch;

/// Upper bound on recorded execution-path entries per session.
pub const MAX_EXECUTION_PATH: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugState {
    Idle,
    Running,
    Paused,
    Completed,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepMode {
    Over,
    Into,
    Out,
}

impl fmt::Display for StepMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepMode::Over => write!(f, "over"),
            StepMode::Into => write!(f, "into"),
            StepMode::Out => write!(f, "out"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Breakpoint {
    pub id: u64,
    pub line: usize,
    pub enabled: bool,
    pub condition: Option<String>,
    pub log_message: Option<String>,
    pub hit_count: u64,
    /// The active session has a statement on this line.
    pub verified: bool,
    #[serde(skip)]
    condition_expr: Option<Expr>,
    #[serde(skip)]
    log_template: Option<Vec<StringPart>>,
}

impl Breakpoint {
    pub fn is_logpoint(&self) -> bool {
        self.log_message.is_some()
    }
}

/// What the interpreter needs to evaluate a breakpoint on its line.
#[derive(Debug, Clone)]
pub struct BreakpointProbe {
    pub id: u64,
    pub condition: Option<Expr>,
    pub log: Option<Vec<StringPart>>,
}

#[derive(Debug, Clone)]
pub struct Watch {
    pub source: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, Copy)]
struct StepRequest {
    mode: StepMode,
    depth: usize,
}

impl StepRequest {
    fn matches(&self, depth: usize) -> bool {
        match self.mode {
            StepMode::Into => true,
            StepMode::Over => depth <= self.depth,
            StepMode::Out => depth < self.depth,
        }
    }
}

/// A statement boundary the interpreter is about to cross.
#[derive(Debug, Clone, Copy)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub depth: usize,
}

/// Why the interpreter stopped.
#[derive(Debug, Clone)]
pub struct PauseInfo {
    pub position: Position,
    pub breakpoint: Option<(u64, u64)>,
    pub step: Option<StepMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeCommand {
    Continue,
    Step(StepMode),
}

impl fmt::Display for ResumeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResumeCommand::Continue => write!(f, "continue"),
            ResumeCommand::Step(mode) => write!(f, "step_{}", mode),
        }
    }
}

/// What a debug session runs: the checked program, or the degraded sketch.
#[derive(Debug, Clone)]
pub enum SessionTarget {
    Program(Arc<Program>),
    Sketch(Arc<LineSketch>),
}

#[derive(Debug, Clone)]
pub struct DebugSession {
    pub id: String,
    pub source: String,
    pub target: SessionTarget,
    /// line -> locations of the statements starting on it
    pub source_map: BTreeMap<usize, Vec<Location>>,
    pub execution_path: Vec<usize>,
}

impl DebugSession {
    pub fn new(id: String, source: &str, target: SessionTarget) -> Self {
        let mut source_map: BTreeMap<usize, Vec<Location>> = BTreeMap::new();
        match &target {
            SessionTarget::Program(program) => {
                program.walk(&mut |stmt| source_map.entry(stmt.line()).or_default().push(stmt.location));
            }
            SessionTarget::Sketch(sketch) => {
                for line in &sketch.lines {
                    source_map.entry(line.line).or_default().push(Location::at(line.line, 1));
                }
            }
        }
        Self { id, source: source.to_string(), target, source_map, execution_path: Vec::new() }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.target, SessionTarget::Sketch(_))
    }
}

/// Read-only view handed to the host.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub degraded: bool,
    pub lines: Vec<usize>,
    pub execution_path: Vec<usize>,
}

struct Shared {
    state: DebugState,
    session: Option<DebugSession>,
    next_session: u64,
    breakpoints: BTreeMap<usize, Breakpoint>,
    next_breakpoint: u64,
    watches: Vec<Watch>,
    pending_step: Option<StepRequest>,
    resume: Option<ResumeCommand>,
    current: Option<Position>,
}

pub struct Debugger {
    shared: Mutex<Shared>,
    resumed: Notify,
    bus: EventBus,
}

impl fmt::Debug for Debugger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("Debugger")
            .field("state", &shared.state)
            .field("breakpoints", &shared.breakpoints.len())
            .finish()
    }
}

impl Debugger {
    pub fn new(bus: EventBus) -> Self {
        let shared = Shared {
            state: DebugState::Idle,
            session: None,
            next_session: 0,
            breakpoints: BTreeMap::new(),
            next_breakpoint: 0,
            watches: Vec::new(),
            pending_step: None,
            resume: None,
            current: None,
        };
        Self { shared: Mutex::new(shared), resumed: Notify::new(), bus }
    }

    pub fn state(&self) -> DebugState {
        self.shared.lock().state
    }

    /* ── Sessions ─────────────────────────────────────────── */

    pub fn has_session(&self) -> bool {
        self.shared.lock().session.is_some()
    }

    pub fn open_session(&self, source: &str, target: SessionTarget) -> Result<SessionInfo, SessionError> {
        let mut shared = self.shared.lock();
        if shared.session.is_some() {
            return Err(SessionError::SessionActive);
        }
        shared.next_session += 1;
        let session = DebugSession::new(format!("session-{}", shared.next_session), source, target);
        for bp in shared.breakpoints.values_mut() {
            bp.verified = session.source_map.contains_key(&bp.line);
        }
        let info = session_info(&session);
        shared.session = Some(session);
        shared.state = DebugState::Idle;
        shared.pending_step = None;
        shared.resume = None;
        drop(shared);

        tracing::debug!(session = %info.id, degraded = info.degraded, "debug session opened");
        self.bus.publish(
            EventKind::SessionStart,
            json!({ "session_id": info.id, "degraded": info.degraded, "lines": info.lines }),
        );
        Ok(info)
    }

    /// Destroy the active session. Breakpoints survive; the caller cancels
    /// input waiters and aborts the run.
    pub fn close_session(&self) -> Result<SessionInfo, SessionError> {
        let mut shared = self.shared.lock();
        let session = shared.session.take().ok_or(SessionError::NoActiveSession)?;
        let ended_in = shared.state;
        shared.state = DebugState::Idle;
        shared.pending_step = None;
        shared.current = None;
        for bp in shared.breakpoints.values_mut() {
            bp.verified = false;
        }
        drop(shared);
        if ended_in == DebugState::Paused {
            self.resumed.notify_one();
        }
        let info = session_info(&session);
        tracing::debug!(session = %info.id, "debug session closed");
        self.bus.publish(
            EventKind::SessionStop,
            json!({ "session_id": info.id, "state": ended_in, "path_length": info.execution_path.len() }),
        );
        Ok(info)
    }

    pub fn session(&self) -> Option<SessionInfo> {
        self.shared.lock().session.as_ref().map(session_info)
    }

    pub fn session_target(&self) -> Option<(String, SessionTarget)> {
        self.shared.lock().session.as_ref().map(|s| (s.source.clone(), s.target.clone()))
    }

    /* ── Run lifecycle (interpreter side) ─────────────────── */

    pub fn begin_run(&self, step_on_entry: bool) {
        let mut shared = self.shared.lock();
        shared.state = DebugState::Running;
        shared.resume = None;
        shared.current = None;
        shared.pending_step = step_on_entry.then_some(StepRequest { mode: StepMode::Into, depth: 0 });
        if let Some(session) = shared.session.as_mut() {
            session.execution_path.clear();
        }
    }

    pub fn finish_run(&self, success: bool) {
        let mut shared = self.shared.lock();
        shared.state = if success { DebugState::Completed } else { DebugState::Errored };
        shared.pending_step = None;
        shared.current = None;
    }

    /// Record that `position` is about to run. Returns the step mode when a
    /// pending step request stops here (the request is consumed).
    pub fn enter_statement(&self, position: Position) -> Option<StepMode> {
        let mut shared = self.shared.lock();
        shared.current = Some(position);
        if let Some(session) = shared.session.as_mut() {
            if session.execution_path.len() < MAX_EXECUTION_PATH {
                session.execution_path.push(position.line);
            }
        }
        match shared.pending_step {
            Some(step) if step.matches(position.depth) => {
                shared.pending_step = None;
                Some(step.mode)
            }
            _ => None,
        }
    }

    pub fn breakpoint_at(&self, line: usize) -> Option<BreakpointProbe> {
        let shared = self.shared.lock();
        shared.breakpoints.get(&line).filter(|bp| bp.enabled).map(|bp| BreakpointProbe {
            id: bp.id,
            condition: bp.condition_expr.clone(),
            log: bp.log_template.clone(),
        })
    }

    /// Count a hit; returns the new hit count.
    pub fn record_hit(&self, id: u64) -> u64 {
        let mut shared = self.shared.lock();
        match shared.breakpoints.values_mut().find(|bp| bp.id == id) {
            Some(bp) => {
                bp.hit_count += 1;
                bp.hit_count
            }
            None => 0,
        }
    }

    pub fn watches(&self) -> Vec<Watch> {
        self.shared.lock().watches.clone()
    }

    /// Enter the paused state and publish the pause events. `variables` and
    /// `watches` are already rendered for the paused scope.
    pub fn pause(&self, info: &PauseInfo, variables: serde_json::Value, watches: serde_json::Value) {
        {
            let mut shared = self.shared.lock();
            shared.state = DebugState::Paused;
            shared.resume = None;
            shared.pending_step = None;
        }
        let Position { line, depth, .. } = info.position;
        if let Some((id, hit_count)) = info.breakpoint {
            self.bus.publish(EventKind::BreakpointHit, json!({ "id": id, "line": line, "hit_count": hit_count }));
        }
        if let Some(mode) = info.step {
            self.bus.publish(EventKind::StepComplete, json!({ "mode": mode, "line": line }));
        }
        let reason = if info.breakpoint.is_some() { "breakpoint" } else { "step" };
        tracing::debug!(line, depth, reason, "paused");
        self.bus.publish(
            EventKind::ExecutionPaused,
            json!({ "reason": reason, "line": line, "column": info.position.column, "depth": depth }),
        );
        self.bus.publish(EventKind::VariableUpdate, json!({ "variables": variables, "watches": watches }));
    }

    /// Park until the host resumes. Cancellation is the caller's concern
    /// (it races this against the abort flag).
    pub async fn wait_resume(&self) -> ResumeCommand {
        loop {
            {
                let mut shared = self.shared.lock();
                if shared.state != DebugState::Paused {
                    return shared.resume.take().unwrap_or(ResumeCommand::Continue);
                }
            }
            self.resumed.notified().await;
        }
    }

    /* ── Host controls ────────────────────────────────────── */

    pub fn continue_(&self) -> Result<(), SessionError> {
        self.command(ResumeCommand::Continue)
    }

    pub fn step(&self, mode: StepMode) -> Result<(), SessionError> {
        self.command(ResumeCommand::Step(mode))
    }

    fn command(&self, command: ResumeCommand) -> Result<(), SessionError> {
        let mut shared = self.shared.lock();
        if shared.session.is_none() {
            return Err(SessionError::NoActiveSession);
        }
        let state = shared.state;
        match state {
            DebugState::Paused => {
                let depth = shared.current.map(|p| p.depth).unwrap_or(0);
                shared.pending_step = match command {
                    ResumeCommand::Step(mode) => Some(StepRequest { mode, depth }),
                    ResumeCommand::Continue => None,
                };
                shared.resume = Some(command);
                shared.state = DebugState::Running;
                drop(shared);
                tracing::debug!(%command, "resumed");
                self.bus.publish(EventKind::ExecutionContinued, json!({ "command": command.to_string() }));
                self.resumed.notify_one();
                Ok(())
            }
            DebugState::Running => {
                // Takes effect at the next statement boundary.
                let depth = shared.current.map(|p| p.depth).unwrap_or(0);
                shared.pending_step = match command {
                    ResumeCommand::Step(mode) => Some(StepRequest { mode, depth }),
                    ResumeCommand::Continue => None,
                };
                Ok(())
            }
            DebugState::Idle | DebugState::Completed | DebugState::Errored => Err(SessionError::NotRunning),
        }
    }

    pub fn add_breakpoint(
        &self,
        line: usize,
        condition: Option<&str>,
        log_message: Option<&str>,
    ) -> Result<Breakpoint, SessionError> {
        let condition_expr = condition.map(parse_condition).transpose()?;
        let log_template = log_message.map(parse_log_message).transpose()?;

        let mut shared = self.shared.lock();
        let verified = shared.session.as_ref().map(|s| s.source_map.contains_key(&line)).unwrap_or(false);
        let id = match shared.breakpoints.get(&line) {
            Some(existing) => existing.id,
            None => {
                shared.next_breakpoint += 1;
                shared.next_breakpoint
            }
        };
        let hit_count = shared.breakpoints.get(&line).map(|bp| bp.hit_count).unwrap_or(0);
        let bp = Breakpoint {
            id,
            line,
            enabled: true,
            condition: condition.map(str::to_string),
            log_message: log_message.map(str::to_string),
            hit_count,
            verified,
            condition_expr,
            log_template,
        };
        shared.breakpoints.insert(line, bp.clone());
        Ok(bp)
    }

    pub fn remove_breakpoint(&self, line: usize) -> Result<Breakpoint, SessionError> {
        self.shared.lock().breakpoints.remove(&line).ok_or(SessionError::NoBreakpoint(line))
    }

    /// Flip `enabled`; returns the new state.
    pub fn toggle_breakpoint(&self, line: usize) -> Result<bool, SessionError> {
        let mut shared = self.shared.lock();
        let bp = shared.breakpoints.get_mut(&line).ok_or(SessionError::NoBreakpoint(line))?;
        bp.enabled = !bp.enabled;
        Ok(bp.enabled)
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.shared.lock().breakpoints.values().cloned().collect()
    }

    pub fn add_watch(&self, source: &str) -> Result<(), SessionError> {
        let expr = parse_condition(source)?;
        let mut shared = self.shared.lock();
        if !shared.watches.iter().any(|w| w.source == source) {
            shared.watches.push(Watch { source: source.to_string(), expr });
        }
        Ok(())
    }

    pub fn remove_watch(&self, source: &str) -> bool {
        let mut shared = self.shared.lock();
        let before = shared.watches.len();
        shared.watches.retain(|w| w.source != source);
        shared.watches.len() != before
    }

    pub fn watch_sources(&self) -> Vec<String> {
        self.shared.lock().watches.iter().map(|w| w.source.clone()).collect()
    }
}

fn session_info(session: &DebugSession) -> SessionInfo {
    SessionInfo {
        id: session.id.clone(),
        degraded: session.is_degraded(),
        lines: session.source_map.keys().copied().collect(),
        execution_path: session.execution_path.clone(),
    }
}

/// Conditions, watches and logpoint placeholders are evaluated while the
/// program is stopped and must not rebind its variables.
const ASSIGNMENT_REJECTED: &str = "Assignment is not allowed in a debugger expression";

fn parse_condition(source: &str) -> Result<Expr, SessionError> {
    let expr = parse_expression_source(source).map_err(|diags| SessionError::InvalidExpression {
        expr: source.to_string(),
        message: diags.first().map(|d| d.message.clone()).unwrap_or_default(),
    })?;
    if expr.assigns() {
        return Err(SessionError::InvalidExpression { expr: source.to_string(), message: ASSIGNMENT_REJECTED.into() });
    }
    Ok(expr)
}

fn parse_log_message(source: &str) -> Result<Vec<StringPart>, SessionError> {
    let parts = parse_template(source).map_err(|diags| SessionError::InvalidExpression {
        expr: source.to_string(),
        message: diags.first().map(|d| d.message.clone()).unwrap_or_default(),
    })?;
    if parts.iter().any(StringPart::assigns) {
        return Err(SessionError::InvalidExpression { expr: source.to_string(), message: ASSIGNMENT_REJECTED.into() });
    }
    Ok(parts)
}
