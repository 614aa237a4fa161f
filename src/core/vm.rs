// src/core/vm.rs
//! SUSA VM: async tree-walking interpreter over the AST.
//!
//! Statements run depth-first in source order; expressions evaluate bottom-up.
//! Every statement boundary is a checkpoint: the abort flag and time budget
//! are checked there, the scheduler gets a turn every `yield_interval`
//! statements, and the debugger decides whether to pause. Break, continue and
//! return travel as [`ControlFlow`] values, never as errors.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::FutureExt;
use serde_json::json;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::core::ast::{
    BinaryOp, Block, ExprKind, Expr, LogicalOp, Program, Stmt, StmtKind, StringPart, UnaryOp,
};
use crate::core::builtins::Builtin;
use crate::core::compiler::analyze;
use crate::core::debugger::{Debugger, PauseInfo, Position};
use crate::core::diagnostics::Location;
use crate::core::env::{Environment, FrameId};
use crate::core::error::{InputError, RuntimeError, RuntimeErrorKind};
use crate::core::events::{EventBus, EventKind};
use crate::core::input::InputCoordinator;
use crate::core::sketch::LineSketch;
use crate::core::stack::Deep;
use crate::core::value::{ClassValue, Closure, Value};

/// Everything an interpreter borrows from its engine for one run.
pub struct RunContext {
    pub config: EngineConfig,
    pub bus: EventBus,
    pub input: InputCoordinator,
    pub debugger: Option<Arc<Debugger>>,
    pub abort: watch::Receiver<bool>,
    pub timeout: Option<Duration>,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub outputs: Vec<String>,
    /// Global bindings at the point the run stopped.
    pub variables: BTreeMap<String, Value>,
    pub error: Option<RuntimeError>,
}

#[derive(Debug)]
enum ControlFlow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

type Exec = Result<ControlFlow, RuntimeError>;

/// Wall-clock budget that only counts running time.
struct Budget {
    started: Instant,
    excluded: Duration,
    limit: Option<Duration>,
}

impl Budget {
    fn exceeded(&self) -> bool {
        match self.limit {
            Some(limit) => self.started.elapsed().saturating_sub(self.excluded) > limit,
            None => false,
        }
    }
}

pub struct Interpreter {
    config: EngineConfig,
    env: Environment,
    outputs: Vec<String>,
    bus: EventBus,
    input: InputCoordinator,
    debugger: Option<Arc<Debugger>>,
    abort: watch::Receiver<bool>,
    budget: Budget,
    depth: usize,
    statements: u64,
    /// Set while evaluating debugger conditions, watches and log templates.
    hooks_muted: bool,
}

impl Interpreter {
    pub fn new(ctx: RunContext) -> Self {
        Self {
            config: ctx.config,
            env: Environment::new(),
            outputs: Vec::new(),
            bus: ctx.bus,
            input: ctx.input,
            debugger: ctx.debugger,
            abort: ctx.abort,
            budget: Budget { started: Instant::now(), excluded: Duration::ZERO, limit: ctx.timeout },
            depth: 0,
            statements: 0,
            hooks_muted: false,
        }
    }

    pub async fn run(mut self, program: &Program) -> RunOutcome {
        let global = self.env.global();
        self.hoist(&program.statements, global);
        let error = self.exec_block(&program.statements, global).await.err();
        self.finish(error)
    }

    /// Degraded walk: one checkpoint per sketched line; lines that parse on
    /// their own as LET/PRINT/expression statements are evaluated.
    pub async fn run_sketch(mut self, sketch: &LineSketch) -> RunOutcome {
        let global = self.env.global();
        let mut error = None;
        for line in &sketch.lines {
            let location = Location::at(line.line, 1);
            if let Err(e) = self.checkpoint(location, global, true).await {
                error = Some(e);
                break;
            }
            if !line.kind.is_standalone() {
                continue;
            }
            let Some(program) = analyze(&line.text).program else { continue };
            self.hooks_muted = true;
            let result = self.exec_block(&program.statements, global).await;
            self.hooks_muted = false;
            if let Err(mut e) = result {
                e.location = Location::at(line.line, e.location.column);
                if matches!(e.kind, RuntimeErrorKind::Aborted | RuntimeErrorKind::Timeout) {
                    error = Some(e);
                    break;
                }
                tracing::warn!(line = line.line, error = %e, "degraded line failed");
            }
        }
        self.finish(error)
    }

    fn finish(self, error: Option<RuntimeError>) -> RunOutcome {
        let global = self.env.global();
        RunOutcome { variables: self.env.locals(global), outputs: self.outputs, error }
    }

    /// Top-level FUNC and CLASS are visible before the walk starts.
    fn hoist(&mut self, stmts: &[Stmt], frame: FrameId) {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::Function(decl) => {
                    self.env.define(frame, &decl.name, Value::Function(Closure { decl: decl.clone(), frame }))
                }
                StmtKind::Class(decl) => {
                    self.env.define(frame, &decl.name, Value::Class(ClassValue { decl: decl.clone(), frame }))
                }
                _ => {}
            }
        }
    }

    /* ── Checkpoints ──────────────────────────────────────── */

    fn check_abort(&self, location: Location) -> Result<(), RuntimeError> {
        if *self.abort.borrow() {
            return Err(RuntimeError::aborted(location));
        }
        Ok(())
    }

    /// Statement boundary. `line_breakpoints` is false for a header whose
    /// inline body shares its line, so a line breakpoint fires once per
    /// body visit rather than once more for the header.
    async fn checkpoint(&mut self, location: Location, frame: FrameId, line_breakpoints: bool) -> Result<(), RuntimeError> {
        if self.hooks_muted {
            return Ok(());
        }
        self.check_abort(location)?;
        if self.budget.exceeded() {
            let limit = self.budget.limit.map(|l| l.as_millis() as u64).unwrap_or_default();
            return Err(RuntimeError::timeout(limit, location));
        }
        self.statements += 1;
        if self.config.yield_interval > 0 && self.statements % self.config.yield_interval == 0 {
            tokio::task::yield_now().await;
            self.check_abort(location)?;
        }

        let Some(debugger) = self.debugger.clone() else { return Ok(()) };
        let position = Position { line: location.line, column: location.column, depth: self.depth };
        let step = debugger.enter_statement(position);

        let mut breakpoint = None;
        let candidate = if line_breakpoints { debugger.breakpoint_at(location.line) } else { None };
        if let Some(bp) = candidate {
            let holds = match &bp.condition {
                Some(condition) => self.condition_holds(condition, frame).await,
                None => true,
            };
            if holds {
                let hits = debugger.record_hit(bp.id);
                match &bp.log {
                    Some(template) => {
                        let text = self.render_template(template, frame).await;
                        self.bus.publish(
                            EventKind::ExecutionOutput,
                            json!({ "text": text, "logpoint": true, "line": location.line }),
                        );
                    }
                    None => breakpoint = Some((bp.id, hits)),
                }
            }
        }
        if breakpoint.is_none() && step.is_none() {
            return Ok(());
        }

        let variables = vars_json(&self.env.visible(frame));
        let watches = self.render_watches(&debugger, frame).await;
        debugger.pause(&PauseInfo { position, breakpoint, step }, variables, watches);

        let paused_at = Instant::now();
        tokio::select! {
            _ = debugger.wait_resume() => {}
            _ = abort_signal(self.abort.clone()) => {}
        }
        self.budget.excluded += paused_at.elapsed();
        self.check_abort(location)
    }

    async fn condition_holds(&mut self, condition: &Expr, frame: FrameId) -> bool {
        match self.eval_muted(condition, frame).await {
            Ok(value) => value.truthy(),
            Err(e) => {
                tracing::warn!(error = %e, "breakpoint condition failed; treated as false");
                false
            }
        }
    }

    async fn render_template(&mut self, parts: &[StringPart], frame: FrameId) -> String {
        let mut out = String::new();
        for part in parts {
            match part {
                StringPart::Literal(text) => out.push_str(text),
                StringPart::Placeholder(expr) => match self.eval_muted(expr, frame).await {
                    Ok(value) => out.push_str(&value.to_string()),
                    Err(e) => out.push_str(&format!("<error: {}>", e.message)),
                },
            }
        }
        out
    }

    async fn render_watches(&mut self, debugger: &Debugger, frame: FrameId) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        for watch in debugger.watches() {
            let value = match self.eval_muted(&watch.expr, frame).await {
                Ok(value) => value.to_json(),
                Err(e) => json!(format!("<error: {}>", e.message)),
            };
            out.insert(watch.source, value);
        }
        serde_json::Value::Object(out)
    }

    async fn eval_muted(&mut self, expr: &Expr, frame: FrameId) -> Result<Value, RuntimeError> {
        let previous = std::mem::replace(&mut self.hooks_muted, true);
        let result = self.eval(expr, frame).await;
        self.hooks_muted = previous;
        result
    }

    /* ── Statements ───────────────────────────────────────── */

    fn exec_block<'a>(&'a mut self, stmts: &'a [Stmt], frame: FrameId) -> Deep<'a, Exec> {
        Deep::new(async move {
            for stmt in stmts {
                match self.exec_stmt(stmt, frame).await? {
                    ControlFlow::Normal => {}
                    flow => return Ok(flow),
                }
            }
            Ok(ControlFlow::Normal)
        }
        .boxed())
    }

    async fn exec_stmt(&mut self, stmt: &Stmt, frame: FrameId) -> Exec {
        self.checkpoint(stmt.location, frame, !stmt.has_inline_body()).await?;
        match &stmt.kind {
            StmtKind::Let { name, value, .. } => {
                let value = match value {
                    Some(expr) => self.eval(expr, frame).await?,
                    None => Value::Null,
                };
                self.env.define(frame, name, value);
            }
            StmtKind::Function(decl) => {
                self.env.define(frame, &decl.name, Value::Function(Closure { decl: decl.clone(), frame }));
            }
            StmtKind::Class(decl) => {
                self.env.define(frame, &decl.name, Value::Class(ClassValue { decl: decl.clone(), frame }));
            }
            StmtKind::If { condition, then_branch, else_branch } => {
                if self.eval(condition, frame).await?.truthy() {
                    return self.exec_block(&then_branch.statements, frame).await;
                }
                if let Some(block) = else_branch {
                    return self.exec_block(&block.statements, frame).await;
                }
            }
            StmtKind::While { condition, body } => {
                let mut iterations = 0usize;
                loop {
                    if !self.eval(condition, frame).await?.truthy() {
                        break;
                    }
                    iterations += 1;
                    self.guard_iterations(iterations, stmt.location)?;
                    match self.exec_block(&body.statements, frame).await? {
                        ControlFlow::Break => break,
                        ControlFlow::Return(v) => return Ok(ControlFlow::Return(v)),
                        ControlFlow::Normal | ControlFlow::Continue => {}
                    }
                }
            }
            StmtKind::ForRange { var, from, to, step, body } => {
                return self.exec_for(var, (from, to, step.as_ref()), body, frame, stmt.location).await;
            }
            StmtKind::Repeat { var, start, count, body } => {
                let count = self.eval_number(count, frame, "LOOP count").await?;
                let first = match start {
                    Some(expr) => self.eval_number(expr, frame, "LOOP start").await?,
                    None => 0.0,
                };
                let total = if count.is_finite() && count > 0.0 { count.floor() as u64 } else { 0 };
                for k in 0..total {
                    self.guard_iterations(k as usize + 1, stmt.location)?;
                    if let Some(var) = var {
                        self.env.define(frame, var, Value::Number(first + k as f64));
                    }
                    match self.exec_block(&body.statements, frame).await? {
                        ControlFlow::Break => break,
                        ControlFlow::Return(v) => return Ok(ControlFlow::Return(v)),
                        ControlFlow::Normal | ControlFlow::Continue => {}
                    }
                }
            }
            StmtKind::Block(block) => return self.exec_block(&block.statements, frame).await,
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, frame).await?,
                    None => Value::Null,
                };
                return Ok(ControlFlow::Return(value));
            }
            StmtKind::Print(args) => {
                let mut parts = Vec::with_capacity(args.len());
                for arg in args {
                    parts.push(self.eval(arg, frame).await?.to_string());
                }
                self.check_abort(stmt.location)?;
                let text = parts.join(" ");
                self.bus.publish(EventKind::ExecutionOutput, json!({ "text": text, "line": stmt.line() }));
                self.outputs.push(text);
            }
            StmtKind::Break => return Ok(ControlFlow::Break),
            StmtKind::Continue => return Ok(ControlFlow::Continue),
            StmtKind::Expr(expr) => {
                self.eval(expr, frame).await?;
            }
        }
        Ok(ControlFlow::Normal)
    }

    async fn exec_for(
        &mut self,
        var: &str,
        (from, to, step): (&Expr, &Expr, Option<&Expr>),
        body: &Block,
        frame: FrameId,
        location: Location,
    ) -> Exec {
        let from = self.eval_number(from, frame, "FOR start").await?;
        let to = self.eval_number(to, frame, "FOR end").await?;
        let step = match step {
            Some(expr) => self.eval_number(expr, frame, "FOR STEP").await?,
            None if to >= from => 1.0,
            None => -1.0,
        };
        if step == 0.0 || !step.is_finite() {
            return Err(RuntimeError::new(RuntimeErrorKind::InvalidOperation, "FOR STEP cannot be zero", location));
        }
        let mut i = from;
        let mut iterations = 0usize;
        while (step > 0.0 && i <= to) || (step < 0.0 && i >= to) {
            iterations += 1;
            self.guard_iterations(iterations, location)?;
            self.env.define(frame, var, Value::Number(i));
            match self.exec_block(&body.statements, frame).await? {
                ControlFlow::Break => break,
                ControlFlow::Return(v) => return Ok(ControlFlow::Return(v)),
                ControlFlow::Normal | ControlFlow::Continue => {}
            }
            i += step;
        }
        Ok(ControlFlow::Normal)
    }

    fn guard_iterations(&self, iterations: usize, location: Location) -> Result<(), RuntimeError> {
        if iterations > self.config.max_loop_iterations {
            return Err(RuntimeError::new(
                RuntimeErrorKind::LoopBoundExceeded,
                format!("Loop exceeded iteration limit of {}", self.config.max_loop_iterations),
                location,
            ));
        }
        Ok(())
    }

    /* ── Expressions ──────────────────────────────────────── */

    fn eval<'a>(&'a mut self, expr: &'a Expr, frame: FrameId) -> Deep<'a, Result<Value, RuntimeError>> {
        Deep::new(async move {
            let location = expr.location;
            Ok(match &expr.kind {
                ExprKind::Number(n) => Value::Number(*n),
                ExprKind::Str(s) => Value::Str(s.clone()),
                ExprKind::Bool(b) => Value::Bool(*b),
                ExprKind::Null => Value::Null,
                ExprKind::Interpolated(parts) => {
                    let mut out = String::new();
                    for part in parts {
                        match part {
                            StringPart::Literal(text) => out.push_str(text),
                            StringPart::Placeholder(e) => out.push_str(&self.eval(e, frame).await?.to_string()),
                        }
                    }
                    Value::Str(out)
                }
                ExprKind::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.eval(item, frame).await?);
                    }
                    Value::Array(out)
                }
                ExprKind::Identifier(name) => {
                    self.env.get(frame, name).ok_or_else(|| RuntimeError::undefined_variable(name, location))?
                }
                ExprKind::Assign { name, value } => {
                    let value = self.eval(value, frame).await?;
                    if !self.env.assign(frame, name, value.clone()) {
                        return Err(RuntimeError::undefined_variable(name, location));
                    }
                    value
                }
                ExprKind::Binary { op, left, right } => {
                    let l = self.eval(left, frame).await?;
                    let r = self.eval(right, frame).await?;
                    binary(*op, l, r, location)?
                }
                ExprKind::Logical { op, left, right } => {
                    let l = self.eval(left, frame).await?.truthy();
                    match op {
                        LogicalOp::And if !l => Value::Bool(false),
                        LogicalOp::Or if l => Value::Bool(true),
                        _ => Value::Bool(self.eval(right, frame).await?.truthy()),
                    }
                }
                ExprKind::Unary { op, operand } => {
                    let v = self.eval(operand, frame).await?;
                    match op {
                        UnaryOp::Neg => match v.as_number() {
                            Some(n) if !matches!(v, Value::Str(_)) => Value::Number(-n),
                            _ => {
                                return Err(RuntimeError::type_mismatch(
                                    format!("Cannot negate {}", v.type_name()),
                                    location,
                                ))
                            }
                        },
                        UnaryOp::Not => Value::Bool(!v.truthy()),
                    }
                }
                ExprKind::Call { callee, args } => self.eval_call(callee, args, frame, location).await?,
                ExprKind::Index { target, index } => {
                    let target = self.eval(target, frame).await?;
                    let index = self.eval(index, frame).await?;
                    index_value(&target, &index, location)?
                }
                ExprKind::Member { target, name } => {
                    let target = self.eval(target, frame).await?;
                    member_of(&target, name, location)?
                }
            })
        }
        .boxed())
    }

    async fn eval_number(&mut self, expr: &Expr, frame: FrameId, what: &str) -> Result<f64, RuntimeError> {
        let value = self.eval(expr, frame).await?;
        match value {
            Value::Number(n) => Ok(n),
            other => other.as_number().filter(|_| !matches!(other, Value::Str(_))).ok_or_else(|| {
                RuntimeError::type_mismatch(format!("{} must be a number, got {}", what, other.type_name()), expr.location)
            }),
        }
    }

    async fn eval_args(&mut self, args: &[Expr], frame: FrameId) -> Result<Vec<Value>, RuntimeError> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            out.push(self.eval(arg, frame).await?);
        }
        Ok(out)
    }

    async fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        frame: FrameId,
        location: Location,
    ) -> Result<Value, RuntimeError> {
        match &callee.kind {
            ExprKind::Member { target, name } => {
                let receiver = self.eval(target, frame).await?;
                let method = member_of(&receiver, name, callee.location)?;
                let argv = self.eval_args(args, frame).await?;
                return self.call_value(method, argv, Some(receiver), location).await;
            }
            ExprKind::Identifier(name) if self.env.get(frame, name).is_none() => {
                if let Some(builtin) = Builtin::lookup(name) {
                    let argv = self.eval_args(args, frame).await?;
                    return self.call_builtin(builtin, argv, location).await;
                }
            }
            _ => {}
        }
        let function = self.eval(callee, frame).await?;
        let argv = self.eval_args(args, frame).await?;
        self.call_value(function, argv, None, location).await
    }

    async fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        receiver: Option<Value>,
        location: Location,
    ) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(closure) => {
                let decl = closure.decl.clone();
                if decl.params.len() != args.len() {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::ArityMismatch,
                        format!("Function '{}' expects {} argument(s), got {}", decl.name, decl.params.len(), args.len()),
                        location,
                    ));
                }
                if self.depth >= self.config.max_call_depth {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::CallDepthExceeded,
                        format!("Maximum call depth of {} exceeded", self.config.max_call_depth),
                        location,
                    ));
                }
                let call_frame = self.env.push(closure.frame);
                if let Some(receiver) = receiver {
                    self.env.define(call_frame, "self", receiver);
                }
                for (param, arg) in decl.params.iter().zip(args) {
                    self.env.define(call_frame, param, arg);
                }
                self.depth += 1;
                let flow = self.exec_block(&decl.body.statements, call_frame).await;
                self.depth -= 1;
                self.env.pop(call_frame);
                match flow? {
                    ControlFlow::Return(value) => Ok(value),
                    _ => Ok(Value::Null),
                }
            }
            Value::Class(class) => {
                if !args.is_empty() {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::ArityMismatch,
                        format!("Class '{}' takes no arguments, got {}", class.decl.name, args.len()),
                        location,
                    ));
                }
                self.instantiate(&class).await
            }
            other => Err(RuntimeError::new(
                RuntimeErrorKind::NotCallable,
                format!("Value of type {} is not callable", other.type_name()),
                location,
            )),
        }
    }

    /// Fields from the class body's LETs, methods from its FUNCs.
    async fn instantiate(&mut self, class: &ClassValue) -> Result<Value, RuntimeError> {
        let decl = class.decl.clone();
        let scratch = self.env.push(class.frame);
        let mut fields = BTreeMap::new();
        for stmt in &decl.body.statements {
            match &stmt.kind {
                StmtKind::Let { name, value, .. } => {
                    let value = match value {
                        Some(expr) => match self.eval(expr, scratch).await {
                            Ok(v) => v,
                            Err(e) => {
                                self.env.pop(scratch);
                                return Err(e);
                            }
                        },
                        None => Value::Null,
                    };
                    self.env.define(scratch, name, value.clone());
                    fields.insert(name.clone(), value);
                }
                StmtKind::Function(f) => {
                    fields.insert(f.name.clone(), Value::Function(Closure { decl: f.clone(), frame: class.frame }));
                }
                _ => {}
            }
        }
        self.env.pop(scratch);
        Ok(Value::Object(fields))
    }

    async fn call_builtin(&mut self, builtin: Builtin, args: Vec<Value>, location: Location) -> Result<Value, RuntimeError> {
        if builtin != Builtin::Input {
            return builtin.call_pure(&args, location);
        }
        builtin.check_arity(args.len(), location)?;
        let prompt = args.first().map(|v| v.to_string()).unwrap_or_default();
        let timeout = self.config.input_timeout_ms.map(Duration::from_millis);
        let waiting_since = Instant::now();
        let answer = tokio::select! {
            answer = self.input.request(&prompt, timeout, None) => answer,
            _ = abort_signal(self.abort.clone()) => Err(InputError::Cancelled),
        };
        self.budget.excluded += waiting_since.elapsed();
        self.check_abort(location)?;
        answer.map(Value::Str).map_err(|e| RuntimeError::new(RuntimeErrorKind::Input, e.to_string(), location))
    }
}

/// Resolves once the abort flag is raised; never if the sender is gone.
async fn abort_signal(mut rx: watch::Receiver<bool>) {
    let closed = rx.wait_for(|flag| *flag).await.is_err();
    if closed {
        futures::future::pending::<()>().await;
    }
}

fn vars_json(vars: &BTreeMap<String, Value>) -> serde_json::Value {
    serde_json::Value::Object(vars.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
    }
}

fn numbers(op: BinaryOp, l: &Value, r: &Value, location: Location) -> Result<(f64, f64), RuntimeError> {
    match (l.as_number(), r.as_number()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(RuntimeError::type_mismatch(
            format!("Operator '{}' cannot be applied to {} and {}", symbol(op), l.type_name(), r.type_name()),
            location,
        )),
    }
}

fn binary(op: BinaryOp, l: Value, r: Value, location: Location) -> Result<Value, RuntimeError> {
    use BinaryOp::*;
    Ok(match op {
        Add => match (l, r) {
            (Value::Str(a), b) => Value::Str(format!("{}{}", a, b)),
            (a, Value::Str(b)) => Value::Str(format!("{}{}", a, b)),
            (Value::Array(mut a), Value::Array(b)) => {
                a.extend(b);
                Value::Array(a)
            }
            (a, b) => {
                let (x, y) = numbers(op, &a, &b, location)?;
                Value::Number(x + y)
            }
        },
        Sub | Mul => {
            let (x, y) = numbers(op, &l, &r, location)?;
            Value::Number(if op == Sub { x - y } else { x * y })
        }
        Div | Mod => {
            let (x, y) = numbers(op, &l, &r, location)?;
            if y == 0.0 {
                return Err(RuntimeError::division_by_zero(location));
            }
            Value::Number(if op == Div { x / y } else { x % y })
        }
        Eq => Value::Bool(l.equals(&r)),
        Ne => Value::Bool(!l.equals(&r)),
        Lt | Le | Gt | Ge => {
            let ordering = match (&l, &r) {
                (Value::Str(a), Value::Str(b)) => a.cmp(b),
                _ => {
                    let (x, y) = numbers(op, &l, &r, location)?;
                    x.partial_cmp(&y).ok_or_else(|| {
                        RuntimeError::type_mismatch(
                            format!("Operator '{}' cannot compare NaN", symbol(op)),
                            location,
                        )
                    })?
                }
            };
            Value::Bool(match op {
                Lt => ordering == Ordering::Less,
                Le => ordering != Ordering::Greater,
                Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    })
}

fn index_value(target: &Value, index: &Value, location: Location) -> Result<Value, RuntimeError> {
    let position = |len: usize| -> Result<usize, RuntimeError> {
        match index {
            Value::Number(n) if n.fract() == 0.0 && *n >= 0.0 && (*n as usize) < len => Ok(*n as usize),
            Value::Number(n) => Err(RuntimeError::new(
                RuntimeErrorKind::IndexOutOfBounds,
                format!("Index {} out of bounds for length {}", Value::Number(*n), len),
                location,
            )),
            other => Err(RuntimeError::type_mismatch(
                format!("Index must be a number, got {}", other.type_name()),
                location,
            )),
        }
    };
    match target {
        Value::Array(items) => Ok(items[position(items.len())?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(chars[position(chars.len())?].to_string()))
        }
        Value::Object(_) => match index {
            Value::Str(key) => member_of(target, key, location),
            other => Err(RuntimeError::type_mismatch(
                format!("Object keys must be strings, got {}", other.type_name()),
                location,
            )),
        },
        other => Err(RuntimeError::type_mismatch(format!("Cannot index into {}", other.type_name()), location)),
    }
}

fn member_of(target: &Value, name: &str, location: Location) -> Result<Value, RuntimeError> {
    match target {
        Value::Object(fields) => fields.get(name).cloned().ok_or_else(|| {
            RuntimeError::new(RuntimeErrorKind::UndefinedMember, format!("Object has no member '{}'", name), location)
        }),
        other => Err(RuntimeError::type_mismatch(
            format!("Cannot access member '{}' on {}", name, other.type_name()),
            location,
        )),
    }
}
