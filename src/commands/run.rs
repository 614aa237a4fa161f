use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::parse_breakpoint_spec;
use crate::config::EngineConfig;
use crate::core::debugger::DebugState;
use crate::core::diagnostics::print_diagnostic;
use crate::core::engine::{Engine, ExecuteOptions};
use crate::core::events::{EventKind, RuntimeEvent};

pub struct RunOptions {
    pub timeout_ms: Option<u64>,
    pub debug: bool,
    pub step: bool,
    pub breakpoints: Vec<String>,
    pub watches: Vec<String>,
}

/// Execute `input`, streaming events to the terminal. stdin lines answer
/// INPUT requests, or drive the debugger while paused. Returns success.
pub async fn main_with_opts(input: PathBuf, config: EngineConfig, opts: RunOptions) -> Result<bool> {
    let source = std::fs::read_to_string(&input).with_context(|| format!("Read {}", input.display()))?;
    let filename = input.display().to_string();
    let engine = Engine::new(config);

    for spec in &opts.breakpoints {
        let (line, condition) = parse_breakpoint_spec(spec).map_err(anyhow::Error::msg)?;
        engine
            .add_breakpoint(line, condition.as_deref(), None)
            .with_context(|| format!("Breakpoint '{}'", spec))?;
    }
    for expr in &opts.watches {
        engine.add_watch(expr).with_context(|| format!("Watch '{}'", expr))?;
    }

    let options = ExecuteOptions {
        timeout_ms: opts.timeout_ms,
        debug_mode: opts.debug || opts.step || !opts.breakpoints.is_empty(),
        step_mode: opts.step,
    };
    let mut events = engine.subscribe();
    let runner = engine.clone();
    let program = source.clone();
    let execution = tokio::spawn(async move { runner.execute(&program, options).await });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut console = Console { engine: engine.clone(), queued: VecDeque::new(), stdin_open: true };
    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                render_event(&event, &source);
                match event.kind {
                    EventKind::ExecutionComplete => break,
                    EventKind::ExecutionPaused | EventKind::InputRequest => console.drain(),
                    _ => {}
                }
            }
            line = lines.next_line(), if console.stdin_open => match line {
                Ok(Some(line)) => {
                    console.queued.push_back(line.trim_end().to_string());
                    console.drain();
                }
                _ => {
                    console.stdin_open = false;
                    console.drain();
                }
            },
            else => break,
        }
    }

    let result = execution.await.context("Execution task failed")??;
    for diag in &result.diagnostics {
        print_diagnostic(&filename, &source, diag);
    }
    if result.success {
        tracing::debug!(duration_ms = result.duration_ms, "run finished");
    } else {
        eprintln!("{} {} failed after {}ms", "✗".bright_red(), filename, result.duration_ms);
    }
    Ok(result.success)
}

/// Routes stdin lines: debugger commands while paused, answers while an
/// INPUT request is pending. Lines that arrive early wait in `queued`.
struct Console {
    engine: Engine,
    queued: VecDeque<String>,
    stdin_open: bool,
}

impl Console {
    fn drain(&mut self) {
        loop {
            let paused = self.engine.debug_state() == DebugState::Paused;
            let waiting = self.engine.pending_inputs() > 0;
            if !paused && !waiting {
                return;
            }
            let Some(line) = self.queued.pop_front() else {
                // Nobody left to answer: do not wait forever.
                if !self.stdin_open {
                    if paused {
                        let _ = self.engine.continue_();
                    } else {
                        self.engine.abort();
                    }
                }
                return;
            };
            if paused {
                self.debug_command(&line);
            } else if let Err(e) = self.engine.submit_input(&line) {
                eprintln!("{} {}", "input:".bright_red(), e);
            }
        }
    }

    fn debug_command(&self, line: &str) {
        let engine = &self.engine;
        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
        let outcome = match cmd {
            "c" | "continue" => engine.continue_(),
            "n" | "next" => engine.step_over(),
            "s" | "step" => engine.step_into(),
            "o" | "out" => engine.step_out(),
            "w" | "watch" if !rest.trim().is_empty() => engine.add_watch(rest.trim()),
            "q" | "quit" => engine.stop().map(|_| ()),
            _ => {
                eprintln!("{} c(ontinue) n(ext) s(tep) o(ut) w EXPR q(uit)", "debug:".bright_blue());
                Ok(())
            }
        };
        if let Err(e) = outcome {
            eprintln!("{} {}", "debug:".bright_red(), e);
        }
    }
}

fn render_event(event: &RuntimeEvent, source: &str) {
    let payload = &event.payload;
    let text = |key: &str| payload.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let line_of = || payload.get("line").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
    match event.kind {
        EventKind::ExecutionOutput if payload.get("logpoint").is_some() => {
            println!("{} {}", format!("[log {}]", line_of()).bright_cyan(), text("text"));
        }
        EventKind::ExecutionOutput => println!("{}", text("text")),
        EventKind::InputRequest => {
            print!("{}", text("prompt"));
            let _ = std::io::stdout().flush();
        }
        EventKind::SessionStart if payload.get("degraded").and_then(|v| v.as_bool()) == Some(true) => {
            eprintln!("{} source does not parse; debugging line by line", "warn:".yellow().bold());
        }
        EventKind::ExecutionPaused => {
            let line = line_of();
            let code = source.lines().nth(line.saturating_sub(1)).unwrap_or_default();
            eprintln!(
                "{} {} {}",
                format!("paused ({})", text("reason")).bright_blue().bold(),
                format!("{:>4} |", line).dimmed(),
                code.trim()
            );
        }
        EventKind::VariableUpdate => {
            for section in ["variables", "watches"] {
                if let Some(map) = payload.get(section).and_then(|v| v.as_object()) {
                    for (name, value) in map {
                        eprintln!("  {} = {}", name.bright_white(), value.to_string().dimmed());
                    }
                }
            }
        }
        _ => {}
    }
}
