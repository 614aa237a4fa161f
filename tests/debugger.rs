//! tests/debugger.rs
//! Breakpoints, stepping, watches and session lifecycle driven through the
//! engine the way a host would: one task executes, the test reacts to events.
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use susa::core::debugger::DebugState;
use susa::core::error::SessionError;
use susa::core::events::{EventKind, RuntimeEvent};
use susa::{Engine, ExecuteOptions, ExecutionResult};

const LOOP3: &str = "LOOP i = 0 FOR 3 TIMES:\n  PRINT i\nEND\n";

fn debug() -> ExecuteOptions {
    ExecuteOptions { debug_mode: true, ..ExecuteOptions::default() }
}

fn stepping() -> ExecuteOptions {
    ExecuteOptions { step_mode: true, ..ExecuteOptions::default() }
}

fn spawn(engine: &Engine, src: &str, options: ExecuteOptions) -> JoinHandle<ExecutionResult> {
    let engine = engine.clone();
    let src = src.to_string();
    tokio::spawn(async move { engine.execute(&src, options).await.expect("engine idle") })
}

async fn next_event(rx: &mut UnboundedReceiver<RuntimeEvent>) -> RuntimeEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within 5s")
        .expect("bus open")
}

/// Drive a run to completion, answering each pause with `on_pause` (given
/// the pause index). Returns the paused lines and the result.
async fn drive<F>(engine: &Engine, src: &str, options: ExecuteOptions, mut on_pause: F) -> (Vec<u64>, ExecutionResult)
where
    F: FnMut(usize, &Engine),
{
    let mut rx = engine.subscribe();
    let handle = spawn(engine, src, options);
    let mut lines = Vec::new();
    loop {
        let event = next_event(&mut rx).await;
        match event.kind {
            EventKind::ExecutionPaused => {
                lines.push(event.payload["line"].as_u64().unwrap());
                on_pause(lines.len() - 1, engine);
            }
            EventKind::ExecutionComplete => break,
            _ => {}
        }
    }
    (lines, handle.await.unwrap())
}

#[tokio::test]
async fn breakpoint_in_loop_pauses_once_per_visit_while_stepping() {
    let engine = Engine::default();
    engine.add_breakpoint(2, None, None).unwrap();
    let (lines, result) = drive(&engine, LOOP3, debug(), |_, e| e.step_over().unwrap()).await;

    assert_eq!(lines, vec![2, 2, 2]);
    assert!(result.success);
    assert_eq!(result.outputs, vec!["0", "1", "2"]);
    assert_eq!(engine.breakpoints()[0].hit_count, 3);
    assert_eq!(engine.debug_state(), DebugState::Idle);
    assert!(engine.session().is_none());
}

/// State reported by `debug.session_stop`, captured before the reset to idle.
fn ended_in(rx: &mut UnboundedReceiver<RuntimeEvent>) -> Option<serde_json::Value> {
    let mut state = None;
    while let Ok(event) = rx.try_recv() {
        if event.kind == EventKind::SessionStop {
            state = Some(event.payload["state"].clone());
        }
    }
    state
}

#[tokio::test]
async fn breakpoint_on_a_one_line_loop_binds_to_its_body() {
    let engine = Engine::default();
    engine.add_breakpoint(1, None, None).unwrap();
    let mut stops = engine.subscribe();
    let src = "LOOP i = 0 FOR 3 TIMES: PRINT i";
    let (lines, result) = drive(&engine, src, debug(), |_, e| e.step_over().unwrap()).await;

    assert_eq!(lines, vec![1, 1, 1]);
    assert_eq!(result.outputs, vec!["0", "1", "2"]);
    assert_eq!(engine.breakpoints()[0].hit_count, 3);
    assert_eq!(ended_in(&mut stops), Some(json!("completed")));
}

#[tokio::test]
async fn failed_debug_run_ends_errored() {
    let engine = Engine::default();
    let mut stops = engine.subscribe();
    let result = engine.execute("let a = 1\nPRINT a / 0", debug()).await.unwrap();
    assert!(!result.success);
    assert_eq!(ended_in(&mut stops), Some(json!("errored")));
    assert_eq!(engine.debug_state(), DebugState::Idle);
}

#[tokio::test]
async fn pause_events_arrive_in_order() {
    let engine = Engine::default();
    engine.add_breakpoint(2, None, None).unwrap();
    let mut rx = engine.subscribe();
    let handle = spawn(&engine, LOOP3, debug());

    let mut kinds = Vec::new();
    loop {
        let event = next_event(&mut rx).await;
        kinds.push(event.kind);
        match event.kind {
            EventKind::VariableUpdate => {
                assert_eq!(event.payload["variables"]["i"], json!(0));
                engine.remove_breakpoint(2).unwrap();
                engine.continue_().unwrap();
            }
            EventKind::ExecutionComplete => break,
            _ => {}
        }
    }
    handle.await.unwrap();

    let paused_at = kinds.iter().position(|k| *k == EventKind::BreakpointHit).unwrap();
    assert_eq!(
        &kinds[paused_at..paused_at + 4],
        &[
            EventKind::BreakpointHit,
            EventKind::ExecutionPaused,
            EventKind::VariableUpdate,
            EventKind::ExecutionContinued
        ]
    );
    assert_eq!(kinds[0], EventKind::SessionStart);
    assert_eq!(kinds.iter().filter(|k| **k == EventKind::ExecutionOutput).count(), 3);
    assert_eq!(kinds.last(), Some(&EventKind::ExecutionComplete));
}

#[tokio::test]
async fn step_mode_walks_every_statement() {
    let engine = Engine::default();
    let src = "let a = 1\nlet b = a + 1\nPRINT b";
    let (lines, result) = drive(&engine, src, stepping(), |i, e| {
        if i < 2 {
            e.step_over().unwrap()
        } else {
            e.continue_().unwrap()
        }
    })
    .await;
    assert_eq!(lines, vec![1, 2, 3]);
    assert_eq!(result.outputs, vec!["2"]);
}

const TWICE: &str = "\
FUNC twice(x):
  let y = x * 2
  RETURN y
END
let r = twice(4)
PRINT r
";

#[tokio::test]
async fn step_into_then_out_of_a_call() {
    let engine = Engine::default();
    let (lines, result) = drive(&engine, TWICE, stepping(), |i, e| match i {
        0 => e.step_over().unwrap(),
        1 => e.step_into().unwrap(),
        2 => e.step_out().unwrap(),
        _ => e.continue_().unwrap(),
    })
    .await;
    assert_eq!(lines, vec![1, 5, 2, 6]);
    assert_eq!(result.outputs, vec!["8"]);
}

#[tokio::test]
async fn step_over_skips_the_callee() {
    let engine = Engine::default();
    let (lines, _) = drive(&engine, TWICE, stepping(), |i, e| {
        if i < 2 {
            e.step_over().unwrap()
        } else {
            e.continue_().unwrap()
        }
    })
    .await;
    assert_eq!(lines, vec![1, 5, 6]);
}

#[tokio::test]
async fn conditional_breakpoint_counts_only_matching_hits() {
    let engine = Engine::default();
    engine.add_breakpoint(2, Some("i > 2"), None).unwrap();
    let src = "LOOP i = 0 FOR 5 TIMES:\n  PRINT i\nEND";
    let (lines, result) = drive(&engine, src, debug(), |_, e| e.continue_().unwrap()).await;
    assert_eq!(lines.len(), 2);
    assert!(result.success);
    assert_eq!(engine.breakpoints()[0].hit_count, 2);
}

#[tokio::test]
async fn failing_condition_is_treated_as_false() {
    let engine = Engine::default();
    engine.add_breakpoint(2, Some("nope > 1"), None).unwrap();
    let (lines, result) = drive(&engine, LOOP3, debug(), |_, e| e.continue_().unwrap()).await;
    assert!(lines.is_empty());
    assert!(result.success);
}

#[tokio::test]
async fn logpoints_emit_output_without_pausing() {
    let engine = Engine::default();
    engine.add_breakpoint(2, None, Some("i is {i}")).unwrap();
    let mut rx = engine.subscribe();
    let result = engine.execute(LOOP3, debug()).await.unwrap();
    assert!(result.success);
    assert_eq!(result.outputs, vec!["0", "1", "2"]);

    let mut logged = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_ne!(event.kind, EventKind::ExecutionPaused);
        if event.kind == EventKind::ExecutionOutput && event.payload["logpoint"] == json!(true) {
            logged.push(event.payload["text"].as_str().unwrap().to_string());
        }
    }
    assert_eq!(logged, vec!["i is 0", "i is 1", "i is 2"]);
    assert_eq!(engine.breakpoints()[0].hit_count, 3);
}

#[tokio::test]
async fn watches_are_rendered_on_pause() {
    let engine = Engine::default();
    engine.add_breakpoint(2, None, None).unwrap();
    engine.add_watch("i * 10").unwrap();
    engine.add_watch("nope + 1").unwrap();
    engine.add_watch("i * 10").unwrap();
    assert_eq!(engine.watches(), vec!["i * 10", "nope + 1"]);

    let mut rx = engine.subscribe();
    let handle = spawn(&engine, LOOP3, debug());
    let mut seen = Vec::new();
    loop {
        let event = next_event(&mut rx).await;
        match event.kind {
            EventKind::VariableUpdate => {
                seen.push(event.payload["watches"].clone());
                engine.continue_().unwrap();
            }
            EventKind::ExecutionComplete => break,
            _ => {}
        }
    }
    handle.await.unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[2]["i * 10"], json!(20));
    assert_eq!(seen[0]["nope + 1"], json!("<error: Undefined variable 'nope'>"));
}

#[tokio::test]
async fn toggled_breakpoint_is_skipped() {
    let engine = Engine::default();
    engine.add_breakpoint(2, None, None).unwrap();
    assert!(!engine.toggle_breakpoint(2).unwrap());
    let (lines, _) = drive(&engine, LOOP3, debug(), |_, e| e.continue_().unwrap()).await;
    assert!(lines.is_empty());
    assert!(engine.toggle_breakpoint(2).unwrap());
    assert_eq!(engine.breakpoints()[0].hit_count, 0);
}

#[tokio::test]
async fn stop_while_waiting_for_input_aborts_the_run() {
    let engine = Engine::default();
    let mut rx = engine.subscribe();
    let handle = spawn(&engine, "let a = INPUT(\"name? \")\nPRINT a", debug());
    loop {
        let event = next_event(&mut rx).await;
        if event.kind == EventKind::InputRequest {
            assert_eq!(event.payload["prompt"], json!("name? "));
            break;
        }
    }
    engine.stop().unwrap();
    let result = handle.await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error.unwrap().message, "Execution aborted");
    assert!(result.outputs.is_empty());
    assert_eq!(engine.pending_inputs(), 0);
    assert!(engine.session().is_none());
}

#[tokio::test]
async fn stop_while_paused_aborts_the_run() {
    let engine = Engine::default();
    engine.add_breakpoint(2, None, None).unwrap();
    let (lines, result) = drive(&engine, LOOP3, debug(), |_, e| {
        e.stop().unwrap();
    })
    .await;
    assert_eq!(lines, vec![2]);
    assert_eq!(result.error.unwrap().message, "Execution aborted");
    assert!(result.outputs.is_empty());
}

#[tokio::test]
async fn unparsable_source_debugs_line_by_line() {
    let engine = Engine::default();
    engine.add_breakpoint(3, None, None).unwrap();
    let src = "let a = 1\nPRINT a +\nPRINT 5";
    let mut rx = engine.subscribe();
    let handle = spawn(&engine, src, debug());
    let mut degraded = None;
    let mut paused = Vec::new();
    loop {
        let event = next_event(&mut rx).await;
        match event.kind {
            EventKind::SessionStart => degraded = event.payload["degraded"].as_bool(),
            EventKind::ExecutionPaused => {
                paused.push(event.payload["line"].as_u64().unwrap());
                engine.continue_().unwrap();
            }
            EventKind::ExecutionComplete => break,
            _ => {}
        }
    }
    let result = handle.await.unwrap();
    assert_eq!(degraded, Some(true));
    assert_eq!(paused, vec![3]);
    assert!(!result.success);
    assert_eq!(result.outputs, vec!["5"]);
    assert_eq!(result.variables["a"].to_string(), "1");
}

#[tokio::test]
async fn session_misuse_is_reported() {
    let engine = Engine::default();
    assert_eq!(engine.continue_(), Err(SessionError::NoActiveSession));
    assert_eq!(engine.stop().unwrap_err(), SessionError::NoActiveSession);
    assert_eq!(engine.remove_breakpoint(7).unwrap_err(), SessionError::NoBreakpoint(7));
    assert!(matches!(
        engine.add_breakpoint(3, Some("i >"), None),
        Err(SessionError::InvalidExpression { .. })
    ));
    assert!(engine.add_watch("(").is_err());

    let info = engine.start_session(LOOP3).unwrap();
    assert!(!info.degraded);
    assert_eq!(engine.start_session(LOOP3).unwrap_err(), SessionError::SessionActive);
    assert_eq!(engine.step_over(), Err(SessionError::NotRunning));
    engine.stop().unwrap();
}

#[tokio::test]
async fn breakpoints_are_verified_against_the_session() {
    let engine = Engine::default();
    engine.start_session(LOOP3).unwrap();
    assert!(engine.add_breakpoint(2, None, None).unwrap().verified);
    assert!(!engine.add_breakpoint(40, None, None).unwrap().verified);

    let again = engine.add_breakpoint(2, Some("i == 1"), None).unwrap();
    assert_eq!(again.id, engine.breakpoints()[0].id);
    assert_eq!(engine.breakpoints().len(), 2);
    engine.stop().unwrap();
}
