//! tests/input_events.rs
//! Input coordination and the event stream seen by a host.
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use susa::core::diagnostics::ErrorKind;
use susa::core::error::{InputError, SessionError};
use susa::core::events::{EventBus, EventKind};
use susa::core::input::Validator;
use susa::{Engine, EngineConfig, ExecuteOptions};

async fn wait_for(rx: &mut tokio::sync::mpsc::UnboundedReceiver<susa::core::events::RuntimeEvent>, kind: EventKind) {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        if event.kind == kind {
            return;
        }
    }
}

#[tokio::test]
async fn requests_resolve_in_request_order() {
    let engine = Engine::default();
    let mut rx = engine.subscribe();
    let mut handles = Vec::new();
    for prompt in ["first", "second", "third"] {
        let e = engine.clone();
        handles.push(tokio::spawn(async move { e.request_input(prompt, None, None).await }));
        wait_for(&mut rx, EventKind::InputRequest).await;
    }
    assert_eq!(engine.pending_inputs(), 3);
    for text in ["a", "b", "c"] {
        engine.submit_input(text).unwrap();
    }
    let mut answers = Vec::new();
    for handle in handles {
        answers.push(handle.await.unwrap().unwrap());
    }
    assert_eq!(answers, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn rejected_input_keeps_the_request_open() {
    let engine = Engine::default();
    let mut rx = engine.subscribe();
    let digits: Validator = Arc::new(|text: &str| {
        if text.chars().all(|c| c.is_ascii_digit()) {
            Ok(())
        } else {
            Err("digits only".to_string())
        }
    });
    let e = engine.clone();
    let handle = tokio::spawn(async move { e.request_input("age? ", None, Some(digits)).await });
    wait_for(&mut rx, EventKind::InputRequest).await;

    assert_eq!(engine.submit_input("x1"), Err(InputError::Rejected("digits only".into())));
    assert_eq!(engine.pending_inputs(), 1);
    let rejection = engine.history().into_iter().rev().find(|e| e.kind == EventKind::ExecutionError).unwrap();
    assert_eq!(rejection.payload["kind"], json!("input"));

    engine.submit_input("42").unwrap();
    assert_eq!(handle.await.unwrap(), Ok("42".to_string()));
    assert_eq!(engine.pending_inputs(), 0);
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out() {
    let engine = Engine::default();
    let answer = engine.request_input("quick? ", Some(Duration::from_millis(20)), None).await;
    assert_eq!(answer, Err(InputError::TimedOut(20)));
    assert_eq!(engine.pending_inputs(), 0);
}

#[tokio::test]
async fn submit_without_request_fails() {
    let engine = Engine::default();
    assert_eq!(engine.submit_input("hello"), Err(InputError::NoPendingRequest));
}

#[tokio::test]
async fn program_input_round_trip_and_single_execution() {
    let engine = Engine::default();
    let mut rx = engine.subscribe();
    let e = engine.clone();
    let src = "let name = INPUT(\"who? \")\nPRINT \"hi \" + name";
    let handle = tokio::spawn(async move { e.execute(src, ExecuteOptions::default()).await });
    wait_for(&mut rx, EventKind::InputRequest).await;

    assert!(engine.is_running());
    let second = engine.execute("PRINT 1", ExecuteOptions::default()).await;
    assert_eq!(second.unwrap_err(), SessionError::AlreadyRunning);

    engine.submit_input("Ada").unwrap();
    let result = handle.await.unwrap().unwrap();
    assert!(result.success);
    assert_eq!(result.outputs, vec!["hi Ada"]);
    assert!(!engine.is_running());
}

#[tokio::test]
async fn abort_releases_a_waiting_program() {
    let engine = Engine::default();
    let mut rx = engine.subscribe();
    let e = engine.clone();
    let handle = tokio::spawn(async move { e.execute("PRINT INPUT()", ExecuteOptions::default()).await });
    wait_for(&mut rx, EventKind::InputRequest).await;

    assert!(engine.abort());
    let result = handle.await.unwrap().unwrap();
    assert!(!result.success);
    assert_eq!(result.error.unwrap().message, "Execution aborted");
    assert!(!engine.abort());
}

#[tokio::test]
async fn stop_without_a_session_leaves_a_plain_run_alone() {
    let engine = Engine::default();
    let mut rx = engine.subscribe();
    let e = engine.clone();
    let handle = tokio::spawn(async move { e.execute("PRINT INPUT()", ExecuteOptions::default()).await });
    wait_for(&mut rx, EventKind::InputRequest).await;

    assert_eq!(engine.stop().unwrap_err(), SessionError::NoActiveSession);
    assert_eq!(engine.pending_inputs(), 1);
    engine.submit_input("still here").unwrap();
    let result = handle.await.unwrap().unwrap();
    assert!(result.success);
    assert_eq!(result.outputs, vec!["still here"]);
}

#[tokio::test(start_paused = true)]
async fn configured_input_timeout_fails_the_run() {
    let config = EngineConfig { input_timeout_ms: Some(30), ..EngineConfig::default() };
    let result = Engine::new(config).execute("let a = INPUT()", ExecuteOptions::default()).await.unwrap();
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Input);
    assert_eq!(error.message, "input request timed out after 30ms");
}

#[tokio::test]
async fn every_execution_ends_with_one_complete_event() {
    let engine = Engine::default();
    engine.execute("PRINT 1\nPRINT 2", ExecuteOptions::default()).await.unwrap();
    engine.execute("PRINT 1 / 0", ExecuteOptions::default()).await.unwrap();
    engine.execute("PRINT (", ExecuteOptions::default()).await.unwrap();

    let kinds: Vec<EventKind> = engine.history().iter().map(|e| e.kind).collect();
    let starts = kinds.iter().filter(|k| **k == EventKind::ExecutionStart).count();
    let completes = kinds.iter().filter(|k| **k == EventKind::ExecutionComplete).count();
    assert_eq!((starts, completes), (3, 3));
    assert_eq!(kinds.iter().filter(|k| **k == EventKind::ExecutionError).count(), 2);
    assert_eq!(kinds.last(), Some(&EventKind::ExecutionComplete));

    let complete = engine.history().into_iter().last().unwrap();
    assert_eq!(complete.payload["success"], json!(false));
    let wire = serde_json::to_value(&complete).unwrap();
    assert_eq!(wire["kind"], json!("execution.complete"));
}

#[tokio::test]
async fn bus_history_is_bounded_and_ids_increase() {
    let bus = EventBus::new(3);
    for n in 0..5 {
        bus.publish(EventKind::ExecutionOutput, json!({ "text": n.to_string() }));
    }
    let history = bus.history();
    assert_eq!(history.len(), 3);
    assert!(history.windows(2).all(|w| w[0].id < w[1].id));
    assert_eq!(history[0].payload["text"], json!("2"));
}

#[tokio::test]
async fn dropped_subscribers_are_pruned() {
    let bus = EventBus::new(8);
    let mut kept = bus.subscribe();
    drop(bus.subscribe());
    assert_eq!(bus.subscriber_count(), 2);
    bus.publish(EventKind::ExecutionStart, json!({}));
    assert_eq!(bus.subscriber_count(), 1);
    assert_eq!(kept.recv().await.unwrap().kind, EventKind::ExecutionStart);
}
