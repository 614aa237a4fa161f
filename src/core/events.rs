// src/core/events.rs
//! Event bus: a closed set of named runtime events delivered to subscribers
//! in subscription order, with a bounded history for diagnostics.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    #[serde(rename = "execution.start")]
    ExecutionStart,
    #[serde(rename = "execution.output")]
    ExecutionOutput,
    #[serde(rename = "execution.error")]
    ExecutionError,
    #[serde(rename = "execution.complete")]
    ExecutionComplete,
    #[serde(rename = "execution.input_request")]
    InputRequest,
    #[serde(rename = "execution.input_response")]
    InputResponse,
    #[serde(rename = "debug.breakpoint_hit")]
    BreakpointHit,
    #[serde(rename = "debug.step_complete")]
    StepComplete,
    #[serde(rename = "debug.variable_update")]
    VariableUpdate,
    #[serde(rename = "debug.session_start")]
    SessionStart,
    #[serde(rename = "debug.session_stop")]
    SessionStop,
    #[serde(rename = "debug.execution_paused")]
    ExecutionPaused,
    #[serde(rename = "debug.execution_continued")]
    ExecutionContinued,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::ExecutionStart => "execution.start",
            EventKind::ExecutionOutput => "execution.output",
            EventKind::ExecutionError => "execution.error",
            EventKind::ExecutionComplete => "execution.complete",
            EventKind::InputRequest => "execution.input_request",
            EventKind::InputResponse => "execution.input_response",
            EventKind::BreakpointHit => "debug.breakpoint_hit",
            EventKind::StepComplete => "debug.step_complete",
            EventKind::VariableUpdate => "debug.variable_update",
            EventKind::SessionStart => "debug.session_start",
            EventKind::SessionStop => "debug.session_stop",
            EventKind::ExecutionPaused => "debug.execution_paused",
            EventKind::ExecutionContinued => "debug.execution_continued",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeEvent {
    pub id: u64,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

struct BusState {
    next_id: u64,
    subscribers: Vec<mpsc::UnboundedSender<RuntimeEvent>>,
    history: VecDeque<RuntimeEvent>,
    capacity: usize,
}

/// Cheap to clone; clones share subscribers and history.
#[derive(Clone)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventBus")
            .field("subscribers", &state.subscribers.len())
            .field("history", &state.history.len())
            .finish()
    }
}

impl EventBus {
    pub fn new(history: usize) -> Self {
        let state = BusState { next_id: 1, subscribers: Vec::new(), history: VecDeque::new(), capacity: history };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// New subscriber; sees every event published from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RuntimeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().subscribers.push(tx);
        rx
    }

    pub fn publish(&self, kind: EventKind, payload: serde_json::Value) -> RuntimeEvent {
        let mut state = self.state.lock();
        let event = RuntimeEvent { id: state.next_id, kind, payload, timestamp: Utc::now() };
        state.next_id += 1;
        tracing::trace!(event = %kind, id = event.id, "publish");

        // Dropped receivers are pruned on the way.
        state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());

        if state.capacity > 0 {
            while state.history.len() >= state.capacity {
                state.history.pop_front();
            }
            state.history.push_back(event.clone());
        }
        event
    }

    /// The most recent events, oldest first.
    pub fn history(&self) -> Vec<RuntimeEvent> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kinds_serialize_as_dotted_names() {
        let s = serde_json::to_string(&EventKind::InputRequest).unwrap();
        assert_eq!(s, "\"execution.input_request\"");
        assert_eq!(EventKind::SessionStop.to_string(), "debug.session_stop");
    }

    #[test]
    fn history_is_bounded() {
        let bus = EventBus::new(2);
        for i in 0..5 {
            bus.publish(EventKind::ExecutionOutput, json!({ "text": i.to_string() }));
        }
        let ids: Vec<u64> = bus.history().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[tokio::test]
    async fn closed_subscribers_are_pruned() {
        let bus = EventBus::new(4);
        let rx = bus.subscribe();
        let mut live = bus.subscribe();
        drop(rx);
        bus.publish(EventKind::ExecutionStart, json!({}));
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(live.recv().await.map(|e| e.kind), Some(EventKind::ExecutionStart));
    }
}
