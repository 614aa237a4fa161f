// src/core/input.rs
//! Input coordinator: pending input requests served strictly FIFO. Only the
//! oldest request can be answered; a rejected answer leaves it at the head.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::oneshot;

use crate::core::error::InputError;
use crate::core::events::{EventBus, EventKind};

pub type Validator = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

struct PendingInput {
    id: u64,
    prompt: String,
    validator: Option<Validator>,
    responder: oneshot::Sender<Result<String, InputError>>,
}

#[derive(Default)]
struct InputQueue {
    next_id: u64,
    pending: VecDeque<PendingInput>,
}

#[derive(Clone)]
pub struct InputCoordinator {
    queue: Arc<Mutex<InputQueue>>,
    bus: EventBus,
}

impl fmt::Debug for InputCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputCoordinator").field("pending", &self.pending()).finish()
    }
}

impl InputCoordinator {
    pub fn new(bus: EventBus) -> Self {
        Self { queue: Arc::new(Mutex::new(InputQueue::default())), bus }
    }

    /// Queue a request and wait for its answer. Resolved exactly once: by a
    /// submission, by `timeout`, or by cancellation.
    pub async fn request(
        &self,
        prompt: &str,
        timeout: Option<Duration>,
        validator: Option<Validator>,
    ) -> Result<String, InputError> {
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut queue = self.queue.lock();
            queue.next_id += 1;
            let id = queue.next_id;
            queue.pending.push_back(PendingInput { id, prompt: prompt.to_string(), validator, responder: tx });
            id
        };
        self.bus.publish(EventKind::InputRequest, json!({ "request_id": id, "prompt": prompt }));

        let answer = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(answer) => answer,
                Err(_) => {
                    self.queue.lock().pending.retain(|p| p.id != id);
                    tracing::debug!(request_id = id, "input request timed out");
                    return Err(InputError::TimedOut(limit.as_millis() as u64));
                }
            },
            None => rx.await,
        };
        answer.unwrap_or(Err(InputError::Cancelled))
    }

    /// Answer the oldest pending request.
    pub fn submit(&self, text: &str) -> Result<(), InputError> {
        let mut queue = self.queue.lock();
        let (id, verdict) = {
            let head = queue.pending.front().ok_or(InputError::NoPendingRequest)?;
            (head.id, head.validator.as_ref().map(|validate| validate(text)).unwrap_or(Ok(())))
        };
        if let Err(reason) = verdict {
            drop(queue);
            self.bus.publish(
                EventKind::ExecutionError,
                json!({ "kind": "input", "request_id": id, "message": reason }),
            );
            return Err(InputError::Rejected(reason));
        }
        let Some(request) = queue.pending.pop_front() else {
            return Err(InputError::NoPendingRequest);
        };
        drop(queue);
        // A waiter that already gave up is not an error for the submitter.
        let _ = request.responder.send(Ok(text.to_string()));
        self.bus.publish(EventKind::InputResponse, json!({ "request_id": id, "text": text }));
        Ok(())
    }

    /// Fail every outstanding request with `Cancelled`.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<PendingInput> = self.queue.lock().pending.drain(..).collect();
        let count = drained.len();
        for request in drained {
            let _ = request.responder.send(Err(InputError::Cancelled));
        }
        if count > 0 {
            tracing::debug!(count, "cancelled pending input requests");
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().pending.len()
    }

    /// Prompt of the oldest pending request.
    pub fn head_prompt(&self) -> Option<String> {
        self.queue.lock().pending.front().map(|p| p.prompt.clone())
    }
}
