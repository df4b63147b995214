//! Message Router: classifies inbound launcher messages and dispatches them.
//!
//! Every message arriving over IPC is classified in order:
//!
//! 1. Does it match a pending command's `request_seq`? Complete that
//!    command's waiter and stop.
//! 2. Does it match an event someone is explicitly waiting for (e.g. launch
//!    waiting on the first `stopped`/`initialized` event)? Complete that
//!    waiter and stop.
//! 3. Otherwise, look it up in the general event-handler table and invoke
//!    every handler registered for that event name.
//!
//! A message satisfies at most one of these — a one-shot waiter always wins
//! over the general table, so a caller awaiting a specific event doesn't
//! also see it re-delivered through the persistent handler.

use crate::protocol::{Event, Response};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Routes responses by `request_seq` and events by name.
#[derive(Default)]
pub struct Router {
    pending_responses: Mutex<HashMap<i64, oneshot::Sender<Response>>>,
    event_waiters: Mutex<HashMap<String, Vec<oneshot::Sender<Event>>>>,
    event_handlers: Mutex<HashMap<String, Vec<EventHandler>>>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for the response to `request_seq`. Returns a
    /// receiver that resolves exactly once, when [`Self::route_response`]
    /// sees a matching `request_seq`.
    pub async fn await_response(&self, request_seq: i64) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        self.pending_responses.lock().await.insert(request_seq, tx);
        rx
    }

    /// Registers a one-shot waiter for the next event named `event_name`.
    pub async fn await_event(&self, event_name: &str) -> oneshot::Receiver<Event> {
        let (tx, rx) = oneshot::channel();
        self.event_waiters.lock().await.entry(event_name.to_string()).or_default().push(tx);
        rx
    }

    /// Registers a persistent handler invoked for every future occurrence of
    /// `event_name` that isn't claimed by a one-shot waiter first.
    pub async fn on_event<F>(&self, event_name: &str, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.event_handlers
            .lock()
            .await
            .entry(event_name.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Step 1: attempts to complete a pending command waiter. Returns `true`
    /// if `response` was claimed.
    pub async fn route_response(&self, response: Response) -> bool {
        let mut pending = self.pending_responses.lock().await;
        if let Some(tx) = pending.remove(&response.request_seq) {
            let _ = tx.send(response);
            true
        } else {
            false
        }
    }

    /// Steps 2 and 3: routes an event to a waiting one-shot first, else to
    /// every registered persistent handler for that event name.
    pub async fn route_event(&self, event: Event) {
        let waiter = {
            let mut waiters = self.event_waiters.lock().await;
            waiters.get_mut(&event.event).and_then(|list| if list.is_empty() { None } else { Some(list.remove(0)) })
        };

        if let Some(tx) = waiter {
            let _ = tx.send(event);
            return;
        }

        let handlers = {
            let table = self.event_handlers.lock().await;
            table.get(&event.event).cloned().unwrap_or_default()
        };
        for handler in handlers {
            handler(&event);
        }
    }

    /// Drops a single pending response waiter, e.g. after a send failure so
    /// the entry doesn't linger in the table until the whole router clears.
    pub async fn cancel_response(&self, request_seq: i64) {
        self.pending_responses.lock().await.remove(&request_seq);
    }

    /// Drops every pending waiter, e.g. on session teardown, so callers
    /// awaiting a response or event get a dropped-sender error instead of
    /// hanging forever.
    pub async fn clear(&self) {
        self.pending_responses.lock().await.clear();
        self.event_waiters.lock().await.clear();
    }
}
