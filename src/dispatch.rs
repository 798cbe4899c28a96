//! Per-submitter workers.
//!
//! Every submitter gets a tokio task that feeds its events to the
//! [`IntakeManager`] one at a time, in arrival order. Submitters never wait
//! on each other. A worker that sees no events for the idle timeout closes
//! its queue, drains what is already in it, and exits; the next event for
//! that submitter spawns a new one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;

use crate::channels::{ChatId, EventStream, IncomingEvent};
use crate::intake::IntakeManager;

/// Routes events to per-submitter workers.
pub struct Dispatcher {
    manager: Arc<IntakeManager>,
    idle_timeout: Duration,
    workers: HashMap<ChatId, mpsc::UnboundedSender<IncomingEvent>>,
}

impl Dispatcher {
    pub fn new(manager: Arc<IntakeManager>, idle_timeout: Duration) -> Self {
        Self {
            manager,
            idle_timeout,
            workers: HashMap::new(),
        }
    }

    /// Consume events until the stream ends.
    pub async fn run(mut self, mut events: EventStream) {
        while let Some(event) = events.next().await {
            self.dispatch(event);
        }
        tracing::info!("Event stream ended");
    }

    /// Queue one event on its submitter's worker.
    pub fn dispatch(&mut self, event: IncomingEvent) {
        self.workers.retain(|_, tx| !tx.is_closed());

        let chat_id = event.submitter.chat_id.clone();
        let event = match self.workers.get(&chat_id) {
            Some(tx) => match tx.send(event) {
                Ok(()) => return,
                // Worker exited between the retain and the send.
                Err(SendError(event)) => event,
            },
            None => event,
        };

        let tx = self.spawn_worker(chat_id.clone());
        if tx.send(event).is_err() {
            tracing::error!(submitter = %chat_id, "Fresh worker rejected its first event");
            return;
        }
        self.workers.insert(chat_id, tx);
    }

    /// Number of live workers.
    pub fn active_workers(&self) -> usize {
        self.workers.values().filter(|tx| !tx.is_closed()).count()
    }

    fn spawn_worker(&self, chat_id: ChatId) -> mpsc::UnboundedSender<IncomingEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel::<IncomingEvent>();
        let manager = Arc::clone(&self.manager);
        let idle_timeout = self.idle_timeout;

        tokio::spawn(async move {
            tracing::debug!(submitter = %chat_id, "Worker started");
            loop {
                match tokio::time::timeout(idle_timeout, rx.recv()).await {
                    Ok(Some(event)) => {
                        let label = event.event.label();
                        let outcome = manager.handle(event).await;
                        tracing::debug!(submitter = %chat_id, event = label, ?outcome, "Event handled");
                    }
                    Ok(None) => break,
                    Err(_) => {
                        rx.close();
                        while let Some(event) = rx.recv().await {
                            manager.handle(event).await;
                        }
                        break;
                    }
                }
            }
            tracing::debug!(submitter = %chat_id, "Worker exited");
        });

        tx
    }
}
