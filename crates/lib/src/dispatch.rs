//! Event dispatch: classify a raw event, call the backend, remember the continuity
//! token and post the reply back to the conversation.
//!
//! Each conversation gets its own worker task fed by an unbounded queue, so one
//! conversation never has two backend calls in flight and its replies go out in
//! arrival order, while different conversations proceed in parallel. The stream
//! reader only classifies and enqueues; it never waits on the backend.

use crate::backend::{Backend, BackendReply};
use crate::continuity::ContinuityStore;
use crate::transport::{self, ChatTransport, InboundMessage};
use crate::util::preview_ellipsis;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

const LOG_PREVIEW_CHARS: usize = 80;

/// A conversation worker with nothing queued for this long exits.
pub const WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// What a conversation worker needs to answer one message.
#[derive(Clone)]
struct Relay {
    backend: Arc<dyn Backend>,
    transport: Arc<dyn ChatTransport>,
    contexts: ContinuityStore,
}

impl Relay {
    async fn process(&self, msg: InboundMessage) {
        log::info!(
            "[{}] {}",
            msg.sender_name,
            preview_ellipsis(&msg.text, LOG_PREVIEW_CHARS)
        );

        let token = self.contexts.get(&msg.conversation_id).await;
        let BackendReply {
            text,
            continuity_token,
        } = self.backend.send(&msg.text, token.as_deref()).await;

        // No token in the reply keeps the previous one.
        if let Some(new_token) = continuity_token {
            log::debug!(
                "context saved for channel {}: {}",
                msg.conversation_id,
                new_token
            );
            self.contexts
                .set(msg.conversation_id.clone(), new_token)
                .await;
        }

        match self.transport.create_post(&msg.conversation_id, &text).await {
            Ok(()) => log::info!(
                "response sent: {}",
                preview_ellipsis(&text, LOG_PREVIEW_CHARS)
            ),
            Err(e) => log::warn!(
                "failed to send response to channel {}: {}",
                msg.conversation_id,
                e
            ),
        }
    }
}

/// One queue and one task per conversation, keyed by conversation id.
#[derive(Default)]
struct Workers {
    queues: HashMap<String, mpsc::UnboundedSender<InboundMessage>>,
    handles: HashMap<String, JoinHandle<()>>,
    closed: bool,
}

/// Routes inbound events to per-conversation workers.
pub struct EventDispatcher {
    relay: Relay,
    workers: Mutex<Workers>,
}

impl EventDispatcher {
    pub fn new(
        backend: Arc<dyn Backend>,
        transport: Arc<dyn ChatTransport>,
        contexts: ContinuityStore,
    ) -> Self {
        Self {
            relay: Relay {
                backend,
                transport,
                contexts,
            },
            workers: Mutex::new(Workers::default()),
        }
    }

    pub fn contexts(&self) -> &ContinuityStore {
        &self.relay.contexts
    }

    /// Handle one raw event frame. Non-actionable and malformed events are dropped here;
    /// actionable messages are queued for their conversation's worker.
    pub async fn handle(&self, raw: &str, self_id: &str) {
        let Some(msg) = transport::classify(raw, self_id) else {
            return;
        };
        self.enqueue(msg).await;
    }

    /// Queue an already-classified message behind earlier messages of the same conversation.
    pub async fn enqueue(&self, msg: InboundMessage) {
        let mut workers = self.workers.lock().await;
        if workers.closed {
            log::debug!(
                "dispatcher draining, dropping message for channel {}",
                msg.conversation_id
            );
            return;
        }

        // A send error means the worker went idle or died; start a new one in its place.
        let msg = match workers.queues.get(&msg.conversation_id) {
            Some(tx) => match tx.send(msg) {
                Ok(()) => return,
                Err(mpsc::error::SendError(msg)) => msg,
            },
            None => msg,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let conversation_id = msg.conversation_id.clone();
        if tx.send(msg).is_err() {
            return;
        }
        let relay = self.relay.clone();
        let handle = tokio::spawn(run_worker(relay, rx));
        workers.queues.insert(conversation_id.clone(), tx);
        workers.handles.insert(conversation_id, handle);
    }

    /// Conversations that currently have a live worker.
    pub async fn active_workers(&self) -> usize {
        let workers = self.workers.lock().await;
        workers.handles.values().filter(|h| !h.is_finished()).count()
    }

    /// Answer one message right away, bypassing the queues.
    pub async fn process(&self, msg: InboundMessage) {
        self.relay.process(msg).await;
    }

    /// Stop accepting messages and wait up to `grace` for queued replies to go out.
    /// Workers still running after that are aborted.
    pub async fn drain(&self, grace: Duration) {
        let handles = {
            let mut workers = self.workers.lock().await;
            workers.closed = true;
            workers.queues.clear();
            std::mem::take(&mut workers.handles)
                .into_values()
                .collect::<Vec<_>>()
        };
        if handles.is_empty() {
            return;
        }
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        match tokio::time::timeout(grace, join_all(handles)).await {
            Ok(_) => log::info!("dispatch workers finished"),
            Err(_) => {
                log::warn!(
                    "abandoning in-flight replies after {}s grace period",
                    grace.as_secs()
                );
                for a in aborts {
                    a.abort();
                }
            }
        }
    }
}

async fn run_worker(relay: Relay, mut rx: mpsc::UnboundedReceiver<InboundMessage>) {
    loop {
        match tokio::time::timeout(WORKER_IDLE_TIMEOUT, rx.recv()).await {
            Ok(Some(msg)) => relay.process(msg).await,
            Ok(None) => return,
            Err(_) => break,
        }
    }
    // Closing first makes later sends fail, so nothing queued after this point is lost.
    rx.close();
    while let Some(msg) = rx.recv().await {
        relay.process(msg).await;
    }
}
