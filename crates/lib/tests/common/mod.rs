//! Test doubles for the transport and backend seams.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge::backend::{Backend, BackendError, BackendReply};
use bridge::transport::{ChatTransport, Connection, EventStream, TransportError};
use futures_util::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const BOT_ID: &str = "U1";

/// A `posted` frame as the chat server sends it.
pub fn posted(message: &str, channel: &str, user: &str) -> String {
    let post = serde_json::json!({
        "message": message,
        "channel_id": channel,
        "user_id": user,
    })
    .to_string();
    serde_json::json!({
        "event": "posted",
        "data": { "post": post, "sender_name": "alice" }
    })
    .to_string()
}

/// What the next `connect()` call does.
pub enum ConnectScript {
    /// Handshake fails.
    Fail,
    /// Handshake succeeds; the stream yields these frames and then closes.
    Events(Vec<String>),
    /// Handshake succeeds; the stream yields these frames and then an error.
    EventsThenError(Vec<String>),
    /// Handshake never completes.
    Hang,
}

pub struct MockTransport {
    script: Mutex<VecDeque<ConnectScript>>,
    connect_times: Mutex<Vec<Instant>>,
    posts: Mutex<Vec<(String, String)>>,
    logouts: AtomicUsize,
    fail_posts: AtomicBool,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl MockTransport {
    /// Connect attempts beyond the script fail.
    pub fn new(script: Vec<ConnectScript>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            connect_times: Mutex::new(Vec::new()),
            posts: Mutex::new(Vec::new()),
            logouts: AtomicUsize::new(0),
            fail_posts: AtomicBool::new(false),
            cancel_after: Mutex::new(None),
        }
    }

    pub fn failing_posts(self) -> Self {
        self.fail_posts.store(true, Ordering::SeqCst);
        self
    }

    /// Cancel `token` during the `n`th connect attempt.
    pub fn cancel_on_attempt(self, n: usize, token: CancellationToken) -> Self {
        *self.cancel_after.lock().unwrap() = Some((n, token));
        self
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.connect_times.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connect_times.lock().unwrap().len()
    }

    /// Seconds between consecutive connect attempts.
    pub fn connect_gaps_secs(&self) -> Vec<u64> {
        self.connect_times()
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect()
    }

    pub fn posts(&self) -> Vec<(String, String)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn connect(&self) -> Result<Connection, TransportError> {
        let attempt = {
            let mut times = self.connect_times.lock().unwrap();
            times.push(Instant::now());
            times.len()
        };
        if let Some((n, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if attempt == *n {
                token.cancel();
            }
        }
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ConnectScript::Fail);
        let events: EventStream = match next {
            ConnectScript::Fail => {
                return Err(TransportError::Api("connection refused".to_string()))
            }
            ConnectScript::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            ConnectScript::Events(frames) => stream::iter(frames.into_iter().map(Ok)).boxed(),
            ConnectScript::EventsThenError(frames) => stream::iter(
                frames
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(TransportError::Api(
                        "socket reset".to_string(),
                    )))),
            )
            .boxed(),
        };
        Ok(Connection {
            user_id: BOT_ID.to_string(),
            username: "bridge-bot".to_string(),
            events,
        })
    }

    async fn create_post(&self, channel_id: &str, message: &str) -> Result<(), TransportError> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(TransportError::Api("create post failed: 500".to_string()));
        }
        self.posts
            .lock()
            .unwrap()
            .push((channel_id.to_string(), message.to_string()));
        Ok(())
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Backend that answers from a queue of scripted results (default: echo with no token),
/// optionally sleeping first, and records every call.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<BackendReply, BackendError>>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
    delays: Mutex<Vec<(String, Duration)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            delays: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn reply(self, text: &str, token: Option<&str>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(BackendReply {
            text: text.to_string(),
            continuity_token: token.map(str::to_string),
        }));
        self
    }

    pub fn fail(self, err: BackendError) -> Self {
        self.replies.lock().unwrap().push_back(Err(err));
        self
    }

    /// Sleep for `delay` whenever the message text is `text`.
    pub fn delay_on(self, text: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().push((text.to_string(), delay));
        self
    }

    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn call(
        &self,
        text: &str,
        continuity_token: Option<&str>,
    ) -> Result<BackendReply, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), continuity_token.map(str::to_string)));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .lock()
            .unwrap()
            .iter()
            .find(|(t, _)| t == text)
            .map(|(_, d)| *d);
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(BackendReply {
                text: format!("re: {}", text),
                continuity_token: None,
            })
        })
    }
}
