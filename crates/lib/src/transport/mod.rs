//! Chat transport: event stream in, posts out.
//!
//! `ChatTransport` is the seam the supervisor and dispatcher talk to; the Mattermost
//! implementation speaks the REST v4 API plus the websocket event stream.

mod event;
mod mattermost;

pub use event::{classify, parse_event, EventError, InboundMessage, POSTED_EVENT};
pub use mattermost::{MattermostTransport, DEFAULT_IDLE_TIMEOUT, DEFAULT_PING_INTERVAL};

use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Raw event frames from an open session. The stream ends when the connection closes.
pub type EventStream = BoxStream<'static, Result<String, TransportError>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("transport api error: {0}")]
    Api(String),
    #[error("no websocket traffic for {0:?}, connection presumed dead")]
    Idle(std::time::Duration),
}

/// An established session: who the bridge is logged in as, and its event stream.
pub struct Connection {
    pub user_id: String,
    pub username: String,
    pub events: EventStream,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Authenticate, resolve the bridge's own identity and open the event stream.
    async fn connect(&self) -> Result<Connection, TransportError>;

    /// Post a message to a channel.
    async fn create_post(&self, channel_id: &str, message: &str) -> Result<(), TransportError>;

    /// End the session. Best effort; called once on shutdown.
    async fn logout(&self) -> Result<(), TransportError>;
}
