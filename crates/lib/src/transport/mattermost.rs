//! Mattermost transport: REST v4 for identity, posting and logout; websocket for events.

use super::{ChatTransport, Connection, EventStream, TransportError};
use crate::config::MattermostConfig;
use async_trait::async_trait;
use futures_util::{stream, SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Ping cadence and how long the socket may stay silent (pongs included) before it is
/// treated as dead.
#[derive(Debug, Clone, Copy)]
struct Keepalive {
    ping_interval: Duration,
    idle_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    #[serde(default)]
    username: String,
}

/// Mattermost connector. Cheap to clone; the HTTP client is shared.
#[derive(Clone)]
pub struct MattermostTransport {
    api_base: String,
    ws_url: String,
    token: String,
    client: reqwest::Client,
    keepalive: Keepalive,
}

impl MattermostTransport {
    pub fn new(config: &MattermostConfig, token: impl Into<String>) -> Self {
        let host = config.url.trim().trim_end_matches('/');
        let scheme = config.scheme.trim().to_lowercase();
        let ws_scheme = if scheme == "https" { "wss" } else { "ws" };
        Self {
            api_base: format!("{}://{}:{}/api/v4", scheme, host, config.port),
            ws_url: format!("{}://{}:{}/api/v4/websocket", ws_scheme, host, config.port),
            token: token.into(),
            client: reqwest::Client::new(),
            keepalive: Keepalive {
                ping_interval: DEFAULT_PING_INTERVAL,
                idle_timeout: DEFAULT_IDLE_TIMEOUT,
            },
        }
    }

    /// Override the websocket ping interval and the silence allowed before the stream
    /// is ended with [`TransportError::Idle`].
    pub fn with_keepalive(mut self, ping_interval: Duration, idle_timeout: Duration) -> Self {
        self.keepalive = Keepalive {
            ping_interval,
            idle_timeout,
        };
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// GET /users/me: the account the token belongs to.
    async fn me(&self) -> Result<User, TransportError> {
        let url = format!("{}/users/me", self.api_base);
        let res = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!(
                "users/me failed: {} {}",
                status, body
            )));
        }
        Ok(res.json().await?)
    }

    /// Open the websocket and authenticate it with the same token.
    ///
    /// The stream pings the server while idle and ends with an error when nothing,
    /// not even a pong, arrives within the idle timeout.
    pub async fn open_stream(&self) -> Result<EventStream, TransportError> {
        let (mut ws, _) = tokio::time::timeout(
            REQUEST_TIMEOUT,
            tokio_tungstenite::connect_async(self.ws_url.as_str()),
        )
        .await
        .map_err(|_| TransportError::Api("websocket handshake timed out".to_string()))??;

        let challenge = serde_json::json!({
            "seq": 1,
            "action": "authentication_challenge",
            "data": { "token": self.token }
        });
        ws.send(Message::Text(challenge.to_string())).await?;

        Ok(event_frames(ws, self.keepalive))
    }
}

fn event_frames(ws: WsStream, keepalive: Keepalive) -> EventStream {
    let mut ticker = tokio::time::interval_at(
        Instant::now() + keepalive.ping_interval,
        keepalive.ping_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    stream::unfold(Some((ws, ticker)), move |state| async move {
        let Some((mut ws, mut ticker)) = state else {
            return None;
        };
        let idle = tokio::time::sleep(keepalive.idle_timeout);
        tokio::pin!(idle);
        loop {
            tokio::select! {
                _ = &mut idle => {
                    log::debug!("no websocket traffic for {:?}", keepalive.idle_timeout);
                    return Some((Err(TransportError::Idle(keepalive.idle_timeout)), None));
                }
                _ = ticker.tick() => {
                    if let Err(e) = ws.send(Message::Ping(Vec::new())).await {
                        return Some((Err(TransportError::from(e)), None));
                    }
                }
                msg = ws.next() => {
                    idle.as_mut().reset(Instant::now() + keepalive.idle_timeout);
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            return Some((Ok(text), Some((ws, ticker))));
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            let text = String::from_utf8_lossy(&bytes).into_owned();
                            return Some((Ok(text), Some((ws, ticker))));
                        }
                        Some(Ok(Message::Close(frame))) => {
                            log::info!("websocket closed by server: {:?}", frame);
                            return None;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Some((Err(TransportError::from(e)), None)),
                        None => return None,
                    }
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl ChatTransport for MattermostTransport {
    async fn connect(&self) -> Result<Connection, TransportError> {
        log::info!("connecting to mattermost at {}", self.api_base);
        let me = self.me().await?;
        log::info!("logged in as: {} ({})", me.username, me.id);
        let events = self.open_stream().await?;
        Ok(Connection {
            user_id: me.id,
            username: me.username,
            events,
        })
    }

    async fn create_post(&self, channel_id: &str, message: &str) -> Result<(), TransportError> {
        let url = format!("{}/posts", self.api_base);
        let body = serde_json::json!({ "channel_id": channel_id, "message": message });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!(
                "create post failed: {} {}",
                status, body
            )));
        }
        Ok(())
    }

    async fn logout(&self) -> Result<(), TransportError> {
        let url = format!("{}/users/logout", self.api_base);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            return Err(TransportError::Api(format!("logout failed: {}", status)));
        }
        Ok(())
    }
}
