//! Connection supervisor: keeps the event stream alive until shutdown.
//!
//! Disconnected -> Connecting -> Connected -> Disconnected, with an exponential
//! backoff wait before every reconnect. Shutdown is cooperative: the cancellation
//! token is observed during the handshake, while streaming and during the backoff
//! wait, so none of them has to run to completion first.

use crate::backoff::ReconnectState;
use crate::dispatch::EventDispatcher;
use crate::transport::{ChatTransport, Connection};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const DEFAULT_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Connecting,
    Connected,
    Shutdown,
}

#[derive(Debug, PartialEq, Eq)]
enum StreamEnd {
    Interrupted,
    Shutdown,
}

pub struct ConnectionSupervisor {
    transport: Arc<dyn ChatTransport>,
    dispatcher: Arc<EventDispatcher>,
    reconnect: ReconnectState,
    shutdown: CancellationToken,
    grace: Duration,
    state: watch::Sender<SupervisorState>,
}

impl ConnectionSupervisor {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        dispatcher: Arc<EventDispatcher>,
        reconnect: ReconnectState,
        shutdown: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(SupervisorState::Disconnected);
        Self {
            transport,
            dispatcher,
            reconnect,
            shutdown,
            grace: DEFAULT_GRACE,
            state,
        }
    }

    /// Upper bound for each shutdown step (draining replies, logout).
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Watch state transitions (for health checks and tests).
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Run until the shutdown token is cancelled. Connection failures never end the loop.
    pub async fn run(mut self) {
        let mut logged_in = false;
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            self.set_state(SupervisorState::Connecting);
            let connected = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                r = self.transport.connect() => r,
            };
            match connected {
                Ok(conn) => {
                    logged_in = true;
                    self.reconnect.reset();
                    self.set_state(SupervisorState::Connected);
                    log::info!("listening for messages as {}", conn.username);
                    if self.stream(conn).await == StreamEnd::Shutdown {
                        break;
                    }
                }
                Err(e) => log::error!("connection error: {}", e),
            }

            self.set_state(SupervisorState::Disconnected);
            if self.shutdown.is_cancelled() {
                break;
            }
            let delay = self.reconnect.next_delay();
            log::info!("reconnecting in {} seconds...", delay.as_secs());
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.shut_down(logged_in).await;
    }

    /// Feed every frame to the dispatcher until the stream ends, errors, or shutdown.
    async fn stream(&self, mut conn: Connection) -> StreamEnd {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return StreamEnd::Shutdown,
                next = conn.events.next() => match next {
                    Some(Ok(raw)) => self.dispatcher.handle(&raw, &conn.user_id).await,
                    Some(Err(e)) => {
                        log::warn!("event stream interrupted: {}", e);
                        return StreamEnd::Interrupted;
                    }
                    None => {
                        log::warn!("event stream closed");
                        return StreamEnd::Interrupted;
                    }
                },
            }
        }
    }

    async fn shut_down(&self, logged_in: bool) {
        log::info!("shutdown requested, no further connection attempts");
        self.dispatcher.drain(self.grace).await;
        if logged_in {
            match tokio::time::timeout(self.grace, self.transport.logout()).await {
                Ok(Ok(())) => log::info!("logged out"),
                Ok(Err(e)) => log::debug!("logout on shutdown: {}", e),
                Err(_) => log::debug!("logout on shutdown timed out"),
            }
        }
        self.set_state(SupervisorState::Shutdown);
        log::info!("bridge shutdown complete");
    }

    fn set_state(&self, state: SupervisorState) {
        log::debug!("supervisor state: {:?}", state);
        self.state.send_replace(state);
    }
}

/// Resolves on SIGINT or SIGTERM (Ctrl+C only on non-unix).
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}
