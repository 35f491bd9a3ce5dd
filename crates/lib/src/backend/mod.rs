//! Conversational backend abstraction and the Agent Zero HTTP client.
//!
//! `Backend::call` surfaces a closed set of failures; `Backend::send` maps each of
//! them to a reply a chat participant can read, so callers always get text back.

mod agent_zero;

pub use agent_zero::{AgentZeroClient, DEFAULT_TIMEOUT};

use async_trait::async_trait;

/// Reply text shown when the backend does not answer within the timeout.
pub const TIMEOUT_REPLY: &str = "Request timed out. Please try again.";
/// Reply text shown when the backend cannot be reached.
pub const UNREACHABLE_REPLY: &str = "Cannot connect to AI service. Please check if it's running.";
/// Reply text used when a successful response carries no `response` field.
pub const EMPTY_RESPONSE_REPLY: &str = "No response";

/// Backend answer: reply text and the continuity token to use next time, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
    pub text: String,
    pub continuity_token: Option<String>,
}

impl BackendReply {
    /// Reply for a failed call. Never carries a continuity token.
    pub fn from_error(err: &BackendError) -> Self {
        Self {
            text: err.reply_text(),
            continuity_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend request timed out")]
    Timeout,
    #[error("cannot connect to backend: {0}")]
    Unreachable(String),
    #[error("backend returned status {0}")]
    Status(u16),
    #[error("backend call failed: {0}")]
    Other(String),
}

impl BackendError {
    /// User-facing reply for this failure.
    pub fn reply_text(&self) -> String {
        match self {
            BackendError::Timeout => TIMEOUT_REPLY.to_string(),
            BackendError::Unreachable(_) => UNREACHABLE_REPLY.to_string(),
            BackendError::Status(code) => format!("Error from AI service: {}", code),
            BackendError::Other(detail) => format!("Error: {}", detail),
        }
    }
}

/// Request/response conversational backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// One call with the message text and the conversation's continuity token, if any.
    async fn call(
        &self,
        text: &str,
        continuity_token: Option<&str>,
    ) -> Result<BackendReply, BackendError>;

    /// Like `call`, but failures become a displayable reply with no token.
    async fn send(&self, text: &str, continuity_token: Option<&str>) -> BackendReply {
        match self.call(text, continuity_token).await {
            Ok(reply) => reply,
            Err(e) => {
                log::error!("backend: {}", e);
                BackendReply::from_error(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing(BackendError);

    #[async_trait]
    impl Backend for Failing {
        async fn call(&self, _: &str, _: Option<&str>) -> Result<BackendReply, BackendError> {
            Err(self.0.clone())
        }
    }

    #[test]
    fn each_error_kind_has_a_fixed_reply() {
        assert_eq!(BackendError::Timeout.reply_text(), TIMEOUT_REPLY);
        assert_eq!(
            BackendError::Unreachable("refused".into()).reply_text(),
            UNREACHABLE_REPLY
        );
        assert_eq!(
            BackendError::Status(502).reply_text(),
            "Error from AI service: 502"
        );
        assert_eq!(
            BackendError::Other("bad json".into()).reply_text(),
            "Error: bad json"
        );
    }

    #[tokio::test]
    async fn send_never_fails_and_drops_token() {
        let backend = Failing(BackendError::Status(500));
        let reply = backend.send("hello", Some("ctx-1")).await;
        assert_eq!(reply.text, "Error from AI service: 500");
        assert_eq!(reply.continuity_token, None);
    }
}
