//! Inbound event classification: raw websocket frame -> actionable message or nothing.
//!
//! Frames look like `{"event":"posted","data":{"post":"<json>","sender_name":"@alice"}}`
//! where `post` is itself a JSON document encoded as a string.

use serde::Deserialize;

/// The only event type the bridge answers.
pub const POSTED_EVENT: &str = "posted";

const DEFAULT_SENDER_NAME: &str = "unknown";

/// A user message normalized from a `posted` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Channel the post was made in; replies go back here.
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    /// Message text with surrounding whitespace trimmed. Never empty.
    pub text: String,
    /// True when the bridge itself authored the post.
    pub is_self: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("event is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("posted event has no data.post")]
    MissingPost,
    #[error("post payload is not valid JSON: {0}")]
    Post(#[source] serde_json::Error),
    #[error("post has no {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PostedData {
    #[serde(default)]
    post: Option<String>,
    #[serde(default)]
    sender_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

/// Strict parse. `Ok(None)` for events the bridge ignores (other event types, blank
/// text); `Err` for payloads that claim to be a post but cannot be read.
pub fn parse_event(raw: &str, self_id: &str) -> Result<Option<InboundMessage>, EventError> {
    let event: RawEvent = serde_json::from_str(raw).map_err(EventError::Json)?;
    if event.event.as_deref() != Some(POSTED_EVENT) {
        return Ok(None);
    }

    let data: PostedData = match event.data {
        Some(v) => serde_json::from_value(v).map_err(|_| EventError::MissingPost)?,
        None => return Err(EventError::MissingPost),
    };
    let post_json = data.post.ok_or(EventError::MissingPost)?;
    let post: Post = serde_json::from_str(&post_json).map_err(EventError::Post)?;

    let text = post.message.unwrap_or_default().trim().to_string();
    if text.is_empty() {
        return Ok(None);
    }
    let conversation_id = non_empty(post.channel_id).ok_or(EventError::MissingField("channel_id"))?;
    let sender_id = non_empty(post.user_id).ok_or(EventError::MissingField("user_id"))?;

    Ok(Some(InboundMessage {
        is_self: sender_id == self_id,
        conversation_id,
        sender_id,
        sender_name: data
            .sender_name
            .unwrap_or_else(|| DEFAULT_SENDER_NAME.to_string()),
        text,
    }))
}

/// Actionable message from a raw frame, or `None`. Malformed frames are logged and
/// dropped; the bridge's own posts are filtered out.
pub fn classify(raw: &str, self_id: &str) -> Option<InboundMessage> {
    match parse_event(raw, self_id) {
        Ok(Some(msg)) if msg.is_self => None,
        Ok(msg) => msg,
        Err(e) => {
            log::warn!("dropping malformed event: {}", e);
            None
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}
