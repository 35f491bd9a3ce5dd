//! Conversation continuity: conversation id -> backend context token.
//!
//! One token per conversation, last writer wins, kept for the life of the process.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory store of backend continuity tokens keyed by conversation (channel) id.
/// Clones share the same map.
#[derive(Clone)]
pub struct ContinuityStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl Default for ContinuityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContinuityStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Token for the conversation, if the backend has issued one.
    pub async fn get(&self, conversation_id: &str) -> Option<String> {
        self.inner.read().await.get(conversation_id).cloned()
    }

    /// Store the token for the conversation, replacing any previous one.
    pub async fn set(&self, conversation_id: impl Into<String>, token: impl Into<String>) {
        self.inner
            .write()
            .await
            .insert(conversation_id.into(), token.into());
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
