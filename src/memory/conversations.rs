use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{HistoryStore, Turn};

/// Process-local history. Unbounded, never evicted, gone on restart.
#[derive(Default)]
pub struct InMemoryHistory {
    conversations: Mutex<HashMap<i64, Vec<Turn>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn get(&self, chat_id: i64) -> Result<Vec<Turn>> {
        let conversations = self.conversations.lock().await;
        Ok(conversations.get(&chat_id).cloned().unwrap_or_default())
    }

    async fn append(&self, chat_id: i64, turn: Turn) -> Result<()> {
        let mut conversations = self.conversations.lock().await;
        let history = conversations.entry(chat_id).or_default();
        history.push(turn);
        debug!("Chat {} history now has {} turns", chat_id, history.len());
        Ok(())
    }

    async fn clear(&self, chat_id: i64) -> Result<()> {
        let mut conversations = self.conversations.lock().await;
        conversations.remove(&chat_id);
        Ok(())
    }
}
