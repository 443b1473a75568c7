pub mod conversations;

use anyhow::Result;
use async_trait::async_trait;

pub use conversations::InMemoryHistory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One role-tagged entry in a chat's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Session store keyed by chat id.
///
/// Histories are created lazily on the first `append` and only removed by
/// `clear`. Implementations decide on bounds and persistence; the relay
/// only relies on chronological order within a chat.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Snapshot of the chat's turns, oldest first. Unknown chats are empty.
    async fn get(&self, chat_id: i64) -> Result<Vec<Turn>>;

    async fn append(&self, chat_id: i64, turn: Turn) -> Result<()>;

    async fn clear(&self, chat_id: i64) -> Result<()>;
}
