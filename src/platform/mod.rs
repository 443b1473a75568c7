pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use teloxide::types::{ChatAction, ParseMode};

pub use telegram::TelegramClient;

/// The `message` object of an incoming webhook update.
///
/// Only the fields the relay reads are modelled; everything else Telegram
/// sends is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: Option<Voice>,
    /// Size variants of one photo, smallest first
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Voice {
    pub file_id: String,
    #[serde(default)]
    pub duration: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl IncomingMessage {
    pub fn has_attachment(&self) -> bool {
        self.voice.is_some() || self.photo.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// The highest-resolution variant, which Telegram lists last
    pub fn largest_photo(&self) -> Option<&PhotoSize> {
        self.photo.as_ref().and_then(|sizes| sizes.last())
    }
}

/// Outbound Telegram Bot API calls used by the relay
#[async_trait]
pub trait TelegramApi: Send + Sync {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<()>;

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<()>;

    /// Resolve a file id to its download path
    async fn get_file(&self, file_id: &str) -> Result<String>;

    async fn download_file(&self, file_path: &str) -> Result<Vec<u8>>;

    /// Register the webhook URL. Returns Telegram's answer as JSON, including
    /// API-level rejections (`ok: false`).
    async fn set_webhook(&self, url: &str, secret_token: Option<&str>)
        -> Result<serde_json::Value>;
}
