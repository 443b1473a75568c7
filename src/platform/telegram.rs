use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, FileId, ParseMode};
use teloxide::RequestError;
use tracing::{debug, info};

use super::TelegramApi;
use crate::config::TelegramConfig;

/// Telegram caps messages at 4096 chars; leave headroom.
pub const MESSAGE_CHUNK_LIMIT: usize = 4000;

/// Split long messages for Telegram's 4096 char limit
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Bot API client backed by teloxide
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    /// An empty token is accepted here; API calls fail later instead.
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let api_url = reqwest::Url::parse(&config.api_url)
            .with_context(|| format!("Invalid Telegram API URL: {}", config.api_url))?;
        let bot = Bot::new(&config.bot_token).set_api_url(api_url);
        Ok(Self { bot })
    }
}

#[async_trait]
impl TelegramApi for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<()> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(mode) = parse_mode {
            request = request.parse_mode(mode);
        }
        request
            .await
            .with_context(|| format!("sendMessage to chat {} failed", chat_id))?;
        debug!("Telegram message sent to chat {}", chat_id);
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<()> {
        self.bot
            .send_chat_action(ChatId(chat_id), action)
            .await
            .with_context(|| format!("sendChatAction to chat {} failed", chat_id))?;
        Ok(())
    }

    async fn get_file(&self, file_id: &str) -> Result<String> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .with_context(|| format!("getFile {} failed", file_id))?;
        Ok(file.path)
    }

    async fn download_file(&self, file_path: &str) -> Result<Vec<u8>> {
        let mut buffer: Vec<u8> = Vec::new();
        self.bot
            .download_file(file_path, &mut buffer)
            .await
            .with_context(|| format!("Downloading {} failed", file_path))?;
        debug!("Downloaded {} ({} bytes)", file_path, buffer.len());
        Ok(buffer)
    }

    async fn set_webhook(
        &self,
        url: &str,
        secret_token: Option<&str>,
    ) -> Result<serde_json::Value> {
        let webhook_url =
            reqwest::Url::parse(url).with_context(|| format!("Invalid webhook URL: {}", url))?;

        let mut request = self.bot.set_webhook(webhook_url);
        if let Some(secret) = secret_token {
            request = request.secret_token(secret.to_string());
        }

        match request.await {
            Ok(_) => {
                info!("Telegram webhook set to {}", url);
                Ok(json!({ "ok": true, "result": true }))
            }
            Err(RequestError::Api(api_error)) => Ok(json!({
                "ok": false,
                "description": api_error.to_string(),
            })),
            Err(e) => Err(e).context("setWebhook request failed"),
        }
    }
}
