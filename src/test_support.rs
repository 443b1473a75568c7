//! Recording fakes for the Telegram and AI seams.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use teloxide::types::{ChatAction, ParseMode};

use crate::llm::{AiProvider, ChatMessage, MessageContent};
use crate::platform::TelegramApi;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send(i64, String),
    Action(i64, ChatAction),
    GetFile(String),
    Download(String),
    SetWebhook(String, Option<String>),
    Complete(Vec<ChatMessage>),
    Transcribe(Vec<u8>),
    DescribeImage(Vec<u8>, String),
}

/// Ordered log shared by both fakes
pub type CallLog = Arc<Mutex<Vec<Call>>>;

pub fn calls(log: &CallLog) -> Vec<Call> {
    log.lock().unwrap().clone()
}

/// Messages sent to chats, in order
pub fn sent(log: &CallLog) -> Vec<String> {
    calls(log)
        .into_iter()
        .filter_map(|call| match call {
            Call::Send(_, text) => Some(text),
            _ => None,
        })
        .collect()
}

pub fn completions(log: &CallLog) -> Vec<Vec<ChatMessage>> {
    calls(log)
        .into_iter()
        .filter_map(|call| match call {
            Call::Complete(messages) => Some(messages),
            _ => None,
        })
        .collect()
}

/// Text content of a message, `None` for multimodal parts
pub fn text_of(message: &ChatMessage) -> Option<&str> {
    match &message.content {
        MessageContent::Text(text) => Some(text),
        MessageContent::Parts(_) => None,
    }
}

pub struct FakeTelegram {
    pub log: CallLog,
    pub fail_download: bool,
    pub fail_send: bool,
}

impl FakeTelegram {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            fail_download: false,
            fail_send: false,
        }
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }
}

#[async_trait]
impl TelegramApi for FakeTelegram {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        _parse_mode: Option<ParseMode>,
    ) -> Result<()> {
        self.record(Call::Send(chat_id, text.to_string()));
        if self.fail_send {
            anyhow::bail!("Forbidden: bot was blocked by the user");
        }
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<()> {
        self.record(Call::Action(chat_id, action));
        Ok(())
    }

    async fn get_file(&self, file_id: &str) -> Result<String> {
        self.record(Call::GetFile(file_id.to_string()));
        Ok(format!("files/{}", file_id))
    }

    async fn download_file(&self, file_path: &str) -> Result<Vec<u8>> {
        self.record(Call::Download(file_path.to_string()));
        if self.fail_download {
            anyhow::bail!("404 Not Found");
        }
        Ok(format!("bytes:{}", file_path).into_bytes())
    }

    async fn set_webhook(
        &self,
        url: &str,
        secret_token: Option<&str>,
    ) -> Result<serde_json::Value> {
        self.record(Call::SetWebhook(
            url.to_string(),
            secret_token.map(str::to_string),
        ));
        Ok(serde_json::json!({"ok": true, "result": true}))
    }
}

pub struct FakeAi {
    pub log: CallLog,
    pub reply: String,
    pub transcript: String,
    pub fail: bool,
}

impl FakeAi {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            reply: "Rest and drink plenty of water.".to_string(),
            transcript: "my head hurts".to_string(),
            fail: false,
        }
    }

    fn record(&self, call: Call) -> Result<()> {
        self.log.lock().unwrap().push(call);
        if self.fail {
            anyhow::bail!("AI API error (500 Internal Server Error): upstream timeout");
        }
        Ok(())
    }
}

#[async_trait]
impl AiProvider for FakeAi {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.record(Call::Complete(messages.to_vec()))?;
        Ok(self.reply.clone())
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        self.record(Call::Transcribe(audio.to_vec()))?;
        Ok(self.transcript.clone())
    }

    async fn describe_image(&self, image: &[u8], prompt: &str) -> Result<String> {
        self.record(Call::DescribeImage(image.to_vec(), prompt.to_string()))?;
        Ok("A red, slightly raised patch of skin.".to_string())
    }
}
