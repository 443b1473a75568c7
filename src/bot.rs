use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::types::{ChatAction, ParseMode};
use tracing::{error, info, warn};

use crate::llm::{AiProvider, ChatMessage};
use crate::memory::{HistoryStore, Turn};
use crate::platform::telegram::{split_message, MESSAGE_CHUNK_LIMIT};
use crate::platform::{IncomingMessage, PhotoSize, TelegramApi, Voice};

pub const WELCOME_TEXT: &str = "<b>Hello! I'm your AI assistant.</b>\n\n\
     Send me a text message, a voice message or a photo and I'll reply.\n\n\
     Commands:\n\
     /clear - Clear conversation history";

pub const CLEARED_TEXT: &str = "Conversation cleared.";

pub const UNSUPPORTED_TEXT: &str = "Please send me a text message, a voice message or a photo.";

pub const APOLOGY_TEXT: &str =
    "Sorry, something went wrong while processing your message. Please try again later.";

pub const AI_UNAVAILABLE_TEXT: &str = "The AI service is not available right now.";

pub const DEFAULT_PHOTO_PROMPT: &str = "Describe this image in detail.";

/// Terminates a Telegram update: picks a reply for the message and sends it.
///
/// Nothing escapes `handle_message`: AI and download failures are reported
/// to the chat, delivery failures are logged.
pub struct Relay {
    telegram: Arc<dyn TelegramApi>,
    ai: Option<Arc<dyn AiProvider>>,
    history: Arc<dyn HistoryStore>,
    system_prompt: String,
}

impl Relay {
    pub fn new(
        telegram: Arc<dyn TelegramApi>,
        ai: Option<Arc<dyn AiProvider>>,
        history: Arc<dyn HistoryStore>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            telegram,
            ai,
            history,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn has_ai_provider(&self) -> bool {
        self.ai.is_some()
    }

    pub async fn handle_message(&self, message: &IncomingMessage) {
        let chat_id = message.chat.id;
        let text = message.text.as_deref().filter(|t| !t.trim().is_empty());

        // Commands only count when nothing is attached
        if !message.has_attachment() {
            match text {
                Some("/start") => {
                    info!("Chat {}: /start", chat_id);
                    return self.reply_html(chat_id, WELCOME_TEXT).await;
                }
                Some("/clear") => {
                    info!("Chat {}: /clear", chat_id);
                    if let Err(e) = self.history.clear(chat_id).await {
                        error!("Failed to clear history for chat {}: {:#}", chat_id, e);
                    }
                    return self.reply(chat_id, CLEARED_TEXT).await;
                }
                _ => {}
            }
        }

        if let Some(text) = text {
            info!("Chat {}: text message ({} chars)", chat_id, text.chars().count());
            self.answer_text(chat_id, text).await;
        } else if let Some(voice) = &message.voice {
            info!("Chat {}: voice message ({:?}s)", chat_id, voice.duration);
            self.answer_voice(chat_id, voice).await;
        } else if let Some(photo) = message.largest_photo() {
            info!("Chat {}: photo {:?}x{:?}", chat_id, photo.width, photo.height);
            self.answer_photo(chat_id, photo, message.caption.as_deref())
                .await;
        } else {
            self.reply(chat_id, UNSUPPORTED_TEXT).await;
        }
    }

    async fn answer_text(&self, chat_id: i64, text: &str) {
        let Some(ai) = self.ai.as_deref() else {
            return self.report_unavailable(chat_id).await;
        };
        self.chat_action(chat_id, ChatAction::Typing).await;

        match self.converse(ai, chat_id, text).await {
            Ok(reply) => self.reply(chat_id, &reply).await,
            Err(e) => self.report_failure(chat_id, e).await,
        }
    }

    /// One text turn: record the user turn, ask the AI with the whole
    /// history, record the answer.
    async fn converse(&self, ai: &dyn AiProvider, chat_id: i64, text: &str) -> Result<String> {
        self.history.append(chat_id, Turn::user(text)).await?;
        let history = self.history.get(chat_id).await?;

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(self.system_prompt.as_str()));
        messages.extend(history.iter().map(ChatMessage::from));

        let reply = ai.complete(&messages).await.context("Completion failed")?;
        self.history
            .append(chat_id, Turn::assistant(reply.as_str()))
            .await?;
        Ok(reply)
    }

    async fn answer_voice(&self, chat_id: i64, voice: &Voice) {
        let Some(ai) = self.ai.as_deref() else {
            return self.report_unavailable(chat_id).await;
        };
        self.chat_action(chat_id, ChatAction::Typing).await;

        let transcript = match self.transcribe(ai, voice).await {
            Ok(transcript) => transcript,
            Err(e) => return self.report_failure(chat_id, e).await,
        };

        self.reply(chat_id, &format!("You said: {}", transcript))
            .await;
        self.answer_text(chat_id, &transcript).await;
    }

    async fn transcribe(&self, ai: &dyn AiProvider, voice: &Voice) -> Result<String> {
        let audio = self.download(&voice.file_id).await?;
        ai.transcribe(&audio).await.context("Transcription failed")
    }

    async fn answer_photo(&self, chat_id: i64, photo: &PhotoSize, caption: Option<&str>) {
        let Some(ai) = self.ai.as_deref() else {
            return self.report_unavailable(chat_id).await;
        };
        self.chat_action(chat_id, ChatAction::UploadPhoto).await;

        let prompt = caption
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(DEFAULT_PHOTO_PROMPT);

        let result = async {
            let image = self.download(&photo.file_id).await?;
            ai.describe_image(&image, prompt)
                .await
                .context("Image description failed")
        }
        .await;

        match result {
            Ok(reply) => self.reply(chat_id, &reply).await,
            Err(e) => self.report_failure(chat_id, e).await,
        }
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let path = self.telegram.get_file(file_id).await?;
        self.telegram.download_file(&path).await
    }

    async fn chat_action(&self, chat_id: i64, action: ChatAction) {
        // Cosmetic; a failure here must not block the reply
        self.telegram.send_chat_action(chat_id, action).await.ok();
    }

    /// Send a reply in Telegram-sized chunks. Send failures are logged only,
    /// so a chat that blocked the bot does not make Telegram redeliver.
    async fn reply(&self, chat_id: i64, text: &str) {
        for chunk in split_message(text, MESSAGE_CHUNK_LIMIT) {
            if let Err(e) = self.telegram.send_message(chat_id, &chunk, None).await {
                warn!("Failed to deliver reply to chat {}: {:#}", chat_id, e);
                return;
            }
        }
    }

    async fn reply_html(&self, chat_id: i64, html: &str) {
        if let Err(e) = self
            .telegram
            .send_message(chat_id, html, Some(ParseMode::Html))
            .await
        {
            warn!("Failed to deliver reply to chat {}: {:#}", chat_id, e);
        }
    }

    async fn report_failure(&self, chat_id: i64, e: anyhow::Error) {
        error!("Error processing message for chat {}: {:#}", chat_id, e);
        self.reply(chat_id, APOLOGY_TEXT).await;
    }

    async fn report_unavailable(&self, chat_id: i64) {
        warn!("Chat {}: no AI provider configured", chat_id);
        self.reply(chat_id, AI_UNAVAILABLE_TEXT).await;
    }
}
