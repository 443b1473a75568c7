use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::memory::{Role, Turn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

/// Plain text, or a list of parts for multimodal requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        Self {
            role: role.to_string(),
            content: MessageContent::Text(turn.content.clone()),
        }
    }
}

/// The AI capability the relay depends on.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Reply to a role-tagged conversation
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Turn an audio clip into text
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;

    /// Answer `prompt` about a JPEG image
    async fn describe_image(&self, image: &[u8], prompt: &str) -> Result<String>;
}

/// Build the provider selected by configuration.
///
/// Fails when the provider needs credentials that are not configured; the
/// caller keeps running without an AI capability in that case.
pub fn provider_from_config(config: &LlmConfig) -> Result<Arc<dyn AiProvider>> {
    if config.requires_api_key() && config.api_key.is_empty() {
        anyhow::bail!("No API key configured for provider '{}'", config.provider);
    }
    info!(
        "AI provider: {} at {} (model {}, vision {}, transcription {})",
        config.provider,
        config.effective_base_url(),
        config.model,
        config.effective_vision_model(),
        config.transcription_model
    );
    Ok(Arc::new(LlmClient::new(config.clone())))
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Client for OpenAI-compatible chat, transcription and vision endpoints.
/// Works with OpenAI, OpenRouter, Ollama, or any compatible provider.
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.effective_base_url(), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.api_key.is_empty() {
            request
        } else {
            request.header("Authorization", format!("Bearer {}", self.config.api_key))
        }
    }

    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model,
            messages,
            max_tokens: self.config.max_tokens,
        };

        let url = self.endpoint("chat/completions");
        debug!("Sending {} message(s) to {}", messages.len(), url);

        let response = self
            .authorize(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", self.config.provider))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} API error ({}): {}", self.config.provider, status, error_body);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", self.config.provider))?;

        first_choice_text(chat_response)
            .with_context(|| format!("No response from {}", self.config.provider))
    }
}

fn first_choice_text(response: ChatResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

/// User message carrying `prompt` and the image as a base64 data URL
pub fn image_message(image: &[u8], prompt: &str) -> ChatMessage {
    let data_url = format!("data:image/jpeg;base64,{}", BASE64.encode(image));
    ChatMessage {
        role: "user".to_string(),
        content: MessageContent::Parts(vec![
            ContentPart::Text {
                text: prompt.to_string(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl { url: data_url },
            },
        ]),
    }
}

#[async_trait]
impl AiProvider for LlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.chat(&self.config.model, messages).await
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        debug!("Transcribing {} bytes of audio", audio.len());

        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("voice.ogg")
            .mime_str("audio/ogg")
            .context("Invalid audio mime type")?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.transcription_model.clone());

        let response = self
            .authorize(self.client.post(self.endpoint("audio/transcriptions")))
            .multipart(form)
            .send()
            .await
            .context("Failed to send transcription request")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Transcription API error ({}): {}", status, error_body);
        }

        let transcription: TranscriptionResponse = response
            .json()
            .await
            .context("Failed to parse transcription response")?;

        let text = transcription.text.trim().to_string();
        if text.is_empty() {
            anyhow::bail!("Transcription returned no text");
        }
        Ok(text)
    }

    async fn describe_image(&self, image: &[u8], prompt: &str) -> Result<String> {
        let messages = [image_message(image, prompt)];
        self.chat(self.config.effective_vision_model(), &messages).await
    }
}
