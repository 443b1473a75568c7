use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Openai,
    Openrouter,
    Ollama,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Openai => write!(f, "openai"),
            LlmProvider::Openrouter => write!(f, "openrouter"),
            LlmProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmProvider::Openai),
            "openrouter" => Ok(LlmProvider::Openrouter),
            "ollama" => Ok(LlmProvider::Ollama),
            other => anyhow::bail!("Unknown LLM provider: {}", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used for photo descriptions; falls back to `model` when empty.
    #[serde(default)]
    pub vision_model: String,
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_model(),
            vision_model: String::new(),
            transcription_model: default_transcription_model(),
            base_url: String::new(),
            api_key: String::new(),
            max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl LlmConfig {
    /// Returns the effective base_url: if the stored value is empty,
    /// fall back to the canonical URL for the configured provider.
    pub fn effective_base_url(&self) -> &str {
        if !self.base_url.is_empty() {
            return self.base_url.trim_end_matches('/');
        }
        match self.provider {
            LlmProvider::Openrouter => "https://openrouter.ai/api/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
            LlmProvider::Openai => "https://api.openai.com/v1",
        }
    }

    pub fn effective_vision_model(&self) -> &str {
        if self.vision_model.is_empty() {
            &self.model
        } else {
            &self.vision_model
        }
    }

    /// Ollama runs locally without credentials; every other provider needs a key.
    pub fn requires_api_key(&self) -> bool {
        self.provider != LlmProvider::Ollama
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Bot API server, override for a self-hosted `telegram-bot-api`.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_url: default_api_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebhookConfig {
    /// Externally reachable base URL, e.g. `https://bot.example.com`.
    #[serde(default)]
    pub public_url: Option<String>,
    /// Value Telegram echoes back in `X-Telegram-Bot-Api-Secret-Token`.
    #[serde(default)]
    pub secret_token: Option<String>,
    /// Answer the webhook before the AI round trip finishes.
    #[serde(default)]
    pub detach_processing: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_system_prompt() -> String {
    "You are a helpful assistant chatting with a user on Telegram. \
     Answer clearly and concisely, in the language the user writes in."
        .to_string()
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

impl Config {
    /// Load the TOML file if it exists, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML")
    }

    /// Overlay values from `lookup` (the process environment in production).
    /// Empty values are treated as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(url) = get("TELEGRAM_API_URL") {
            self.telegram.api_url = url;
        }
        if let Some(secret) = get("TELEGRAM_WEBHOOK_SECRET") {
            self.webhook.secret_token = Some(secret);
        }
        if let Some(url) = get("WEBHOOK_URL") {
            self.webhook.public_url = Some(url);
        }
        if let Some(provider) = get("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Some(key) = get("LLM_API_KEY")
            .or_else(|| get("OPENAI_API_KEY"))
            .or_else(|| get("OPENROUTER_API_KEY"))
        {
            self.llm.api_key = key;
        }
        if let Some(model) = get("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = get("LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(addr) = get("BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
        Ok(())
    }

    pub fn has_bot_token(&self) -> bool {
        !self.telegram.bot_token.is_empty()
    }

    pub fn has_ai_credentials(&self) -> bool {
        !self.llm.requires_api_key() || !self.llm.api_key.is_empty()
    }
}
