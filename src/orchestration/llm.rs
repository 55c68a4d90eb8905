//! OpenAI-compatible chat completion client.
//!
//! Shared by the LLM classifier and the chat planner. Requests JSON
//! output and returns the first choice's raw content; callers own the
//! parsing so a malformed answer can be handled as a typed failure.

use crate::config::LlmSettings;
use crate::error::{Error, Result};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, instrument, trace};

static CODE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[a-zA-Z]*\s*(.*?)\s*```").unwrap());

/// Return the body of the first Markdown code fence, or the trimmed input
/// when there is none. Models often wrap JSON answers in fences.
pub fn strip_code_fence(raw: &str) -> &str {
    CODE_FENCE_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
        .trim()
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct RawChatResponse {
    #[serde(default)]
    choices: Vec<RawChoice>,
}

#[derive(Debug, Deserialize)]
struct RawChoice {
    message: RawMessage,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    content: Option<String>,
}

/// Client for `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: model.into(),
            temperature: 0.3,
        }
    }

    pub fn from_settings(settings: &LlmSettings) -> Self {
        let mut client = Self::new(&settings.base_url, &settings.model)
            .with_temperature(settings.temperature);
        client.api_key = settings.api_key();
        client
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one system + user exchange and return the raw answer text.
    ///
    /// # Errors
    ///
    /// Transport failures, non-2xx statuses and responses without any
    /// choice content.
    #[instrument(skip(self, system, user), fields(model = %self.model))]
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        debug!("Sending chat completion request");
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Llm {
                status: status.as_u16(),
                message,
            });
        }

        let body: RawChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Llm {
                status: status.as_u16(),
                message: "response contained no choices".to_string(),
            })?;
        trace!(content = %content, "Chat completion content");
        Ok(content)
    }
}
