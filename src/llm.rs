//! Chat-completion backends for the verdict step.
//!
//! [`ChatBackend`] is the seam between prompt logic and transport. The
//! shipped implementation, [`ChatCompletionsClient`], speaks the
//! OpenAI-compatible `chat/completions` protocol (DeepSeek by default).

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::CheckError;

const SERVICE: &str = "LLM API";

/// Sends one prompt, returns the model's text answer.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<String, CheckError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client. One user message per call,
/// no retries.
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionsClient {
    /// Build from config. A missing API key is not an error here; calls
    /// fail with [`CheckError::Unavailable`] instead, so the server can still
    /// start and answer search requests.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let api_key = config.api_key();
        if api_key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "LLM API key not set; plagiarism verdicts will fail"
            );
        }

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ChatBackend for ChatCompletionsClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, CheckError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CheckError::unavailable(SERVICE, "API key not configured"))?;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CheckError::unavailable(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CheckError::Upstream {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| CheckError::unavailable(SERVICE, e))?;
        parse_chat_response(&text)
    }
}

/// Pull `choices[0].message.content` out of a response body, trimmed.
pub fn parse_chat_response(body: &str) -> Result<String, CheckError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| CheckError::malformed(SERVICE, e))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| CheckError::malformed(SERVICE, "no message content in choices"))
}
