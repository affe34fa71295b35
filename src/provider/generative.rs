//! Generative chat model client.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::provider::{http_client, with_retry, ProviderError};

pub trait GenerativeProvider: Send + Sync {
    /// Run one completion with a system instruction and a user message,
    /// returning the raw model text.
    fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError>;
}

pub struct OpenAiChat {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiChat {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: &str,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            max_retries,
        })
    }

    fn request(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user }
                ]
            }))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        let body: ChatResponse = response.json()?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::MalformedResponse("no completion returned".to_string()))
    }
}

impl GenerativeProvider for OpenAiChat {
    fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        with_retry("chat completion", self.max_retries, || {
            self.request(system, user)
        })
    }
}
