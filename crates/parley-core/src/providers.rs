//! Text generation — Gemini generateContent or Chat Completions, one prompt per call.

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::GenerationError;

/// What the model gave back for a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Text(String),
    /// The call succeeded but carried no usable candidate.
    Empty,
}

impl Generation {
    fn from_candidate(text: Option<&str>) -> Self {
        match text {
            Some(t) if !t.is_empty() => Generation::Text(t.to_string()),
            _ => Generation::Empty,
        }
    }
}

/// Single-turn text generation. One attempt per call, no history.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Generation, GenerationError>;
}

// ── Request bodies ──

fn gemini_body(prompt: &str) -> serde_json::Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
    })
}

fn completions_body(model: &str, prompt: &str) -> serde_json::Value {
    json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }],
    })
}

// ── Response normalization ──

/// First candidate's first text part of a generateContent response.
fn normalize_gemini_response(response: &serde_json::Value) -> Generation {
    Generation::from_candidate(response["candidates"][0]["content"]["parts"][0]["text"].as_str())
}

/// First choice's message content of a Chat Completions response.
fn normalize_completions_response(response: &serde_json::Value) -> Generation {
    Generation::from_candidate(response["choices"][0]["message"]["content"].as_str())
}

// ── HTTP client ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wire {
    Gemini,
    Completions,
}

/// [`TextGenerator`] backed by a hosted model API.
pub struct HttpGenerator {
    client: reqwest::Client,
    wire: Wire,
    provider: String,
    model: String,
    api_key: Option<String>,
    base_url: String,
}

impl HttpGenerator {
    pub fn new(config: &Config) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let wire = if config.provider == "gemini" {
            Wire::Gemini
        } else {
            Wire::Completions
        };

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1".to_string());

        Ok(Self {
            client,
            wire,
            provider: config.provider.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, prompt: &str) -> Result<reqwest::RequestBuilder, GenerationError> {
        let request = match self.wire {
            Wire::Gemini => {
                let key = self
                    .api_key
                    .as_deref()
                    .ok_or_else(|| GenerationError::MissingApiKey(self.provider.clone()))?;
                let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
                self.client
                    .post(url)
                    .header("x-goog-api-key", key)
                    .json(&gemini_body(prompt))
            }
            Wire::Completions => {
                // Local servers (Ollama, llama.cpp) don't need a key
                let key = self.api_key.as_deref().unwrap_or("ollama");
                let url = format!("{}/chat/completions", self.base_url);
                self.client
                    .post(url)
                    .header("Authorization", format!("Bearer {}", key))
                    .json(&completions_body(&self.model, prompt))
            }
        };
        Ok(request)
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(&self, prompt: &str) -> Result<Generation, GenerationError> {
        info!(
            "generate request: provider={} model={} prompt_chars={}",
            self.provider,
            self.model,
            prompt.chars().count()
        );

        let response = self.request(prompt)?.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(500).collect();
            warn!("API HTTP {}: {}", status, body);
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: serde_json::Value = response.json().await?;
        Ok(match self.wire {
            Wire::Gemini => normalize_gemini_response(&data),
            Wire::Completions => normalize_completions_response(&data),
        })
    }
}
