//! Language model gateway

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Language model gateway
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a reply for `prompt`
    ///
    /// # Errors
    ///
    /// Returns error if the provider is unreachable or returns no content
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// LLM provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LlmProvider {
    Gemini,
    OpenAi,
}

/// Generates replies through a hosted language model
pub struct LanguageModel {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    provider: LlmProvider,
}

impl std::fmt::Debug for LanguageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageModel")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl LanguageModel {
    /// Create a new LLM instance using Google Gemini
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_gemini(api_key: SecretString, model: String, timeout: Duration) -> Result<Self> {
        Self::build(api_key, model, LlmProvider::Gemini, timeout)
    }

    /// Create a new LLM instance using `OpenAI` chat completions
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(api_key: SecretString, model: String, timeout: Duration) -> Result<Self> {
        Self::build(api_key, model, LlmProvider::OpenAi, timeout)
    }

    fn build(
        api_key: SecretString,
        model: String,
        provider: LlmProvider,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config(format!("{provider:?} API key required for LLM")));
        }

        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key,
            model,
            provider,
        })
    }

    async fn generate_gemini(&self, prompt: &str) -> Result<String> {
        #[derive(serde::Deserialize)]
        struct GeminiResponse {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }

        #[derive(serde::Deserialize)]
        struct Candidate {
            content: Option<Content>,
        }

        #[derive(serde::Deserialize)]
        struct Content {
            #[serde(default)]
            parts: Vec<Part>,
        }

        #[derive(serde::Deserialize)]
        struct Part {
            #[serde(default)]
            text: Option<String>,
        }

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&serde_json::json!({
                "contents": [{ "parts": [{ "text": prompt }] }]
            }))
            .send()
            .await?;

        let result: GeminiResponse = check_status(response, "Gemini").await?.json().await?;

        let text = result
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        non_empty(text, "Gemini")
    }

    async fn generate_openai(&self, prompt: &str) -> Result<String> {
        #[derive(serde::Deserialize)]
        struct ChatResponse {
            #[serde(default)]
            choices: Vec<Choice>,
        }

        #[derive(serde::Deserialize)]
        struct Choice {
            message: ChatMessage,
        }

        #[derive(serde::Deserialize)]
        struct ChatMessage {
            #[serde(default)]
            content: Option<String>,
        }

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(self.api_key.expose_secret())
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }]
            }))
            .send()
            .await?;

        let result: ChatResponse = check_status(response, "OpenAI").await?.json().await?;

        let text = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        non_empty(text, "OpenAI")
    }
}

#[async_trait]
impl Generator for LanguageModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        tracing::debug!(prompt_chars = prompt.len(), provider = self.name(), "generating reply");

        let reply = match self.provider {
            LlmProvider::Gemini => self.generate_gemini(prompt).await,
            LlmProvider::OpenAi => self.generate_openai(prompt).await,
        }?;

        tracing::info!(reply_chars = reply.len(), "generation complete");
        Ok(reply)
    }

    fn name(&self) -> &'static str {
        match self.provider {
            LlmProvider::Gemini => "gemini",
            LlmProvider::OpenAi => "openai",
        }
    }
}

async fn check_status(response: reqwest::Response, provider: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(status = %status, body = %body, provider, "LLM API error");
    Err(Error::Provider(format!("{provider} error {status}: {body}")))
}

fn non_empty(text: String, provider: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyResult(format!("{provider} returned no content")));
    }
    Ok(trimmed.to_string())
}
