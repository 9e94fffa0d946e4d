//! Answer generator implementations.
//!
//! - **[`OllamaGenerator`]** calls `POST /api/generate` with `stream = false`.
//! - **[`OpenAIGenerator`]** calls `POST /v1/chat/completions` with the prompt
//!   as a single user message.
//! - **[`DisabledGenerator`]** always fails; used for retrieval-only runs.
//!
//! Each query sends exactly one request. There is no retry: a connection
//! error, timeout, 429 or 5xx becomes [`Error::GenerationUnavailable`], any
//! other 4xx becomes [`Error::MalformedInput`].

use std::sync::Arc;

use async_trait::async_trait;
use docrag_core::generate::AnswerGenerator;
use docrag_core::{Error, Result};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::GenerationConfig;
use crate::http::{self, Outcome};

async fn post_once(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
) -> Result<Value> {
    match http::post_json(client, url, bearer, body).await {
        Outcome::Success(json) => Ok(json),
        Outcome::Transient(msg) => Err(Error::GenerationUnavailable(msg)),
        Outcome::Rejected(msg) => Err(Error::MalformedInput(msg)),
    }
}

/// Generator backed by a local Ollama instance.
pub struct OllamaGenerator {
    client: reqwest::Client,
    model: String,
    endpoint: String,
    temperature: Option<f32>,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            model: config.model.clone(),
            endpoint: format!("{}/api/generate", config.base_url()),
            temperature: config.temperature,
        })
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        if let Some(t) = self.temperature {
            body["options"] = json!({ "temperature": t });
        }
        body
    }
}

fn parse_ollama_response(json: &Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::GenerationUnavailable("invalid Ollama response: missing 'response'".into())
        })
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        info!(model = %self.model, prompt_chars = prompt.chars().count(), "generating answer");
        let json = post_once(&self.client, &self.endpoint, None, &self.request_body(prompt)).await?;
        let text = parse_ollama_response(&json)?;
        debug!(answer_chars = text.chars().count(), "generation finished");
        Ok(text)
    }
}

/// Generator using the OpenAI chat completions API.
pub struct OpenAIGenerator {
    client: reqwest::Client,
    model: String,
    endpoint: String,
    api_key: String,
    temperature: Option<f32>,
}

impl OpenAIGenerator {
    /// Fails with [`Error::Config`] if `OPENAI_API_KEY` is not set.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY environment variable not set".into()))?;
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            model: config.model.clone(),
            endpoint: format!("{}/v1/chat/completions", config.base_url()),
            api_key,
            temperature: config.temperature,
        })
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        body
    }
}

fn parse_openai_response(json: &Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::GenerationUnavailable("invalid OpenAI response: missing message content".into())
        })
}

#[async_trait]
impl AnswerGenerator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        info!(model = %self.model, prompt_chars = prompt.chars().count(), "generating answer");
        let json = post_once(
            &self.client,
            &self.endpoint,
            Some(self.api_key.as_str()),
            &self.request_body(prompt),
        )
        .await?;
        let text = parse_openai_response(&json)?;
        debug!(answer_chars = text.chars().count(), "generation finished");
        Ok(text)
    }
}

/// A generator that refuses every request.
pub struct DisabledGenerator;

#[async_trait]
impl AnswerGenerator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(Error::GenerationUnavailable(
            "generation provider is disabled".into(),
        ))
    }
}

/// Create the configured [`AnswerGenerator`].
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn AnswerGenerator>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        other => Err(Error::Config(format!("Unknown generation provider: {}", other))),
    }
}
