//! LLM client abstraction for the rewrite steps.
//!
//! The [`LlmClient`] trait decouples step orchestration from the actual
//! backend (an OpenAI-compatible `chat/completions` endpoint in production).
//! Tests use scripted clients that return predetermined completions without
//! touching the network.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::io::config::LlmConfig;

/// One completion request: a fixed system message plus the rendered prompt.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
}

/// A completion with the token usage the backend reported, when available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

/// Abstraction over completion backends.
pub trait LlmClient {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}

/// Client for an OpenAI-compatible chat completions API.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    max_retries: u32,
}

impl OpenAiClient {
    /// Build a client from config, reading the API key from the configured
    /// environment variable.
    pub fn from_config(cfg: &LlmConfig) -> Result<OpenAiClient> {
        let api_key = std::env::var(&cfg.api_key_env)
            .with_context(|| format!("read API key from ${}", cfg.api_key_env))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .context("build http client")?;
        Ok(OpenAiClient {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key,
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            max_retries: cfg.max_retries,
        })
    }

    fn send_once(&self, request: &CompletionRequest) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt},
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .context("send chat completion request")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            if is_retriable_status(status) {
                return Err(RetriableHttp(status.as_u16(), text).into());
            }
            return Err(anyhow!("chat completion returned HTTP {status}: {text}"));
        }

        let doc: Value = response.json().context("parse chat completion response")?;
        let content = doc["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("chat completion response missing message content"))?
            .to_string();

        Ok(Completion {
            content,
            prompt_tokens: doc["usage"]["prompt_tokens"].as_u64(),
            completion_tokens: doc["usage"]["completion_tokens"].as_u64(),
        })
    }
}

impl LlmClient for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.model, prompt_bytes = request.prompt.len()))]
    fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_secs(2 * u64::from(attempt));
                warn!(attempt, backoff_secs = backoff.as_secs(), "retrying completion");
                thread::sleep(backoff);
            }
            match self.send_once(request) {
                Ok(completion) => {
                    debug!(
                        completion_bytes = completion.content.len(),
                        prompt_tokens = ?completion.prompt_tokens,
                        "completion received"
                    );
                    return Ok(completion);
                }
                Err(err) if is_retriable(&err) => {
                    warn!(err = %err, "transient completion failure");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("completion failed with no attempts")))
    }
}

/// Marker error for HTTP statuses worth retrying.
#[derive(Debug)]
struct RetriableHttp(u16, String);

impl std::fmt::Display for RetriableHttp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chat completion returned HTTP {}: {}", self.0, self.1)
    }
}

impl std::error::Error for RetriableHttp {}

fn is_retriable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retriable(err: &anyhow::Error) -> bool {
    if err.downcast_ref::<RetriableHttp>().is_some() {
        return true;
    }
    // Transport errors (connect/timeout) are retriable; HTTP-level errors
    // were already classified by status above.
    err.downcast_ref::<reqwest::Error>()
        .map(|e| e.is_timeout() || e.is_connect())
        .unwrap_or(false)
}
