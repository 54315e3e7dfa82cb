//! Ollama client
//!
//! Thin HTTP wrapper over the two Ollama endpoints the model extractor
//! needs: `/api/tags` as a health probe and `/api/generate` for
//! non-streamed, JSON-constrained generation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use devlog_core::{DevlogError, LlmConfig, Result};

/// Generation request as sent to `/api/generate`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub format: String,
    pub stream: bool,
}

impl GenerateRequest {
    /// Non-streamed request constrained to JSON output
    pub fn json(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            format: "json".to_string(),
            stream: false,
        }
    }
}

/// Text-generation service used by the model extractor
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// List installed models; used as a cheap availability check
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Run a generation and return the full response text
    async fn generate(&self, request: &GenerateRequest) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    base_url: Url,
    probe_timeout: Duration,
}

impl OllamaClient {
    /// Create a client for `base_url`; a missing scheme defaults to http
    pub fn new(base_url: &str, probe_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let base_url = parse_base_url(base_url)?;

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DevlogError::ClientInit(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            client,
            base_url,
            probe_timeout,
        })
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(
            &config.ollama_url,
            Duration::from_millis(config.probe_timeout_ms),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| DevlogError::ClientInit(format!("Invalid endpoint {path}: {e}")))
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DevlogError::ClientInit(
            "Ollama URL is not configured".to_string(),
        ));
    }

    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    let url = Url::parse(&with_scheme)
        .map_err(|e| DevlogError::ClientInit(format!("Invalid Ollama URL {raw}: {e}")))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(DevlogError::ClientInit(format!(
            "Unsupported Ollama URL {raw}"
        ))),
    }
}

/// Concatenate the `response` field of every newline-delimited chunk.
/// A non-streamed reply is a single chunk.
fn accumulate_response(body: &str) -> Result<String> {
    let mut text = String::new();

    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        let chunk: GenerateChunk = serde_json::from_str(line).map_err(|e| {
            DevlogError::Transport(format!("Malformed Ollama response envelope: {e}"))
        })?;
        text.push_str(&chunk.response);
    }

    Ok(text)
}

#[async_trait]
impl GenerationBackend for OllamaClient {
    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.endpoint("api/tags")?)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| DevlogError::ServiceUnavailable(format!("Ollama probe failed: {e}")))?;

        if !response.status().is_success() {
            return Err(DevlogError::ServiceUnavailable(format!(
                "Ollama probe returned {}",
                response.status()
            )));
        }

        let tags: TagsResponse = response.json().await.map_err(|e| {
            DevlogError::ServiceUnavailable(format!("Failed to read model list: {e}"))
        })?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint("api/generate")?)
            .json(request)
            .send()
            .await
            .map_err(|e| DevlogError::Transport(format!("Ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DevlogError::Transport(format!(
                "Ollama error {status}: {error_text}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DevlogError::Transport(format!("Failed to read Ollama response: {e}")))?;

        accumulate_response(&body)
    }
}

// ============================================================================
// Tests
// ============================================================================
