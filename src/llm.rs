//! Concrete [`LanguageModel`] clients.
//!
//! - **[`DisabledModel`]**: no generation, no embeddings. Retrieval still
//!   works through the gatherer, but every model call fails.
//! - **[`OllamaModel`]**: a local Ollama instance, `POST /api/generate`
//!   for text and `POST /api/embed` for vectors.
//!
//! Use [`create_model`] to build the client named by `[model].provider`.
//!
//! ```rust
//! # use workspace_context::config::ModelConfig;
//! # use workspace_context::llm::create_model;
//! let model = create_model(&ModelConfig::default()).unwrap(); // provider = "disabled"
//! assert_eq!(model.name(), "disabled");
//! assert!(!model.supports_embeddings());
//! ```
//!
//! Calls are made once. The retrieval path has its own fallback, so there
//! is no retry loop here.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use workspace_context_core::{GenerateRequest, LanguageModel};

use crate::config::ModelConfig;

/// A model that refuses every request.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: &GenerateRequest) -> Result<String> {
        bail!("Language model is disabled")
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embeddings are disabled")
    }

    fn supports_embeddings(&self) -> bool {
        false
    }
}

/// Client for a local Ollama instance.
///
/// Requires Ollama to be running with both models pulled
/// (e.g. `ollama pull llama3 && ollama pull nomic-embed-text`).
pub struct OllamaModel {
    client: reqwest::Client,
    url: String,
    generation_model: String,
    embedding_model: Option<String>,
}

impl OllamaModel {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let generation_model = config
            .generation_model
            .clone()
            .ok_or_else(|| anyhow!("model.generation_model required for Ollama provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            generation_model,
            embedding_model: config.embedding_model.clone(),
        })
    }

    async fn post(&self, endpoint: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(format!("{}{}", self.url, endpoint))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn name(&self) -> &str {
        &self.generation_model
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let model = if request.model.is_empty() {
            self.generation_model.as_str()
        } else {
            request.model.as_str()
        };
        let mut body = serde_json::json!({
            "model": model,
            "prompt": request.prompt,
            "stream": false,
        });
        if let Some(system) = &request.system_prompt {
            body["system"] = serde_json::Value::String(system.clone());
        }
        if !request.tools.is_empty() {
            tracing::debug!(
                tools = request.tools.len(),
                "tool definitions are not forwarded to /api/generate"
            );
        }
        let json = self.post("/api/generate", &body).await?;
        parse_generate_response(&json)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = self
            .embedding_model
            .as_ref()
            .ok_or_else(|| anyhow!("model.embedding_model is not configured"))?;
        let body = serde_json::json!({
            "model": model,
            "input": [text],
        });
        let json = self.post("/api/embed", &body).await?;
        parse_embed_response(&json)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Empty embedding response"))
    }

    fn supports_embeddings(&self) -> bool {
        self.embedding_model.is_some()
    }
}

fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing response text"))
}

fn parse_embed_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
        let vec = embedding
            .as_array()
            .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))?
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| anyhow!("Invalid Ollama response: non-numeric component"))
            })
            .collect::<Result<Vec<f32>>>()?;
        result.push(vec);
    }
    Ok(result)
}

/// Build the client named by `config.provider`.
///
/// | Provider | Client |
/// |----------|--------|
/// | `"disabled"` | [`DisabledModel`] |
/// | `"ollama"` | [`OllamaModel`] |
pub fn create_model(config: &ModelConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "ollama" => Ok(Arc::new(OllamaModel::new(config)?)),
        other => bail!("Unknown model provider: {}", other),
    }
}
