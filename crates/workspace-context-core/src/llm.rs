//! Language-model collaborator interface.
//!
//! The retrieval pipeline consumes a language model through exactly three
//! operations: generate text, embed text, and report whether embeddings
//! are available. Concrete clients live in the `workspace-context` crate.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A tool the model may be told about during generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool parameters.
    pub parameters: serde_json::Value,
}

/// Inputs for a single generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier (e.g. `"llama3"`).
    pub model: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system_prompt: None,
            tools: Vec::new(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Trait for language-model clients.
///
/// Implementations must be `Send + Sync`; one client is shared by every
/// concurrent retrieval call.
///
/// # Example
///
/// ```rust
/// use anyhow::{bail, Result};
/// use async_trait::async_trait;
/// use workspace_context_core::llm::{GenerateRequest, LanguageModel};
///
/// struct Echo;
///
/// #[async_trait]
/// impl LanguageModel for Echo {
///     fn name(&self) -> &str { "echo" }
///     async fn generate(&self, request: &GenerateRequest) -> Result<String> {
///         Ok(request.prompt.clone())
///     }
///     async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
///         bail!("echo has no embeddings")
///     }
///     fn supports_embeddings(&self) -> bool { false }
/// }
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Client identifier used in logs (e.g. `"ollama"`).
    fn name(&self) -> &str;

    /// Generate a completion for `request`.
    async fn generate(&self, request: &GenerateRequest) -> Result<String>;

    /// Embed `text` into a vector. Dimensionality is whatever the backing
    /// model produces; callers adopt it from the first successful call.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Whether [`embed`](LanguageModel::embed) is expected to work.
    fn supports_embeddings(&self) -> bool;
}
