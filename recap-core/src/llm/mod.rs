//! Multi-provider language-model routing.
//!
//! Providers are trait objects behind a uniform chat interface; batch
//! capability is an optional second interface discovered at run time via
//! [`LlmProvider::batch`]. The [`router::LlmRouter`] maps high-level tasks
//! (enrich / daily / weekly / monthly / yearly / query) to a provider +
//! model + strategy and records token usage and cost.

pub mod pricing;
pub mod provider_config;
pub mod providers;
pub mod router;
pub mod usage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SummarizeError;
use usage::TokenUsage;

/// Options of a single chat call.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Constrain output to valid JSON where the provider supports it.
    pub json_mode: bool,
    /// Output-token cap. `None` leaves the provider default.
    pub max_tokens: Option<u32>,
    /// Ask the provider to cache the system prompt. Only Anthropic needs an
    /// explicit marker; the others cache implicitly and treat this as a
    /// no-op at the wire level, but accounting still honours it.
    pub cache_system_prompt: bool,
}

/// A completed chat call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
    pub usage: TokenUsage,
}

/// Metadata for an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
}

/// One request inside a provider batch.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub custom_id: String,
    pub model: String,
    pub system_prompt: String,
    pub user_content: String,
    pub json_mode: bool,
    pub max_tokens: Option<u32>,
    pub cache_system_prompt: bool,
}

/// Result of one request inside a completed batch.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub custom_id: String,
    pub content: Option<String>,
    pub usage: Option<TokenUsage>,
    pub error: Option<String>,
}

/// Batch job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Submitted,
    InProgress,
    Completed,
    Failed,
    Expired,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Submitted => "submitted",
            BatchStatus::InProgress => "in_progress",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform chat interface every provider implements.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short identifier, e.g. `"openai"`.
    fn name(&self) -> &'static str;

    /// Send a chat completion, returning the text and token usage.
    async fn chat(
        &self,
        model: &str,
        system_prompt: &str,
        user_content: &str,
        options: &ChatOptions,
    ) -> Result<ChatResponse, SummarizeError>;

    /// List available models. Default: none.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, SummarizeError> {
        Ok(Vec::new())
    }

    /// Batch interface, when this provider supports asynchronous bulk
    /// completion.
    fn batch(&self) -> Option<&dyn BatchApi> {
        None
    }
}

/// Asynchronous bulk-completion interface for batch-capable providers.
#[async_trait]
pub trait BatchApi: Send + Sync {
    /// Submit a batch of requests. Returns the provider batch id.
    async fn submit_batch(&self, requests: &[BatchRequest]) -> Result<String, SummarizeError>;

    /// Current status of a batch job.
    async fn batch_status(&self, batch_id: &str) -> Result<BatchStatus, SummarizeError>;

    /// Results of a completed batch, keyed by caller-supplied custom id.
    async fn batch_results(&self, batch_id: &str) -> Result<Vec<BatchResult>, SummarizeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(BatchStatus::Completed.is_terminal());
        assert!(BatchStatus::Failed.is_terminal());
        assert!(BatchStatus::Expired.is_terminal());
        assert!(!BatchStatus::Submitted.is_terminal());
        assert!(!BatchStatus::InProgress.is_terminal());
    }
}
