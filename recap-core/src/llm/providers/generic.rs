//! Generic OpenAI-compatible provider (Ollama, vLLM, LM Studio, …).
//!
//! Speaks the OpenAI wire protocol against a configurable base URL. Local
//! servers often omit usage stats, and none of them support batch.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::SummarizeError;
use crate::llm::providers::http_client;
use crate::llm::usage::TokenUsage;
use crate::llm::{ChatOptions, ChatResponse, LlmProvider, ModelInfo};

pub struct GenericProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageData,
}

#[derive(Debug, Deserialize)]
struct MessageData {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct UsageData {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelData>,
}

#[derive(Debug, Deserialize)]
struct ModelData {
    id: String,
}

impl GenericProvider {
    pub fn new(api_key: &str, base_url: &str) -> Self {
        GenericProvider {
            http: http_client(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }
}

#[async_trait]
impl LlmProvider for GenericProvider {
    fn name(&self) -> &'static str {
        "generic"
    }

    async fn chat(
        &self,
        model: &str,
        system_prompt: &str,
        user_content: &str,
        options: &ChatOptions,
    ) -> Result<ChatResponse, SummarizeError> {
        let mut body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_content},
            ],
        });
        if options.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let response = self
            .authed(self.http.post(format!("{}/chat/completions", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "generic",
                source,
            })?;
        let parsed: ChatCompletionResponse =
            super::openai::decode_response("generic", response).await?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SummarizeError::Malformed {
                provider: "generic",
                message: "response has no choices".into(),
            })?;
        debug!(model, chars = text.len(), "generic chat complete");

        // Some local models do not return usage stats.
        let usage = match parsed.usage {
            Some(u) => TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
                call_count: 1,
                ..Default::default()
            },
            None => TokenUsage {
                call_count: 1,
                ..Default::default()
            },
        };
        Ok(ChatResponse { text, usage })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, SummarizeError> {
        let response = self
            .authed(self.http.get(format!("{}/models", self.base_url)))
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "generic",
                source,
            })?;
        let parsed: ModelsResponse = super::openai::decode_response("generic", response).await?;
        Ok(parsed
            .data
            .into_iter()
            .map(|m| ModelInfo {
                name: m.id.clone(),
                id: m.id,
                provider: "generic".to_string(),
            })
            .collect())
    }
}
