//! Anthropic Messages API provider with batch support.
//!
//! Structured output is enforced by prefilling the assistant turn with `[`
//! so the model must continue as a JSON array; prompt caching uses an
//! explicit ephemeral `cache_control` marker on the system block.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::SummarizeError;
use crate::llm::providers::http_client;
use crate::llm::usage::TokenUsage;
use crate::llm::{
    BatchApi, BatchRequest, BatchResult, BatchStatus, ChatOptions, ChatResponse, LlmProvider,
    ModelInfo,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

// ── Wire shapes ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: UsageData,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize, Default)]
struct UsageData {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    id: String,
    #[serde(default)]
    processing_status: String,
}

#[derive(Debug, Deserialize)]
struct BatchResultLine {
    custom_id: String,
    result: BatchResultBody,
}

#[derive(Debug, Deserialize)]
struct BatchResultBody {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<MessagesResponse>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelData>,
}

#[derive(Debug, Deserialize)]
struct ModelData {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, base_url: Option<&str>) -> Self {
        AnthropicProvider {
            http: http_client(),
            api_key: api_key.to_string(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{path}", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{path}", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }

    /// Message params shared by chat and batch entries.
    fn message_params(
        model: &str,
        system_prompt: &str,
        user_content: &str,
        json_mode: bool,
        max_tokens: Option<u32>,
        cache_system_prompt: bool,
    ) -> Value {
        let mut messages = vec![json!({"role": "user", "content": user_content})];
        if json_mode {
            // Prefill forces the reply to continue as a JSON array.
            messages.push(json!({"role": "assistant", "content": "["}));
        }

        let system: Value = if cache_system_prompt {
            json!([{
                "type": "text",
                "text": system_prompt,
                "cache_control": {"type": "ephemeral"},
            }])
        } else {
            json!(system_prompt)
        };

        json!({
            "model": model,
            "max_tokens": max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "system": system,
            "messages": messages,
        })
    }

    fn usage_from(usage: &UsageData) -> TokenUsage {
        TokenUsage {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens + usage.output_tokens,
            call_count: 1,
            cache_read_tokens: usage.cache_read_input_tokens,
            cache_write_tokens: usage.cache_creation_input_tokens,
        }
    }

    fn text_from(response: &MessagesResponse, json_mode: bool) -> String {
        let text = response
            .content
            .first()
            .map(|block| block.text.clone())
            .unwrap_or_default();
        if json_mode {
            // Restore the prefilled opening bracket.
            format!("[{text}")
        } else {
            text
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, SummarizeError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "anthropic",
                source,
            })?;
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(SummarizeError::Provider {
                provider: "anthropic",
                status: status.as_u16(),
                message,
            });
        }
        serde_json::from_str(&text).map_err(|e| SummarizeError::Malformed {
            provider: "anthropic",
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn chat(
        &self,
        model: &str,
        system_prompt: &str,
        user_content: &str,
        options: &ChatOptions,
    ) -> Result<ChatResponse, SummarizeError> {
        let body = Self::message_params(
            model,
            system_prompt,
            user_content,
            options.json_mode,
            options.max_tokens,
            options.cache_system_prompt,
        );
        let response = self
            .request("/v1/messages")
            .json(&body)
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "anthropic",
                source,
            })?;
        let parsed: MessagesResponse = Self::decode(response).await?;
        let text = Self::text_from(&parsed, options.json_mode);
        debug!(model, chars = text.len(), "anthropic chat complete");
        Ok(ChatResponse {
            usage: Self::usage_from(&parsed.usage),
            text,
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, SummarizeError> {
        let response = self
            .get("/v1/models")
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "anthropic",
                source,
            })?;
        let parsed: ModelsResponse = Self::decode(response).await?;
        Ok(parsed
            .data
            .into_iter()
            .map(|m| ModelInfo {
                name: m.display_name.unwrap_or_else(|| m.id.clone()),
                id: m.id,
                provider: "anthropic".to_string(),
            })
            .collect())
    }

    fn batch(&self) -> Option<&dyn BatchApi> {
        Some(self)
    }
}

fn map_batch_status(status: &str) -> BatchStatus {
    match status {
        "in_progress" => BatchStatus::InProgress,
        "ended" => BatchStatus::Completed,
        "canceling" => BatchStatus::Failed,
        "expired" => BatchStatus::Expired,
        other => {
            warn!(status = other, "unknown anthropic batch status");
            BatchStatus::InProgress
        }
    }
}

#[async_trait]
impl BatchApi for AnthropicProvider {
    async fn submit_batch(&self, requests: &[BatchRequest]) -> Result<String, SummarizeError> {
        let api_requests: Vec<Value> = requests
            .iter()
            .map(|r| {
                json!({
                    "custom_id": r.custom_id,
                    "params": Self::message_params(
                        &r.model,
                        &r.system_prompt,
                        &r.user_content,
                        r.json_mode,
                        r.max_tokens,
                        r.cache_system_prompt,
                    ),
                })
            })
            .collect();

        let response = self
            .request("/v1/messages/batches")
            .json(&json!({"requests": api_requests}))
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "anthropic",
                source,
            })?;
        let batch: BatchResponse = Self::decode(response).await?;
        info!(batch_id = %batch.id, requests = requests.len(), "submitted anthropic batch");
        Ok(batch.id)
    }

    async fn batch_status(&self, batch_id: &str) -> Result<BatchStatus, SummarizeError> {
        let response = self
            .get(&format!("/v1/messages/batches/{batch_id}"))
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "anthropic",
                source,
            })?;
        let batch: BatchResponse = Self::decode(response).await?;
        Ok(map_batch_status(&batch.processing_status))
    }

    async fn batch_results(&self, batch_id: &str) -> Result<Vec<BatchResult>, SummarizeError> {
        let response = self
            .get(&format!("/v1/messages/batches/{batch_id}/results"))
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "anthropic",
                source,
            })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "anthropic",
                source,
            })?;
        if !status.is_success() {
            return Err(SummarizeError::Provider {
                provider: "anthropic",
                status: status.as_u16(),
                message: text,
            });
        }

        let mut results = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let entry: BatchResultLine =
                serde_json::from_str(line).map_err(|e| SummarizeError::Malformed {
                    provider: "anthropic",
                    message: format!("bad batch result line: {e}"),
                })?;
            if entry.result.kind == "succeeded" {
                let message = entry.result.message.ok_or_else(|| SummarizeError::Malformed {
                    provider: "anthropic",
                    message: "succeeded result without message".into(),
                })?;
                results.push(BatchResult {
                    custom_id: entry.custom_id,
                    content: Some(Self::text_from(&message, false)),
                    usage: Some(Self::usage_from(&message.usage)),
                    error: None,
                });
            } else {
                let error = entry
                    .result
                    .error
                    .and_then(|e| e["message"].as_str().map(str::to_string))
                    .unwrap_or_else(|| entry.result.kind.clone());
                results.push(BatchResult {
                    custom_id: entry.custom_id,
                    content: None,
                    usage: None,
                    error: Some(error),
                });
            }
        }
        info!(batch_id, results = results.len(), "retrieved anthropic batch results");
        Ok(results)
    }
}
