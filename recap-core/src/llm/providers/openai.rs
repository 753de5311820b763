//! OpenAI chat-completions provider with batch support.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::SummarizeError;
use crate::llm::providers::http_client;
use crate::llm::usage::TokenUsage;
use crate::llm::{
    BatchApi, BatchRequest, BatchResult, BatchStatus, ChatOptions, ChatResponse, LlmProvider,
    ModelInfo,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model families that bill reasoning tokens against the completion cap. A
/// low cap starves visible output, so the cap is omitted entirely for them.
const REASONING_PREFIXES: &[&str] = &["gpt-5", "o3", "o4"];

pub(crate) fn is_reasoning_model(model: &str) -> bool {
    REASONING_PREFIXES.iter().any(|p| model.starts_with(p))
}

pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

// ── Wire shapes ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
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
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize, Default)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
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
struct FileResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    output_file_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelData>,
}

#[derive(Debug, Deserialize)]
struct ModelData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BatchOutputLine {
    custom_id: String,
    #[serde(default)]
    response: Option<BatchOutputResponse>,
}

#[derive(Debug, Deserialize)]
struct BatchOutputResponse {
    #[serde(default)]
    status_code: u16,
    #[serde(default)]
    body: serde_json::Value,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, base_url: Option<&str>) -> Self {
        OpenAiProvider {
            http: http_client(),
            api_key: api_key.to_string(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn usage_from(usage: Option<UsageData>) -> TokenUsage {
        let usage = usage.unwrap_or_default();
        let cached = usage
            .prompt_tokens_details
            .map(|d| d.cached_tokens)
            .unwrap_or(0);
        TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            call_count: 1,
            cache_read_tokens: cached,
            cache_write_tokens: 0,
        }
    }

    fn chat_body(
        model: &str,
        system_prompt: &str,
        user_content: &str,
        options: &ChatOptions,
    ) -> serde_json::Value {
        let mut body = json!({
            "model": model,
            "messages": [
                ChatMessage { role: "system", content: system_prompt },
                ChatMessage { role: "user", content: user_content },
            ],
        });
        if options.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        if let Some(max_tokens) = options.max_tokens {
            if !is_reasoning_model(model) {
                body["max_completion_tokens"] = json!(max_tokens);
            }
        }
        body
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, SummarizeError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "openai",
                source,
            })?;
        decode_response("openai", response).await
    }
}

pub(crate) async fn decode_response<T: serde::de::DeserializeOwned>(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<T, SummarizeError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|source| SummarizeError::Transport { provider, source })?;
    if !status.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&text)
            .map(|e| e.error.message)
            .unwrap_or(text);
        return Err(SummarizeError::Provider {
            provider,
            status: status.as_u16(),
            message,
        });
    }
    serde_json::from_str(&text).map_err(|e| SummarizeError::Malformed {
        provider,
        message: e.to_string(),
    })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(
        &self,
        model: &str,
        system_prompt: &str,
        user_content: &str,
        options: &ChatOptions,
    ) -> Result<ChatResponse, SummarizeError> {
        // cache_system_prompt is a wire-level no-op: OpenAI caches shared
        // prefixes implicitly; the flag only affects accounting.
        let body = Self::chat_body(model, system_prompt, user_content, options);
        let url = format!("{}/chat/completions", self.base_url);
        let parsed: ChatCompletionResponse = self.post_json(&url, &body).await?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SummarizeError::Malformed {
                provider: "openai",
                message: "response has no choices".into(),
            })?;
        debug!(model, chars = text.len(), "openai chat complete");
        Ok(ChatResponse {
            text,
            usage: Self::usage_from(parsed.usage),
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, SummarizeError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "openai",
                source,
            })?;
        let parsed: ModelsResponse = decode_response("openai", response).await?;
        Ok(parsed
            .data
            .into_iter()
            .map(|m| ModelInfo {
                name: m.id.clone(),
                id: m.id,
                provider: "openai".to_string(),
            })
            .collect())
    }

    fn batch(&self) -> Option<&dyn BatchApi> {
        Some(self)
    }
}

fn batch_line(request: &BatchRequest) -> serde_json::Value {
    let mut body = json!({
        "model": request.model,
        "messages": [
            {"role": "system", "content": request.system_prompt},
            {"role": "user", "content": request.user_content},
        ],
    });
    if request.json_mode {
        body["response_format"] = json!({"type": "json_object"});
    }
    if let Some(max_tokens) = request.max_tokens {
        if !is_reasoning_model(&request.model) {
            body["max_completion_tokens"] = json!(max_tokens);
        }
    }
    json!({
        "custom_id": request.custom_id,
        "method": "POST",
        "url": "/v1/chat/completions",
        "body": body,
    })
}

fn map_batch_status(status: &str) -> BatchStatus {
    match status {
        "validating" => BatchStatus::Submitted,
        "in_progress" | "finalizing" => BatchStatus::InProgress,
        "completed" => BatchStatus::Completed,
        "expired" => BatchStatus::Expired,
        "failed" | "cancelled" | "cancelling" => BatchStatus::Failed,
        other => {
            warn!(status = other, "unknown openai batch status");
            BatchStatus::InProgress
        }
    }
}

#[async_trait]
impl BatchApi for OpenAiProvider {
    async fn submit_batch(&self, requests: &[BatchRequest]) -> Result<String, SummarizeError> {
        let jsonl: String = requests
            .iter()
            .map(|r| batch_line(r).to_string())
            .collect::<Vec<_>>()
            .join("\n");

        let part = reqwest::multipart::Part::text(jsonl)
            .file_name("batch_input.jsonl")
            .mime_str("application/jsonl")
            .map_err(|e| SummarizeError::Malformed {
                provider: "openai",
                message: e.to_string(),
            })?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", "batch")
            .part("file", part);

        let response = self
            .http
            .post(format!("{}/files", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "openai",
                source,
            })?;
        let uploaded: FileResponse = decode_response("openai", response).await?;

        let batch: BatchResponse = self
            .post_json(
                &format!("{}/batches", self.base_url),
                &json!({
                    "input_file_id": uploaded.id,
                    "endpoint": "/v1/chat/completions",
                    "completion_window": "24h",
                }),
            )
            .await?;
        info!(batch_id = %batch.id, requests = requests.len(), "submitted openai batch");
        Ok(batch.id)
    }

    async fn batch_status(&self, batch_id: &str) -> Result<BatchStatus, SummarizeError> {
        let response = self
            .http
            .get(format!("{}/batches/{batch_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "openai",
                source,
            })?;
        let batch: BatchResponse = decode_response("openai", response).await?;
        Ok(map_batch_status(&batch.status))
    }

    async fn batch_results(&self, batch_id: &str) -> Result<Vec<BatchResult>, SummarizeError> {
        let response = self
            .http
            .get(format!("{}/batches/{batch_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "openai",
                source,
            })?;
        let batch: BatchResponse = decode_response("openai", response).await?;
        let Some(output_file_id) = batch.output_file_id else {
            warn!(batch_id, "openai batch has no output file");
            return Ok(Vec::new());
        };

        let response = self
            .http
            .get(format!("{}/files/{output_file_id}/content", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "openai",
                source,
            })?;
        let text = response
            .text()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "openai",
                source,
            })?;

        let mut results = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let entry: BatchOutputLine =
                serde_json::from_str(line).map_err(|e| SummarizeError::Malformed {
                    provider: "openai",
                    message: format!("bad batch output line: {e}"),
                })?;
            let Some(response) = entry.response else {
                results.push(BatchResult {
                    custom_id: entry.custom_id,
                    content: None,
                    usage: None,
                    error: Some("missing response".to_string()),
                });
                continue;
            };
            if response.status_code == 200 {
                let body: ChatCompletionResponse =
                    serde_json::from_value(response.body).map_err(|e| {
                        SummarizeError::Malformed {
                            provider: "openai",
                            message: format!("bad batch output body: {e}"),
                        }
                    })?;
                let content = body
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content);
                results.push(BatchResult {
                    custom_id: entry.custom_id,
                    content,
                    usage: Some(Self::usage_from(body.usage)),
                    error: None,
                });
            } else {
                let message = response.body["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown error")
                    .to_string();
                results.push(BatchResult {
                    custom_id: entry.custom_id,
                    content: None,
                    usage: None,
                    error: Some(message),
                });
            }
        }
        info!(batch_id, results = results.len(), "retrieved openai batch results");
        Ok(results)
    }
}
