//! Google Gemini provider with batch support.
//!
//! Gemini caches shared prefixes implicitly, so `cache_system_prompt` is a
//! wire-level no-op; actual cache hits show up in
//! `usageMetadata.cachedContentTokenCount`.

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

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

// ── Wire shapes ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: UsageMetadata,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
    #[serde(default)]
    cached_content_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct BatchJob {
    name: String,
    #[serde(default)]
    metadata: BatchMetadata,
    #[serde(default)]
    response: Option<BatchJobResponse>,
}

#[derive(Debug, Deserialize, Default)]
struct BatchMetadata {
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchJobResponse {
    #[serde(default)]
    inlined_responses: Option<InlinedResponses>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlinedResponses {
    #[serde(default)]
    inlined_responses: Vec<InlinedResponse>,
}

#[derive(Debug, Deserialize)]
struct InlinedResponse {
    #[serde(default)]
    metadata: Option<ResponseMetadata>,
    #[serde(default)]
    response: Option<GenerateContentResponse>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    key: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelData {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
}

impl GeminiProvider {
    pub fn new(api_key: &str, base_url: Option<&str>) -> Self {
        GeminiProvider {
            http: http_client(),
            api_key: api_key.to_string(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn generation_config(json_mode: bool, max_tokens: Option<u32>) -> Value {
        let mut config = json!({});
        if json_mode {
            config["responseMimeType"] = json!("application/json");
        }
        if let Some(max_tokens) = max_tokens {
            config["maxOutputTokens"] = json!(max_tokens);
        }
        config
    }

    fn request_body(
        system_prompt: &str,
        user_content: &str,
        json_mode: bool,
        max_tokens: Option<u32>,
    ) -> Value {
        json!({
            "systemInstruction": {"parts": [{"text": system_prompt}]},
            "contents": [{"role": "user", "parts": [{"text": user_content}]}],
            "generationConfig": Self::generation_config(json_mode, max_tokens),
        })
    }

    fn usage_from(meta: &UsageMetadata) -> TokenUsage {
        TokenUsage {
            prompt_tokens: meta.prompt_token_count,
            completion_tokens: meta.candidates_token_count,
            total_tokens: meta.total_token_count,
            call_count: 1,
            cache_read_tokens: meta.cached_content_token_count,
            cache_write_tokens: 0,
        }
    }

    fn text_from(response: &GenerateContentResponse) -> Option<String> {
        let parts = &response.candidates.first()?.content.parts;
        Some(
            parts
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join(""),
        )
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, SummarizeError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "gemini",
                source,
            })?;
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(SummarizeError::Provider {
                provider: "gemini",
                status: status.as_u16(),
                message,
            });
        }
        serde_json::from_str(&text).map_err(|e| SummarizeError::Malformed {
            provider: "gemini",
            message: e.to_string(),
        })
    }

    async fn get_job(&self, batch_id: &str) -> Result<BatchJob, SummarizeError> {
        let response = self
            .http
            .get(format!("{}/{batch_id}", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "gemini",
                source,
            })?;
        Self::decode(response).await
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn chat(
        &self,
        model: &str,
        system_prompt: &str,
        user_content: &str,
        options: &ChatOptions,
    ) -> Result<ChatResponse, SummarizeError> {
        let body =
            Self::request_body(system_prompt, user_content, options.json_mode, options.max_tokens);
        let response = self
            .http
            .post(format!("{}/models/{model}:generateContent", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "gemini",
                source,
            })?;
        let parsed: GenerateContentResponse = Self::decode(response).await?;
        let text = Self::text_from(&parsed).ok_or_else(|| SummarizeError::Malformed {
            provider: "gemini",
            message: "response has no candidates".into(),
        })?;
        debug!(model, chars = text.len(), "gemini chat complete");
        Ok(ChatResponse {
            usage: Self::usage_from(&parsed.usage_metadata),
            text,
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, SummarizeError> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "gemini",
                source,
            })?;
        let parsed: ModelsResponse = Self::decode(response).await?;
        Ok(parsed
            .models
            .into_iter()
            .map(|m| ModelInfo {
                name: m.display_name.unwrap_or_else(|| m.name.clone()),
                id: m.name,
                provider: "gemini".to_string(),
            })
            .collect())
    }

    fn batch(&self) -> Option<&dyn BatchApi> {
        Some(self)
    }
}

fn map_batch_status(state: &str) -> BatchStatus {
    match state {
        "JOB_STATE_PENDING" => BatchStatus::Submitted,
        "JOB_STATE_RUNNING" | "JOB_STATE_PAUSED" => BatchStatus::InProgress,
        "JOB_STATE_SUCCEEDED" => BatchStatus::Completed,
        "JOB_STATE_FAILED" | "JOB_STATE_CANCELLED" => BatchStatus::Failed,
        "JOB_STATE_EXPIRED" => BatchStatus::Expired,
        other => {
            warn!(state = other, "unknown gemini batch state");
            BatchStatus::InProgress
        }
    }
}

#[async_trait]
impl BatchApi for GeminiProvider {
    async fn submit_batch(&self, requests: &[BatchRequest]) -> Result<String, SummarizeError> {
        let Some(first) = requests.first() else {
            return Err(SummarizeError::Malformed {
                provider: "gemini",
                message: "cannot submit an empty batch".into(),
            });
        };
        let model = &first.model;
        let entries: Vec<Value> = requests
            .iter()
            .map(|r| {
                json!({
                    "request": Self::request_body(
                        &r.system_prompt,
                        &r.user_content,
                        r.json_mode,
                        r.max_tokens,
                    ),
                    "metadata": {"key": r.custom_id},
                })
            })
            .collect();

        let body = json!({
            "batch": {
                "displayName": "recap batch",
                "inputConfig": {"requests": {"requests": entries}},
            }
        });
        let response = self
            .http
            .post(format!(
                "{}/models/{model}:batchGenerateContent",
                self.base_url
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| SummarizeError::Transport {
                provider: "gemini",
                source,
            })?;
        let job: BatchJob = Self::decode(response).await?;
        info!(batch_id = %job.name, requests = requests.len(), "submitted gemini batch");
        Ok(job.name)
    }

    async fn batch_status(&self, batch_id: &str) -> Result<BatchStatus, SummarizeError> {
        let job = self.get_job(batch_id).await?;
        Ok(map_batch_status(&job.metadata.state))
    }

    async fn batch_results(&self, batch_id: &str) -> Result<Vec<BatchResult>, SummarizeError> {
        let job = self.get_job(batch_id).await?;
        let inlined = job
            .response
            .and_then(|r| r.inlined_responses)
            .map(|r| r.inlined_responses)
            .unwrap_or_default();

        let mut results = Vec::new();
        for entry in inlined {
            let custom_id = entry.metadata.map(|m| m.key).unwrap_or_default();
            match (entry.response, entry.error) {
                (Some(response), _) => {
                    let content = Self::text_from(&response);
                    let usage = Self::usage_from(&response.usage_metadata);
                    results.push(BatchResult {
                        custom_id,
                        error: if content.is_none() {
                            Some("response has no candidates".to_string())
                        } else {
                            None
                        },
                        content,
                        usage: Some(usage),
                    });
                }
                (None, error) => results.push(BatchResult {
                    custom_id,
                    content: None,
                    usage: None,
                    error: Some(
                        error
                            .map(|e| e.message)
                            .unwrap_or_else(|| "no response for entry".to_string()),
                    ),
                }),
            }
        }
        info!(batch_id, results = results.len(), "retrieved gemini batch results");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_mode_sets_mime_type() {
        let body = GeminiProvider::request_body("s", "u", true, Some(256));
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn plain_request_leaves_generation_config_empty() {
        let body = GeminiProvider::request_body("s", "u", false, None);
        assert_eq!(body["generationConfig"], json!({}));
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "s");
    }

    #[test]
    fn job_state_mapping() {
        assert_eq!(map_batch_status("JOB_STATE_PENDING"), BatchStatus::Submitted);
        assert_eq!(
            map_batch_status("JOB_STATE_RUNNING"),
            BatchStatus::InProgress
        );
        assert_eq!(
            map_batch_status("JOB_STATE_SUCCEEDED"),
            BatchStatus::Completed
        );
        assert_eq!(map_batch_status("JOB_STATE_FAILED"), BatchStatus::Failed);
    }

    #[test]
    fn usage_extracts_cached_content_tokens() {
        let meta = UsageMetadata {
            prompt_token_count: 500,
            candidates_token_count: 50,
            total_token_count: 550,
            cached_content_token_count: 400,
        };
        let usage = GeminiProvider::usage_from(&meta);
        assert_eq!(usage.cache_read_tokens, 400);
        assert_eq!(usage.prompt_tokens, 500);
    }

    #[test]
    fn multi_part_candidates_concatenate() {
        let response = GenerateContentResponse {
            candidates: vec![Candidate {
                content: CandidateContent {
                    parts: vec![
                        Part { text: "Hello ".into() },
                        Part { text: "world".into() },
                    ],
                },
            }],
            usage_metadata: UsageMetadata::default(),
        };
        assert_eq!(GeminiProvider::text_from(&response).unwrap(), "Hello world");
    }
}
