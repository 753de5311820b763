//! Task-keyed routing across providers, strategies and batch jobs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::SummarizeError;
use crate::llm::provider_config::{ProviderConfig, StrategyMode, TaskEntry};
use crate::llm::providers::create_provider;
use crate::llm::usage::UsageTracker;
use crate::llm::{BatchRequest, BatchResult, BatchStatus, ChatOptions, ChatResponse, LlmProvider};
use crate::store::BatchJobStore;

/// Escalate when the base model self-reports below this confidence.
const CONFIDENCE_THRESHOLD: f64 = 0.7;

/// The adaptive wrapper keeps the system prompt lean and fixed; the task's
/// real instructions ride in the user content so an escalation re-run does
/// not double the token cost.
const ADAPTIVE_SYSTEM: &str = "Complete the task in the user message and self-assess. Respond \
     with a single JSON object: {\"answer\": \"<your full answer>\", \"confidence\": <0.0-1.0>}";

/// Batch polling ramps linearly between these bounds across the expected
/// duration.
const POLL_MIN_SECS: f64 = 5.0;
const POLL_MAX_SECS: f64 = 60.0;

/// One request handed to [`LlmRouter::submit_batch`]. The model is always
/// the task's base model; batches never escalate.
#[derive(Debug, Clone)]
pub struct RouterBatchRequest {
    pub custom_id: String,
    pub system_prompt: String,
    pub user_content: String,
    pub json_mode: bool,
    pub max_tokens: Option<u32>,
    pub cache_system_prompt: bool,
}

#[derive(Debug, Deserialize)]
struct AdaptiveEnvelope {
    answer: serde_json::Value,
    confidence: f64,
}

/// Task-based dispatch to the configured providers.
pub struct LlmRouter {
    config: ProviderConfig,
    providers: Mutex<HashMap<String, Arc<dyn LlmProvider>>>,
    tracker: Arc<UsageTracker>,
    batch_jobs: Option<Arc<BatchJobStore>>,
}

impl LlmRouter {
    pub fn new(config: ProviderConfig, tracker: Arc<UsageTracker>) -> Self {
        LlmRouter {
            config,
            providers: Mutex::new(HashMap::new()),
            tracker,
            batch_jobs: None,
        }
    }

    /// Persist submitted batch ids so interrupted runs can resume polling.
    pub fn with_batch_store(mut self, store: Arc<BatchJobStore>) -> Self {
        self.batch_jobs = Some(store);
        self
    }

    pub fn tracker(&self) -> Arc<UsageTracker> {
        Arc::clone(&self.tracker)
    }

    fn provider(&self, name: &str) -> Result<Arc<dyn LlmProvider>, SummarizeError> {
        let mut providers = self.providers.lock().expect("provider cache lock poisoned");
        if let Some(provider) = providers.get(name) {
            return Ok(Arc::clone(provider));
        }
        let entry = self
            .config
            .provider_entry(name)
            .map_err(|_| SummarizeError::UnknownProvider(name.to_string()))?;
        let provider = create_provider(name, entry)?;
        providers.insert(name.to_string(), Arc::clone(&provider));
        Ok(provider)
    }

    /// Send a chat completion for a task, applying the configured strategy.
    ///
    /// `max_tokens` resolution: explicit argument > task config > unset.
    pub async fn chat(
        &self,
        system_prompt: &str,
        user_content: &str,
        task: &str,
        options: ChatOptions,
    ) -> Result<String, SummarizeError> {
        let task_config = self
            .config
            .task(task)
            .map_err(|e| SummarizeError::UnknownProvider(e.to_string()))?;
        let strategy = self.config.strategy_mode();
        let resolved = ChatOptions {
            max_tokens: options.max_tokens.or(task_config.max_tokens),
            ..options
        };
        let provider = self.provider(&task_config.provider)?;
        info!(
            task,
            provider = %task_config.provider,
            model = %task_config.model,
            strategy = strategy.as_str(),
            "llm call"
        );

        match strategy {
            StrategyMode::Economy | StrategyMode::Fixed => {
                self.plain_chat(
                    &provider,
                    task_config,
                    &task_config.model,
                    system_prompt,
                    user_content,
                    &resolved,
                )
                .await
            }
            StrategyMode::Premium => {
                let model = task_config
                    .escalation_model
                    .as_deref()
                    .unwrap_or(&task_config.model);
                self.plain_chat(
                    &provider,
                    task_config,
                    model,
                    system_prompt,
                    user_content,
                    &resolved,
                )
                .await
            }
            StrategyMode::Standard => {
                self.standard_chat(&provider, task_config, system_prompt, user_content, &resolved)
                    .await
            }
            StrategyMode::Adaptive => {
                if task_config.escalation_model.is_some() {
                    self.adaptive_chat(
                        &provider,
                        task_config,
                        system_prompt,
                        user_content,
                        &resolved,
                    )
                    .await
                } else {
                    self.plain_chat(
                        &provider,
                        task_config,
                        &task_config.model,
                        system_prompt,
                        user_content,
                        &resolved,
                    )
                    .await
                }
            }
        }
    }

    async fn plain_chat(
        &self,
        provider: &Arc<dyn LlmProvider>,
        task_config: &TaskEntry,
        model: &str,
        system_prompt: &str,
        user_content: &str,
        options: &ChatOptions,
    ) -> Result<String, SummarizeError> {
        let started = Instant::now();
        let response = provider
            .chat(model, system_prompt, user_content, options)
            .await?;
        self.record(&task_config.provider, model, &response);
        info!(
            model,
            prompt = response.usage.prompt_tokens,
            completion = response.usage.completion_tokens,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "llm tokens"
        );
        Ok(response.text)
    }

    /// Base model first; one escalation retry when the failure is structural
    /// (bad JSON, content-limit) rather than transport.
    async fn standard_chat(
        &self,
        provider: &Arc<dyn LlmProvider>,
        task_config: &TaskEntry,
        system_prompt: &str,
        user_content: &str,
        options: &ChatOptions,
    ) -> Result<String, SummarizeError> {
        let first = self
            .plain_chat(
                provider,
                task_config,
                &task_config.model,
                system_prompt,
                user_content,
                options,
            )
            .await;
        if let (Err(e), Some(escalation)) = (&first, &task_config.escalation_model) {
            if e.is_structural() {
                warn!(
                    error = %e,
                    escalation = %escalation,
                    "structural failure on base model, escalating"
                );
                return self
                    .plain_chat(
                        provider,
                        task_config,
                        escalation,
                        system_prompt,
                        user_content,
                        options,
                    )
                    .await;
            }
        }
        first
    }

    /// Adaptive strategy: the base model answers inside a confidence
    /// envelope; low confidence triggers one re-run on the escalation model
    /// with the same user content. A response that is not valid JSON is
    /// returned unchanged with no escalation attempted.
    async fn adaptive_chat(
        &self,
        provider: &Arc<dyn LlmProvider>,
        task_config: &TaskEntry,
        system_prompt: &str,
        user_content: &str,
        options: &ChatOptions,
    ) -> Result<String, SummarizeError> {
        let wrapped_user = format!("Instructions:\n{system_prompt}\n\n---\n\n{user_content}");
        let wrapped_options = ChatOptions {
            json_mode: true,
            ..options.clone()
        };

        let base = provider
            .chat(
                &task_config.model,
                ADAPTIVE_SYSTEM,
                &wrapped_user,
                &wrapped_options,
            )
            .await?;
        self.record(&task_config.provider, &task_config.model, &base);

        let Some(envelope) = parse_envelope(&base.text) else {
            warn!("adaptive envelope did not parse; using raw response");
            return Ok(base.text);
        };
        if envelope.confidence >= CONFIDENCE_THRESHOLD {
            debug!(confidence = envelope.confidence, "confidence sufficient");
            return Ok(envelope_answer(envelope));
        }

        let escalation = task_config
            .escalation_model
            .as_deref()
            .expect("adaptive_chat requires an escalation model");
        info!(
            confidence = envelope.confidence,
            escalation, "low confidence, escalating"
        );
        let escalated = provider
            .chat(escalation, ADAPTIVE_SYSTEM, &wrapped_user, &wrapped_options)
            .await?;
        self.record(&task_config.provider, escalation, &escalated);

        Ok(match parse_envelope(&escalated.text) {
            Some(envelope) => envelope_answer(envelope),
            None => escalated.text,
        })
    }

    fn record(&self, provider: &str, model: &str, response: &ChatResponse) {
        self.tracker.record(provider, model, response.usage);
    }

    // ── Batch interface ─────────────────────────────────────────────────────

    /// Submit a provider batch for a task. Batch requests always use the
    /// task's base model.
    pub async fn submit_batch(
        &self,
        requests: Vec<RouterBatchRequest>,
        task: &str,
    ) -> Result<String, SummarizeError> {
        let task_config = self
            .config
            .task(task)
            .map_err(|e| SummarizeError::UnknownProvider(e.to_string()))?;
        let provider = self.provider(&task_config.provider)?;
        let batch_api = provider
            .batch()
            .ok_or_else(|| SummarizeError::BatchUnsupported(task_config.provider.clone()))?;

        let custom_ids: Vec<String> = requests.iter().map(|r| r.custom_id.clone()).collect();
        let batch_requests: Vec<BatchRequest> = requests
            .into_iter()
            .map(|r| BatchRequest {
                custom_id: r.custom_id,
                model: task_config.model.clone(),
                system_prompt: r.system_prompt,
                user_content: r.user_content,
                json_mode: r.json_mode,
                max_tokens: r.max_tokens.or(task_config.max_tokens),
                cache_system_prompt: r.cache_system_prompt,
            })
            .collect();

        info!(
            task,
            provider = task_config.provider,
            requests = batch_requests.len(),
            "submitting batch"
        );
        let batch_id = batch_api.submit_batch(&batch_requests).await?;
        if let Some(store) = &self.batch_jobs {
            store.save_job(&batch_id, &task_config.provider, task, custom_ids)?;
        }
        Ok(batch_id)
    }

    pub async fn get_batch_status(
        &self,
        batch_id: &str,
        task: &str,
    ) -> Result<BatchStatus, SummarizeError> {
        let (provider, _, _) = self.batch_api_for(task)?;
        let batch_api = provider.batch().expect("checked by batch_api_for");
        let status = batch_api.batch_status(batch_id).await?;
        if let Some(store) = &self.batch_jobs {
            store.update_status(batch_id, status.as_str())?;
        }
        Ok(status)
    }

    pub async fn get_batch_results(
        &self,
        batch_id: &str,
        task: &str,
    ) -> Result<Vec<BatchResult>, SummarizeError> {
        let (provider, provider_name, model) = self.batch_api_for(task)?;
        let batch_api = provider.batch().expect("checked by batch_api_for");
        let results = batch_api.batch_results(batch_id).await?;
        for result in &results {
            if let Some(usage) = result.usage {
                self.tracker.record(&provider_name, &model, usage);
            }
        }
        Ok(results)
    }

    /// Poll until the batch reaches a terminal state, then return results.
    ///
    /// The poll interval ramps linearly from 5 s to 60 s across the expected
    /// duration; the timeout is `min(300 + 30·size, 14400)` seconds.
    pub async fn wait_for_batch(
        &self,
        batch_id: &str,
        task: &str,
        size: usize,
    ) -> Result<Vec<BatchResult>, SummarizeError> {
        let timeout_secs = batch_timeout_secs(size);
        let started = Instant::now();
        info!(batch_id, size, timeout_secs, "waiting for batch");

        loop {
            let status = self.get_batch_status(batch_id, task).await?;
            match status {
                BatchStatus::Completed => {
                    info!(
                        batch_id,
                        elapsed_secs = started.elapsed().as_secs(),
                        "batch completed"
                    );
                    return self.get_batch_results(batch_id, task).await;
                }
                BatchStatus::Failed | BatchStatus::Expired => {
                    return Err(SummarizeError::BatchFailed {
                        batch_id: batch_id.to_string(),
                        status: status.to_string(),
                    });
                }
                BatchStatus::Submitted | BatchStatus::InProgress => {}
            }

            let elapsed = started.elapsed().as_secs_f64();
            if elapsed >= timeout_secs as f64 {
                return Err(SummarizeError::BatchTimeout {
                    batch_id: batch_id.to_string(),
                    timeout_secs,
                });
            }
            let interval = poll_interval_secs(elapsed, timeout_secs);
            debug!(batch_id, interval_secs = interval, "batch still running");
            tokio::time::sleep(Duration::from_secs_f64(interval)).await;
        }
    }

    /// Batch jobs persisted for this router, minus terminal ones.
    pub fn active_batch_jobs(&self) -> Vec<crate::store::BatchJobRecord> {
        self.batch_jobs
            .as_ref()
            .and_then(|store| store.active_jobs().ok())
            .unwrap_or_default()
    }

    fn batch_api_for(
        &self,
        task: &str,
    ) -> Result<(Arc<dyn LlmProvider>, String, String), SummarizeError> {
        let task_config = self
            .config
            .task(task)
            .map_err(|e| SummarizeError::UnknownProvider(e.to_string()))?;
        let provider = self.provider(&task_config.provider)?;
        if provider.batch().is_none() {
            return Err(SummarizeError::BatchUnsupported(task_config.provider.clone()));
        }
        Ok((
            provider,
            task_config.provider.clone(),
            task_config.model.clone(),
        ))
    }
}

/// `min(300 + 30·size, 14400)`: five minutes base plus thirty seconds per
/// request, capped at four hours.
pub(crate) fn batch_timeout_secs(size: usize) -> u64 {
    (300 + 30 * size as u64).min(14_400)
}

/// Linear ramp from 5 s to 60 s across the expected duration.
pub(crate) fn poll_interval_secs(elapsed: f64, timeout_secs: u64) -> f64 {
    let progress = (elapsed / timeout_secs as f64).clamp(0.0, 1.0);
    POLL_MIN_SECS + (POLL_MAX_SECS - POLL_MIN_SECS) * progress
}

fn parse_envelope(text: &str) -> Option<AdaptiveEnvelope> {
    serde_json::from_str(strip_code_fences(text)).ok()
}

fn envelope_answer(envelope: AdaptiveEnvelope) -> String {
    match envelope.answer {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Models occasionally wrap JSON in a markdown code fence despite json_mode.
pub(crate) fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}
