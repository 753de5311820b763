//! Token accounting across providers and models.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm::pricing::PricingTable;

/// Token usage of one or more LLM calls, split by cache participation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub call_count: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
}

impl TokenUsage {
    pub fn single(prompt: u64, completion: u64) -> Self {
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
            call_count: 1,
            ..Default::default()
        }
    }
}

impl std::ops::Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, other: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens.saturating_add(other.prompt_tokens),
            completion_tokens: self
                .completion_tokens
                .saturating_add(other.completion_tokens),
            total_tokens: self.total_tokens.saturating_add(other.total_tokens),
            call_count: self.call_count.saturating_add(other.call_count),
            cache_read_tokens: self
                .cache_read_tokens
                .saturating_add(other.cache_read_tokens),
            cache_write_tokens: self
                .cache_write_tokens
                .saturating_add(other.cache_write_tokens),
        }
    }
}

/// Accumulated usage and estimated cost for one provider/model pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelUsage {
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub call_count: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub estimated_cost_usd: f64,
}

/// Thread-safe per-(provider, model) usage tracker with cost estimation.
pub struct UsageTracker {
    pricing: PricingTable,
    inner: Mutex<TrackerInner>,
}

#[derive(Default)]
struct TrackerInner {
    usages: BTreeMap<String, ModelUsage>,
    warned_models: HashSet<String>,
}

impl UsageTracker {
    pub fn new(pricing: PricingTable) -> Self {
        UsageTracker {
            pricing,
            inner: Mutex::new(TrackerInner::default()),
        }
    }

    /// Record one call's usage under `provider/model`.
    pub fn record(&self, provider: &str, model: &str, usage: TokenUsage) {
        let key = format!("{provider}/{model}");
        let cost = self.pricing.estimate_cost(provider, model, &usage);

        let mut inner = self.inner.lock().expect("usage lock poisoned");
        if cost.is_none() && inner.warned_models.insert(key.clone()) {
            warn!(provider, model, "no pricing entry; cost recorded as $0");
        }
        let entry = inner.usages.entry(key).or_insert_with(|| ModelUsage {
            provider: provider.to_string(),
            model: model.to_string(),
            ..Default::default()
        });
        entry.prompt_tokens += usage.prompt_tokens;
        entry.completion_tokens += usage.completion_tokens;
        entry.total_tokens += usage.total_tokens;
        entry.call_count += usage.call_count;
        entry.cache_read_tokens += usage.cache_read_tokens;
        entry.cache_write_tokens += usage.cache_write_tokens;
        entry.estimated_cost_usd += cost.unwrap_or(0.0);
    }

    /// Snapshot of per-model usage.
    pub fn model_usages(&self) -> Vec<ModelUsage> {
        let inner = self.inner.lock().expect("usage lock poisoned");
        inner.usages.values().cloned().collect()
    }

    /// Aggregate usage across all models.
    pub fn total_usage(&self) -> TokenUsage {
        let inner = self.inner.lock().expect("usage lock poisoned");
        inner.usages.values().fold(TokenUsage::default(), |acc, m| {
            acc + TokenUsage {
                prompt_tokens: m.prompt_tokens,
                completion_tokens: m.completion_tokens,
                total_tokens: m.total_tokens,
                call_count: m.call_count,
                cache_read_tokens: m.cache_read_tokens,
                cache_write_tokens: m.cache_write_tokens,
            }
        })
    }

    /// Human-readable usage report for the CLI.
    pub fn format_report(&self) -> String {
        let usages = self.model_usages();
        if usages.is_empty() {
            return "No LLM usage recorded.".to_string();
        }

        let mut lines = vec!["LLM usage:".to_string()];
        let mut total = ModelUsage::default();
        for m in &usages {
            let cost = if m.estimated_cost_usd > 0.0 {
                format!(" (~${:.3})", m.estimated_cost_usd)
            } else {
                String::new()
            };
            lines.push(format!(
                "  {} / {}: {} call(s), {}+{}={} tokens{cost}",
                m.provider,
                m.model,
                m.call_count,
                m.prompt_tokens,
                m.completion_tokens,
                m.total_tokens
            ));
            if m.cache_read_tokens > 0 || m.cache_write_tokens > 0 {
                lines.push(format!(
                    "    cache: {} read + {} write",
                    m.cache_read_tokens, m.cache_write_tokens
                ));
            }
            total.call_count += m.call_count;
            total.prompt_tokens += m.prompt_tokens;
            total.completion_tokens += m.completion_tokens;
            total.total_tokens += m.total_tokens;
            total.estimated_cost_usd += m.estimated_cost_usd;
        }
        if usages.len() > 1 {
            let cost = if total.estimated_cost_usd > 0.0 {
                format!(" (~${:.3})", total.estimated_cost_usd)
            } else {
                String::new()
            };
            lines.push(format!(
                "  total: {} call(s), {}+{}={} tokens{cost}",
                total.call_count, total.prompt_tokens, total.completion_tokens, total.total_tokens
            ));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_usage_addition_saturates_and_sums() {
        let a = TokenUsage::single(100, 20);
        let b = TokenUsage::single(50, 10);
        let sum = a + b;
        assert_eq!(sum.prompt_tokens, 150);
        assert_eq!(sum.completion_tokens, 30);
        assert_eq!(sum.total_tokens, 180);
        assert_eq!(sum.call_count, 2);
    }

    #[test]
    fn tracker_accumulates_per_model() {
        let tracker = UsageTracker::new(PricingTable::builtin());
        tracker.record("openai", "gpt-4o-mini", TokenUsage::single(1000, 100));
        tracker.record("openai", "gpt-4o-mini", TokenUsage::single(2000, 200));
        tracker.record("anthropic", "claude-haiku-4-5", TokenUsage::single(10, 1));

        let usages = tracker.model_usages();
        assert_eq!(usages.len(), 2);
        let mini = usages
            .iter()
            .find(|m| m.model == "gpt-4o-mini")
            .expect("gpt-4o-mini entry");
        assert_eq!(mini.call_count, 2);
        assert_eq!(mini.prompt_tokens, 3000);
        assert!(mini.estimated_cost_usd > 0.0);

        let total = tracker.total_usage();
        assert_eq!(total.call_count, 3);
    }

    #[test]
    fn unknown_model_costs_zero() {
        let tracker = UsageTracker::new(PricingTable::builtin());
        tracker.record("openai", "experimental-42", TokenUsage::single(1_000_000, 0));
        let usages = tracker.model_usages();
        assert_eq!(usages[0].estimated_cost_usd, 0.0);
    }

    #[test]
    fn report_includes_cache_line_only_when_cached() {
        let tracker = UsageTracker::new(PricingTable::builtin());
        tracker.record("openai", "gpt-4o-mini", TokenUsage::single(100, 10));
        assert!(!tracker.format_report().contains("cache:"));

        let cached = TokenUsage {
            cache_read_tokens: 50,
            ..TokenUsage::single(100, 10)
        };
        tracker.record("openai", "gpt-4o-mini", cached);
        assert!(tracker.format_report().contains("cache: 50 read"));
    }
}
