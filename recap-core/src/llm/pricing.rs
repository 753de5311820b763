//! Pricing table for cost estimation.
//!
//! Rates are USD per 1M tokens. Cached prompt tokens are billed at a
//! provider-specific fraction of the input rate; Anthropic additionally
//! bills cache writes at a premium over the input rate.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::llm::usage::TokenUsage;

/// (input, output) dollars per million tokens.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Rate {
    pub input: f64,
    pub output: f64,
}

/// provider → model → rate.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    rates: BTreeMap<String, BTreeMap<String, Rate>>,
}

fn rate(input: f64, output: f64) -> Rate {
    Rate { input, output }
}

impl PricingTable {
    /// Built-in table for the commonly routed models. Unknown models simply
    /// cost nothing.
    pub fn builtin() -> Self {
        let mut rates: BTreeMap<String, BTreeMap<String, Rate>> = BTreeMap::new();

        let openai = rates.entry("openai".into()).or_default();
        openai.insert("gpt-5".into(), rate(1.25, 10.00));
        openai.insert("gpt-5-mini".into(), rate(0.25, 2.00));
        openai.insert("gpt-5-nano".into(), rate(0.05, 0.40));
        openai.insert("gpt-4o".into(), rate(2.50, 10.00));
        openai.insert("gpt-4o-mini".into(), rate(0.15, 0.60));
        openai.insert("gpt-4.1".into(), rate(2.00, 8.00));
        openai.insert("gpt-4.1-mini".into(), rate(0.40, 1.60));
        openai.insert("gpt-4.1-nano".into(), rate(0.10, 0.40));
        openai.insert("o3".into(), rate(2.00, 8.00));
        openai.insert("o3-mini".into(), rate(1.10, 4.40));
        openai.insert("o4-mini".into(), rate(1.10, 4.40));

        let anthropic = rates.entry("anthropic".into()).or_default();
        anthropic.insert("claude-opus-4-5".into(), rate(5.00, 25.00));
        anthropic.insert("claude-opus-4-1".into(), rate(15.00, 75.00));
        anthropic.insert("claude-sonnet-4-5".into(), rate(3.00, 15.00));
        anthropic.insert("claude-sonnet-4".into(), rate(3.00, 15.00));
        anthropic.insert("claude-haiku-4-5".into(), rate(1.00, 5.00));
        anthropic.insert("claude-haiku-3-5".into(), rate(0.80, 4.00));

        let gemini = rates.entry("gemini".into()).or_default();
        gemini.insert("gemini-2.5-pro".into(), rate(1.25, 10.00));
        gemini.insert("gemini-2.5-flash".into(), rate(0.30, 2.50));
        gemini.insert("gemini-2.5-flash-lite".into(), rate(0.10, 0.40));
        gemini.insert("gemini-2.0-flash".into(), rate(0.10, 0.40));

        PricingTable { rates }
    }

    /// Merge overrides loaded from a pricing TOML document.
    pub fn with_overrides(mut self, overrides: BTreeMap<String, BTreeMap<String, Rate>>) -> Self {
        for (provider, models) in overrides {
            let entry = self.rates.entry(provider).or_default();
            for (model, r) in models {
                entry.insert(model, r);
            }
        }
        self
    }

    /// Rate for a model, falling back to the name with trailing 8-digit date
    /// suffixes stripped (e.g. `claude-sonnet-4-5-20250929`).
    pub fn get_rate(&self, provider: &str, model: &str) -> Option<Rate> {
        let models = self.rates.get(provider)?;
        if let Some(r) = models.get(model) {
            return Some(*r);
        }
        models.get(&normalize_model_name(model)).copied()
    }

    /// Estimated cost in USD, or `None` for unknown models (so the caller
    /// can warn once and degrade to zero).
    pub fn estimate_cost(&self, provider: &str, model: &str, usage: &TokenUsage) -> Option<f64> {
        let rate = self.get_rate(provider, model)?;
        let read_factor = match provider {
            "anthropic" => 0.10,
            "openai" => 0.50,
            "gemini" => 0.25,
            _ => 1.0,
        };
        // Only Anthropic reports cache writes; they bill above the base
        // input rate.
        let write_factor = 1.25;

        let cached_reads = usage.cache_read_tokens.min(usage.prompt_tokens);
        let uncached_prompt = usage.prompt_tokens - cached_reads;
        let million = 1_000_000.0;

        let input_cost = (uncached_prompt as f64 * rate.input
            + cached_reads as f64 * rate.input * read_factor
            + usage.cache_write_tokens as f64 * rate.input * write_factor)
            / million;
        let output_cost = usage.completion_tokens as f64 * rate.output / million;
        Some(input_cost + output_cost)
    }
}

fn normalize_model_name(model: &str) -> String {
    let mut parts: Vec<&str> = model.split('-').collect();
    while let Some(last) = parts.last() {
        if last.len() == 8 && last.chars().all(|c| c.is_ascii_digit()) {
            parts.pop();
        } else {
            break;
        }
    }
    parts.join("-")
}
