//! Concrete provider implementations.
//!
//! Each provider is a thin `reqwest` wire client: request/response shapes
//! live in serde structs next to the code that builds them, and every
//! provider maps the uniform [`ChatOptions`] onto its native wire format.

mod anthropic;
mod generic;
mod gemini;
mod openai;

pub use anthropic::AnthropicProvider;
pub use generic::GenericProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use std::sync::Arc;

use crate::error::SummarizeError;
use crate::llm::provider_config::ProviderEntry;
use crate::llm::LlmProvider;

/// Instantiate a provider by its configured name.
pub fn create_provider(
    name: &str,
    entry: &ProviderEntry,
) -> Result<Arc<dyn LlmProvider>, SummarizeError> {
    match name {
        "openai" => Ok(Arc::new(OpenAiProvider::new(
            &entry.api_key,
            entry.base_url.as_deref(),
        ))),
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(
            &entry.api_key,
            entry.base_url.as_deref(),
        ))),
        "gemini" => Ok(Arc::new(GeminiProvider::new(
            &entry.api_key,
            entry.base_url.as_deref(),
        ))),
        "generic" => {
            let base_url = entry.base_url.clone().ok_or_else(|| {
                SummarizeError::UnknownProvider(
                    "generic provider requires a base_url".to_string(),
                )
            })?;
            Ok(Arc::new(GenericProvider::new(&entry.api_key, &base_url)))
        }
        other => Err(SummarizeError::UnknownProvider(other.to_string())),
    }
}

pub(crate) const LLM_TIMEOUT_SECS: u64 = 120;

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(LLM_TIMEOUT_SECS))
        .build()
        .expect("reqwest client construction cannot fail with static options")
}
