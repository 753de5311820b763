//! Provider/task routing configuration (`providers.toml`).
//!
//! ```toml
//! [strategy]
//! mode = "adaptive"
//!
//! [providers.anthropic]
//! api_key = "sk-ant-…"
//!
//! [providers.generic]
//! api_key = ""
//! base_url = "http://localhost:11434/v1"
//!
//! [tasks.enrich]
//! provider = "anthropic"
//! model = "claude-haiku-4-5"
//! escalation_model = "claude-sonnet-4-5"
//! max_tokens = 4096
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

pub const KNOWN_TASKS: &[&str] = &["enrich", "daily", "weekly", "monthly", "yearly", "query"];

/// Model-selection strategy across all tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyMode {
    /// Always the base model, never escalate.
    Economy,
    /// Base model; escalate once on structural failure.
    Standard,
    /// Escalation model when defined, otherwise base.
    Premium,
    /// Base model with self-assessed confidence; escalate below threshold.
    Adaptive,
    /// Exactly the configured model, no escalation.
    #[default]
    Fixed,
}

impl StrategyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyMode::Economy => "economy",
            StrategyMode::Standard => "standard",
            StrategyMode::Premium => "premium",
            StrategyMode::Adaptive => "adaptive",
            StrategyMode::Fixed => "fixed",
        }
    }
}

/// Credentials and endpoint of one provider.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProviderEntry {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Model binding of one task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskEntry {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub escalation_model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct StrategySection {
    #[serde(default)]
    mode: StrategyMode,
}

#[derive(Debug, Clone, Deserialize)]
struct RawDocument {
    #[serde(default)]
    strategy: StrategySection,
    #[serde(default)]
    providers: BTreeMap<String, ProviderEntry>,
    #[serde(default)]
    tasks: BTreeMap<String, TaskEntry>,
}

/// Validated routing document.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    mode: StrategyMode,
    providers: BTreeMap<String, ProviderEntry>,
    tasks: BTreeMap<String, TaskEntry>,
}

impl ProviderConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|e| match e {
            ConfigError::Toml { source, .. } => ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawDocument = toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: "providers.toml".into(),
            source,
        })?;
        let config = ProviderConfig {
            mode: raw.strategy.mode,
            providers: raw.providers,
            tasks: raw.tasks,
        };
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on an unusable document so no run starts with a broken
    /// router.
    fn validate(&self) -> Result<(), ConfigError> {
        for (task, entry) in &self.tasks {
            if task == "default" {
                continue;
            }
            if !self.providers.contains_key(&entry.provider) {
                return Err(ConfigError::Invalid(format!(
                    "task '{task}' references provider '{}' which is not configured",
                    entry.provider
                )));
            }
        }
        for (name, entry) in &self.providers {
            // Local OpenAI-compatible servers often run without a key.
            if name != "generic" && entry.api_key.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "provider '{name}' has an empty api_key"
                )));
            }
        }
        Ok(())
    }

    pub fn strategy_mode(&self) -> StrategyMode {
        self.mode
    }

    /// Task binding, falling back to the `default` task.
    pub fn task(&self, task: &str) -> Result<&TaskEntry, ConfigError> {
        self.tasks
            .get(task)
            .or_else(|| self.tasks.get("default"))
            .ok_or_else(|| {
                ConfigError::Invalid(format!("no config for task '{task}' and no default defined"))
            })
    }

    pub fn provider_entry(&self, provider: &str) -> Result<&ProviderEntry, ConfigError> {
        self.providers.get(provider).ok_or_else(|| {
            ConfigError::Invalid(format!("provider '{provider}' is not configured"))
        })
    }

    pub fn providers(&self) -> &BTreeMap<String, ProviderEntry> {
        &self.providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
        [strategy]
        mode = "adaptive"

        [providers.anthropic]
        api_key = "sk-ant-x"

        [providers.generic]
        api_key = ""
        base_url = "http://localhost:11434/v1"

        [tasks.enrich]
        provider = "anthropic"
        model = "claude-haiku-4-5"
        escalation_model = "claude-sonnet-4-5"
        max_tokens = 4096

        [tasks.daily]
        provider = "anthropic"
        model = "claude-sonnet-4-5"
    "#;

    #[test]
    fn parses_valid_document() {
        let config = ProviderConfig::from_toml_str(VALID).unwrap();
        assert_eq!(config.strategy_mode(), StrategyMode::Adaptive);
        let enrich = config.task("enrich").unwrap();
        assert_eq!(enrich.model, "claude-haiku-4-5");
        assert_eq!(enrich.max_tokens, Some(4096));
        assert_eq!(
            enrich.escalation_model.as_deref(),
            Some("claude-sonnet-4-5")
        );
    }

    #[test]
    fn unknown_task_falls_back_to_default() {
        let config = ProviderConfig::from_toml_str(
            r#"
            [providers.openai]
            api_key = "sk-x"

            [tasks.default]
            provider = "openai"
            model = "gpt-4o-mini"
            "#,
        )
        .unwrap();
        assert_eq!(config.task("weekly").unwrap().model, "gpt-4o-mini");
    }

    #[test]
    fn missing_task_and_default_is_an_error() {
        let config = ProviderConfig::from_toml_str(
            r#"
            [providers.openai]
            api_key = "sk-x"
            "#,
        )
        .unwrap();
        assert!(config.task("daily").is_err());
    }

    #[test]
    fn task_referencing_unconfigured_provider_fails_fast() {
        let err = ProviderConfig::from_toml_str(
            r#"
            [tasks.daily]
            provider = "anthropic"
            model = "claude-sonnet-4-5"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not configured"), "{err}");
    }

    #[test]
    fn empty_api_key_fails_except_generic() {
        let err = ProviderConfig::from_toml_str(
            r#"
            [providers.openai]
            api_key = ""
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty api_key"), "{err}");

        ProviderConfig::from_toml_str(
            r#"
            [providers.generic]
            api_key = ""
            base_url = "http://localhost:1234/v1"
            "#,
        )
        .unwrap();
    }

    #[test]
    fn strategy_defaults_to_fixed() {
        let config = ProviderConfig::from_toml_str("").unwrap();
        assert_eq!(config.strategy_mode(), StrategyMode::Fixed);
    }
}
