//! Prompt template loading and the split-marker convention.
//!
//! Templates live as Markdown files in the prompts directory. Text before
//! the `<!-- SPLIT -->` marker is the cacheable system prompt; text after it
//! is the per-call user portion. Substitution is plain `{{name}}`
//! replacement, nothing more.

use std::path::Path;

use crate::error::SummarizeError;

pub const SPLIT_MARKER: &str = "<!-- SPLIT -->";

/// A template split into its cacheable and per-call halves, substituted.
#[derive(Debug, Clone)]
pub struct SplitPrompt {
    pub system: String,
    /// Rendered text after the marker; empty when the template has none.
    /// Callers append their dynamic content after it.
    pub user: String,
}

/// Replace every `{{name}}` placeholder with its value.
pub fn render(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{{{name}}}}}"), value);
    }
    out
}

/// Load `{prompts_dir}/{name}` and split it on the marker.
pub fn load_split(
    prompts_dir: &Path,
    name: &str,
    vars: &[(&str, String)],
) -> Result<SplitPrompt, SummarizeError> {
    let path = prompts_dir.join(name);
    let text = std::fs::read_to_string(&path)
        .map_err(|_| SummarizeError::MissingTemplate(path.clone()))?;
    let rendered = render(&text, vars);
    Ok(match rendered.split_once(SPLIT_MARKER) {
        Some((system, user)) => SplitPrompt {
            system: system.trim().to_string(),
            user: user.trim().to_string(),
        },
        None => SplitPrompt {
            system: rendered.trim().to_string(),
            user: String::new(),
        },
    })
}
