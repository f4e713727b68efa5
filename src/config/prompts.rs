//! Prompt templates for the coach.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub coach: CoachPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: std::collections::HashMap<String, String>,
}

/// Prompts for cited coaching responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachPrompts {
    pub system: String,
    /// Turn prompt; receives `{{question}}` and `{{context}}`.
    pub user: String,
    /// Replaces `{{context}}` when retrieval found nothing.
    pub no_context: String,
}

impl Default for CoachPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are a virtual coach for educators working in Professional Learning Communities (PLCs).

Guidelines:
- Ground every answer in the numbered source excerpts supplied with the question
- Cite sources inline using their bracketed number, e.g. [1] or [2][3]
- Only cite numbers that appear in the supplied excerpts
- Relate advice to the four critical questions of a PLC when it helps
- If the excerpts do not cover the question, say so and offer general guidance clearly marked as such
- Be practical, encouraging and concise"#
                .to_string(),

            user: r#"Question: {{question}}

Relevant excerpts from the PLC library:

{{context}}

Answer the question using the excerpts above."#
                .to_string(),

            no_context: "(No relevant excerpts were found in the PLC library.)".to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&std::collections::HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let coach_path = custom_path.join("coach.toml");
            if coach_path.exists() {
                let content = std::fs::read_to_string(&coach_path)?;
                prompts.coach = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    ///
    /// Placeholders are expanded in one left-to-right pass, so substituted
    /// text is never expanded again. Unknown placeholders are kept as written.
    pub fn render(template: &str, vars: &std::collections::HashMap<String, String>) -> String {
        let mut result = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let key = &after[..end];
                    match vars.get(key) {
                        Some(value) => result.push_str(value),
                        None => {
                            result.push_str("{{");
                            result.push_str(key);
                            result.push_str("}}");
                        }
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    result.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        result.push_str(rest);
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(
        &self,
        template: &str,
        vars: &std::collections::HashMap<String, String>,
    ) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
