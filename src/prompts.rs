use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Error, Result};

const DEFAULT_SYSTEM: &str = include_str!("default_prompts/classify-system.md");
const DEFAULT_COMMENT: &str = include_str!("default_prompts/classify-comment.md");

/// Known template variable names for validation.
const KNOWN_VARIABLES: &[&str] = &["main_comment", "reply"];

/// Name of the system instruction template.
pub const SYSTEM_TEMPLATE: &str = "system";
/// Name of the per-comment instruction template.
pub const COMMENT_TEMPLATE: &str = "comment";

fn default_template(name: &str) -> Option<&'static str> {
    match name {
        SYSTEM_TEMPLATE => Some(DEFAULT_SYSTEM),
        COMMENT_TEMPLATE => Some(DEFAULT_COMMENT),
        _ => None,
    }
}

fn template_filename(name: &str) -> String {
    format!("classify-{name}.md")
}

/// Prompt template engine with default templates and user overrides.
#[derive(Debug, Clone)]
pub struct PromptEngine {
    override_dir: Option<PathBuf>,
}

impl PromptEngine {
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self { override_dir }
    }

    /// Load a prompt template by name.
    /// User overrides in `override_dir` take precedence over defaults.
    pub fn load_template(&self, name: &str) -> Result<String> {
        if let Some(ref dir) = self.override_dir {
            let path = dir.join(template_filename(name));
            if path.exists() {
                return std::fs::read_to_string(&path).map_err(|e| {
                    Error::Prompt(format!(
                        "failed to read override template {}: {e}",
                        path.display()
                    ))
                });
            }
        }

        default_template(name)
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Prompt(format!("unknown prompt template: {name}")))
    }

    /// Load a template and render it with the given variables.
    pub fn render(&self, name: &str, vars: &HashMap<String, String>) -> Result<String> {
        let template = self.load_template(name)?;
        render_template(&template, vars)
    }

    /// Render the system and user instructions for one comment.
    pub fn classification_prompt(&self, main_comment: &str, reply: &str) -> Result<(String, String)> {
        let vars = HashMap::from([
            ("main_comment".to_string(), main_comment.to_string()),
            ("reply".to_string(), reply.to_string()),
        ]);
        let system = self.render(SYSTEM_TEMPLATE, &vars)?;
        let user = self.render(COMMENT_TEMPLATE, &vars)?;
        Ok((system.trim().to_string(), user))
    }
}

/// Substitute `{{variable}}` placeholders. Unknown names, missing values and
/// unclosed placeholders are errors. Substituted text is never re-scanned.
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            return Err(Error::Prompt(format!(
                "unclosed template variable: {{{{{after}"
            )));
        };

        let name = after[..close].trim();
        if !KNOWN_VARIABLES.contains(&name) {
            return Err(Error::Prompt(format!("unknown template variable: {name}")));
        }
        let value = vars.get(name).ok_or_else(|| {
            Error::Prompt(format!("missing value for template variable: {name}"))
        })?;
        out.push_str(value);
        rest = &after[close + 2..];
    }

    out.push_str(rest);
    Ok(out)
}
