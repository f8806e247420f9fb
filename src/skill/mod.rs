//! Skills: named prompt templates the agent can learn and reuse.
//!
//! Skills live as `.md` files with YAML frontmatter under the skills
//! directory. The markdown body is the prompt template; `{{input}}` marks
//! where the user's input goes.

pub mod bridge;
pub mod parser;
pub mod registry;

pub use bridge::SkillTool;
pub use registry::SkillRegistry;

use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{OuroborosError, OuroborosResult};

/// A parsed skill definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub name: String,
    pub description: String,
    pub template: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
}

impl SkillDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            template: template.into(),
            tags: Vec::new(),
            source_path: None,
        }
    }

    /// Fill the template with `input`.
    ///
    /// Every `{{input}}` (inner whitespace allowed) is replaced. A template
    /// without the placeholder gets the input appended after a blank line.
    pub fn render(&self, input: &str) -> OuroborosResult<String> {
        let re = Regex::new(r"\{\{\s*input\s*\}\}").map_err(|e| OuroborosError::Skill {
            message: format!("Invalid placeholder pattern: {e}"),
        })?;

        let template = self.template.trim_end();
        if re.is_match(template) {
            return Ok(re.replace_all(template, regex::NoExpand(input)).into_owned());
        }
        if input.trim().is_empty() {
            return Ok(template.to_string());
        }
        Ok(format!("{template}\n\n{input}"))
    }
}

/// Normalise a user-supplied skill name into something safe to use as a
/// file stem and tool name: lowercase, spaces to `_`, `[a-z0-9_-]` only.
pub fn normalize_skill_name(name: &str) -> OuroborosResult<String> {
    let normalized: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();

    if normalized.is_empty()
        || !normalized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(OuroborosError::Skill {
            message: format!("Invalid skill name: '{name}'"),
        });
    }
    Ok(normalized)
}
