//! Parser for skill files with YAML frontmatter.
//!
//! Skill format:
//! ```text
//! ---
//! name: haiku
//! description: Write a haiku
//! tags: [poetry]
//! ---
//! Write a haiku about {{input}}.
//! ```

use serde::{Deserialize, Serialize};

use super::SkillDefinition;
use crate::error::{OuroborosError, OuroborosResult};

/// Parse skill file content into a SkillDefinition.
pub fn parse_skill(content: &str) -> OuroborosResult<SkillDefinition> {
    let (frontmatter, body) = extract_frontmatter(content).ok_or_else(|| OuroborosError::Skill {
        message: "Missing YAML frontmatter (expected --- delimiters)".into(),
    })?;

    let raw: SkillFrontmatter =
        serde_yaml::from_str(frontmatter).map_err(|e| OuroborosError::Skill {
            message: format!("Invalid YAML frontmatter: {e}"),
        })?;

    if raw.name.trim().is_empty() {
        return Err(OuroborosError::Skill {
            message: "Skill name must not be empty".into(),
        });
    }

    Ok(SkillDefinition {
        name: raw.name,
        description: raw.description,
        template: body.to_string(),
        tags: raw.tags,
        source_path: None,
    })
}

/// Render a skill back to its on-disk form.
pub fn to_markdown(skill: &SkillDefinition) -> OuroborosResult<String> {
    let frontmatter = SkillFrontmatter {
        name: skill.name.clone(),
        description: skill.description.clone(),
        tags: skill.tags.clone(),
    };
    let yaml = serde_yaml::to_string(&frontmatter).map_err(|e| OuroborosError::Skill {
        message: format!("Failed to serialize frontmatter: {e}"),
    })?;
    Ok(format!("---\n{}---\n{}\n", yaml, skill.template.trim_end()))
}

/// Extract YAML frontmatter between --- delimiters.
/// Returns (frontmatter, body) or None if delimiters aren't found.
fn extract_frontmatter(content: &str) -> Option<(&str, &str)> {
    let trimmed = content.trim_start();
    let after_first = trimmed.strip_prefix("---")?;
    let after_first = after_first.trim_start_matches(['\r', '\n']);

    let end_pos = after_first.find("\n---")?;
    let frontmatter = &after_first[..end_pos];
    let body = &after_first[end_pos + 4..];
    let body = body.trim_start_matches(['\r', '\n']);

    Some((frontmatter, body))
}

#[derive(Serialize, Deserialize)]
struct SkillFrontmatter {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}
