//! Filesystem-backed skill registry.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use dashmap::DashMap;

use super::parser::{parse_skill, to_markdown};
use super::{normalize_skill_name, SkillDefinition};
use crate::embedding::split_words;
use crate::error::{OuroborosError, OuroborosResult};

/// Holds loaded and learned skills. With a directory configured, learned
/// skills are written there as `<name>.md`.
pub struct SkillRegistry {
    dir: Option<PathBuf>,
    skills: DashMap<String, SkillDefinition>,
}

impl SkillRegistry {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            skills: DashMap::new(),
        }
    }

    /// A registry that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Load all `.md` and `.skill` files from the skills directory.
    /// A missing directory loads nothing; unparsable files are skipped.
    pub async fn load_dir(&self) -> OuroborosResult<usize> {
        let Some(dir) = &self.dir else {
            return Ok(0);
        };
        if !dir.exists() {
            return Ok(0);
        }

        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| OuroborosError::Skill {
            message: format!("Failed to read skills directory {:?}: {e}", dir),
        })?;

        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if ext != "md" && ext != "skill" {
                continue;
            }
            match self.load_file(&path).await {
                Ok(_) => count += 1,
                Err(e) => tracing::warn!("Failed to load skill {:?}: {e}", path),
            }
        }

        tracing::debug!(count, "skills loaded");
        Ok(count)
    }

    /// Load a single skill file.
    pub async fn load_file(&self, path: &Path) -> OuroborosResult<SkillDefinition> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut skill = parse_skill(&content)?;
        skill.name = normalize_skill_name(&skill.name)?;
        skill.source_path = Some(path.to_path_buf());
        self.skills.insert(skill.name.clone(), skill.clone());
        Ok(skill)
    }

    /// Create or replace a skill.
    pub async fn learn(
        &self,
        name: &str,
        description: &str,
        template: &str,
    ) -> OuroborosResult<SkillDefinition> {
        let name = normalize_skill_name(name)?;
        if template.trim().is_empty() {
            return Err(OuroborosError::Skill {
                message: format!("Skill '{name}' needs a template"),
            });
        }

        let mut skill = SkillDefinition::new(name, description.trim(), template.trim());
        if let Some(dir) = &self.dir {
            tokio::fs::create_dir_all(dir).await?;
            let path = dir.join(format!("{}.md", skill.name));
            tokio::fs::write(&path, to_markdown(&skill)?).await?;
            skill.source_path = Some(path);
        }

        tracing::info!(skill = %skill.name, "skill learned");
        self.skills.insert(skill.name.clone(), skill.clone());
        Ok(skill)
    }

    /// Lookup by name; accepts un-normalised names such as `"Haiku Writer"`.
    pub fn get(&self, name: &str) -> Option<SkillDefinition> {
        let key = normalize_skill_name(name).ok()?;
        self.skills.get(&key).map(|r| r.value().clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.skills.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// All skill definitions, sorted by name.
    pub fn definitions(&self) -> Vec<SkillDefinition> {
        let mut defs: Vec<SkillDefinition> = self.skills.iter().map(|r| r.value().clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// The skill sharing the most words with `query` (name, description,
    /// tags). Ties go to the alphabetically first name; no overlap is `None`.
    pub fn best_match(&self, query: &str) -> Option<SkillDefinition> {
        let wanted: HashSet<String> = split_words(query).into_iter().collect();
        if wanted.is_empty() {
            return None;
        }

        self.definitions()
            .into_iter()
            .filter_map(|skill| {
                let mut words: HashSet<String> = split_words(&skill.name).into_iter().collect();
                words.extend(split_words(&skill.description));
                for tag in &skill.tags {
                    words.extend(split_words(tag));
                }
                let score = wanted.intersection(&words).count();
                (score > 0).then_some((score, skill))
            })
            .fold(None, |best: Option<(usize, SkillDefinition)>, (score, skill)| match best {
                Some((best_score, _)) if best_score >= score => best,
                _ => Some((score, skill)),
            })
            .map(|(_, skill)| skill)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_dir_reads_skill_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("haiku.md"),
            "---\nname: haiku\ndescription: Write a haiku\n---\nHaiku about {{input}}",
        )
        .await
        .unwrap();
        tokio::fs::write(dir.path().join("broken.md"), "no frontmatter").await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "ignored").await.unwrap();

        let registry = SkillRegistry::new(Some(dir.path().to_path_buf()));
        assert_eq!(registry.load_dir().await.unwrap(), 1);
        let skill = registry.get("haiku").unwrap();
        assert_eq!(skill.source_path.unwrap(), dir.path().join("haiku.md"));
    }

    #[tokio::test]
    async fn load_dir_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SkillRegistry::new(Some(dir.path().join("nope")));
        assert_eq!(registry.load_dir().await.unwrap(), 0);
        assert_eq!(SkillRegistry::in_memory().load_dir().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn learn_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SkillRegistry::new(Some(dir.path().to_path_buf()));
        let skill = registry
            .learn("TL DR", "Summarise briefly", "Summarise in one line: {{input}}")
            .await
            .unwrap();
        assert_eq!(skill.name, "tl_dr");
        assert!(dir.path().join("tl_dr.md").exists());

        let fresh = SkillRegistry::new(Some(dir.path().to_path_buf()));
        fresh.load_dir().await.unwrap();
        let reloaded = fresh.get("tl dr").unwrap();
        assert_eq!(reloaded.description, "Summarise briefly");
        assert_eq!(reloaded.template.trim_end(), "Summarise in one line: {{input}}");
    }

    #[tokio::test]
    async fn learn_in_memory_and_validation() {
        let registry = SkillRegistry::in_memory();
        registry.learn("b", "", "B {{input}}").await.unwrap();
        registry.learn("a", "", "A {{input}}").await.unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert!(registry.get("a").unwrap().source_path.is_none());

        assert!(registry.learn("", "", "x").await.is_err());
        assert!(registry.learn("empty", "", "   ").await.is_err());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn best_match_uses_keyword_overlap() {
        let registry = SkillRegistry::in_memory();
        registry
            .learn("haiku", "write a short poem", "Haiku: {{input}}")
            .await
            .unwrap();
        registry
            .learn("translate", "translate text into french", "French: {{input}}")
            .await
            .unwrap();

        assert_eq!(registry.best_match("please write a poem").unwrap().name, "haiku");
        assert_eq!(
            registry.best_match("Translate this into French").unwrap().name,
            "translate"
        );
        assert!(registry.best_match("quantum chromodynamics").is_none());
        assert!(registry.best_match("").is_none());
    }
}
