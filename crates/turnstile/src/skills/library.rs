use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;
use tokio::fs;
use turnstile_core::tool::{Error as ToolError, READ_SKILL_TOOL, SkillSource};
use turnstile_model::ModelTool;

use super::parser::{SkillMetadata, parse_skill};

const SKILL_FILE: &str = "SKILL.md";

/// A loaded skill.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Skill {
    /// The frontmatter.
    pub metadata: SkillMetadata,
    /// The guide without the frontmatter.
    pub body: String,
    /// The whole file, as returned by `read_skill`.
    pub content: String,
    /// Where the skill was loaded from.
    pub path: PathBuf,
}

impl Skill {
    /// Returns the skill name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    fn trigger_hits(&self, lowercase_input: &str) -> usize {
        self.metadata
            .triggers
            .iter()
            .filter(|trigger| !trigger.is_empty())
            .filter(|trigger| lowercase_input.contains(&trigger.to_lowercase()))
            .count()
    }
}

/// The skills found in a directory, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct SkillLibrary {
    skills: BTreeMap<String, Skill>,
}

impl SkillLibrary {
    /// Creates an empty library.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `SKILL.md` of every immediate subdirectory of `dir`.
    ///
    /// Invalid skill files are skipped with a warning. A missing directory
    /// yields an empty library.
    pub async fn load(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let mut library = Self::new();
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) => {
                let dir = dir.display();
                warn!("skills directory {dir} is unavailable: {err}");
                return library;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!("failed to scan {}: {err}", dir.display());
                    break;
                }
            };
            let is_dir = entry
                .file_type()
                .await
                .is_ok_and(|file_type| file_type.is_dir());
            if !is_dir {
                continue;
            }
            let path = entry.path().join(SKILL_FILE);
            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(err) => {
                    debug!("skipping {}: {err}", path.display());
                    continue;
                }
            };
            match parse_skill(&content) {
                Ok(parsed) => library.insert(Skill {
                    metadata: parsed.metadata,
                    body: parsed.body,
                    content,
                    path,
                }),
                Err(err) => warn!("invalid skill {}: {err}", path.display()),
            }
        }

        info!("loaded {} skills from {}", library.len(), dir.display());
        library
    }

    /// Adds a skill, replacing the one with the same name.
    pub fn insert(&mut self, skill: Skill) {
        if let Some(old) = self.skills.insert(skill.name().to_owned(), skill) {
            warn!("skill {} is defined more than once", old.name());
        }
    }

    /// Returns the number of skills.
    #[inline]
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// Returns whether there are no skills.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Returns a skill by name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    /// Returns the skill names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.skills.keys().map(String::as_str)
    }

    /// Returns the skills whose triggers occur in `input`, ignoring case,
    /// the ones with more hits first.
    pub fn match_skills(&self, input: &str) -> Vec<&Skill> {
        let input = input.to_lowercase();
        let mut matched: Vec<_> = self
            .skills
            .values()
            .map(|skill| (skill.trigger_hits(&input), skill))
            .filter(|(hits, _)| *hits > 0)
            .collect();
        matched.sort_by(|a, b| b.0.cmp(&a.0));
        matched.into_iter().map(|(_, skill)| skill).collect()
    }
}

/// Renders the guides of `skills` as a block put before the user input.
pub fn render_guidance(skills: &[&Skill]) -> String {
    if skills.is_empty() {
        return String::new();
    }
    let mut lines = vec![
        "=== Relevant skill guides ===".to_owned(),
        String::new(),
        "Follow these guides strictly for this task:".to_owned(),
        String::new(),
    ];
    for skill in skills {
        lines.push(format!("--- Skill: {} ---", skill.name()));
        lines.push(skill.body.clone());
        lines.push(String::new());
    }
    lines.push("=== End of skill guides ===".to_owned());
    lines.join("\n")
}

#[async_trait]
impl SkillSource for SkillLibrary {
    fn summary(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut lines = vec![
            "## Skills".to_owned(),
            String::new(),
            format!(
                "1. Before working on a task a skill covers, call the \
                 `{READ_SKILL_TOOL}` tool to read its full guide."
            ),
            "2. The triggers help you decide when a skill applies.".to_owned(),
            "3. Once a guide is read, follow it strictly.".to_owned(),
            "4. Keep to the output formats a skill defines.".to_owned(),
            String::new(),
            "The following skills are available:".to_owned(),
        ];
        for skill in self.skills.values() {
            let SkillMetadata {
                name,
                description,
                triggers,
                ..
            } = &skill.metadata;
            lines.push(format!("- **{name}**: {description}"));
            if !triggers.is_empty() {
                lines.push(format!("  Triggers: {}", triggers.join(", ")));
            }
        }
        lines.join("\n")
    }

    fn tool_definition(&self) -> Option<ModelTool> {
        if self.is_empty() {
            return None;
        }
        let names: Vec<_> = self.names().collect();
        Some(ModelTool {
            name: READ_SKILL_TOOL.to_owned(),
            description: "Reads the full guide of a skill.".to_owned(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "skillName": {
                        "type": "string",
                        "description": format!(
                            "The skill to read. Available skills: {}",
                            names.join(", ")
                        ),
                        "enum": names,
                    }
                },
                "required": ["skillName"],
            }),
        })
    }

    async fn read(&self, name: &str) -> Result<String, ToolError> {
        match self.get(name) {
            Some(skill) => Ok(skill.content.clone()),
            None => Err(ToolError::skill_not_found()
                .with_reason(format!("no such skill: {name}"))),
        }
    }

    fn matched_context(&self, input: &str) -> Option<String> {
        let matched = self.match_skills(input);
        if matched.is_empty() {
            return None;
        }
        debug!("{} skills matched the input", matched.len());
        Some(render_guidance(&matched))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use turnstile_core::tool::ErrorKind;

    use super::*;

    fn write_skill(root: &Path, dir: &str, content: &str) {
        let dir = root.join(dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(SKILL_FILE), content).unwrap();
    }

    async fn fixture_library() -> (tempfile::TempDir, SkillLibrary) {
        let root = tempfile::tempdir().unwrap();
        write_skill(
            root.path(),
            "poem",
            "---\nname: poem\ndescription: Writes poems.\n\
             triggers: [poem, rhyme]\n---\nUse rhymes.\n",
        );
        write_skill(
            root.path(),
            "haiku",
            "---\nname: haiku\ndescription: Writes haiku.\n\
             triggers: [haiku, poem]\n---\nFive, seven, five.\n",
        );
        write_skill(root.path(), "broken", "no frontmatter here");
        write_skill(
            root.path(),
            "bad-name",
            "---\nname: bad name\ndescription: x\n---\n",
        );
        fs::create_dir_all(root.path().join("empty")).unwrap();
        fs::write(root.path().join("SKILL.md"), "not in a subdirectory")
            .unwrap();

        let library = SkillLibrary::load(root.path()).await;
        (root, library)
    }

    #[tokio::test]
    async fn test_load() {
        let (_root, library) = fixture_library().await;
        assert_eq!(library.names().collect::<Vec<_>>(), ["haiku", "poem"]);
        let poem = library.get("poem").unwrap();
        assert_eq!(poem.body, "Use rhymes.");
        assert!(poem.content.starts_with("---\nname: poem"));

        let missing = SkillLibrary::load("/nonexistent/skills").await;
        assert!(missing.is_empty());
        assert_eq!(missing.summary(), "");
        assert_eq!(missing.tool_definition(), None);
    }

    #[tokio::test]
    async fn test_summary_and_tool() {
        let (_root, library) = fixture_library().await;
        let summary = library.summary();
        assert!(summary.contains("- **poem**: Writes poems."));
        assert!(summary.contains("  Triggers: poem, rhyme"));
        assert!(summary.contains(READ_SKILL_TOOL));

        let tool = library.tool_definition().unwrap();
        assert_eq!(tool.name, READ_SKILL_TOOL);
        assert_eq!(
            tool.parameters["properties"]["skillName"]["enum"],
            json!(["haiku", "poem"])
        );
    }

    #[tokio::test]
    async fn test_read() {
        let (_root, library) = fixture_library().await;
        let content = library.read("haiku").await.unwrap();
        assert!(content.ends_with("Five, seven, five.\n"));

        let err = library.read("sonnet").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SkillNotFound);
    }

    #[tokio::test]
    async fn test_match_skills() {
        let (_root, library) = fixture_library().await;
        let names = |input: &str| {
            library
                .match_skills(input)
                .iter()
                .map(|skill| skill.name().to_owned())
                .collect::<Vec<_>>()
        };
        assert_eq!(names("Write a POEM that will rhyme"), ["poem", "haiku"]);
        assert_eq!(names("a haiku"), ["haiku"]);
        assert!(names("hello").is_empty());

        let guidance = library.matched_context("a haiku").unwrap();
        assert!(guidance.contains("--- Skill: haiku ---\nFive, seven, five."));
        assert_eq!(library.matched_context("hello"), None);
    }
}
