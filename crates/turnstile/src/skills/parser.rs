use serde::{Deserialize, Deserializer};

/// The frontmatter of a skill file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SkillMetadata {
    /// The unique name, made of ASCII letters, digits, `-` and `_`.
    pub name: String,
    /// A one-line description shown to the model.
    pub description: String,
    /// Keywords suggesting the skill applies.
    #[serde(default)]
    pub triggers: Vec<String>,
    /// An optional version, kept as written.
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: Option<String>,
}

/// A parsed skill file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedSkill {
    /// The frontmatter.
    pub metadata: SkillMetadata,
    /// The text after the frontmatter, trimmed.
    pub body: String,
}

/// Errors of skill parsing.
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    /// The file does not start with a `---` line.
    #[error("the file must start with a frontmatter fenced by `---`")]
    MissingFrontmatter,
    /// The closing `---` line is missing.
    #[error("the frontmatter is not closed by `---`")]
    UnterminatedFrontmatter,
    /// The frontmatter is not valid YAML or lacks a field.
    #[error("invalid frontmatter: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// A required field is empty.
    #[error("the field `{0}` must not be empty")]
    EmptyField(&'static str),
    /// The name has characters other than letters, digits, `-` and `_`.
    #[error("invalid skill name: {0:?}")]
    InvalidName(String),
}

/// Returns whether `name` is a valid skill name.
pub fn is_valid_skill_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parses the content of a `SKILL.md` file.
pub fn parse_skill(content: &str) -> Result<ParsedSkill, SkillError> {
    let (frontmatter, body) = split_frontmatter(content)?;
    let metadata: SkillMetadata = serde_yaml::from_str(frontmatter)?;

    if metadata.name.trim().is_empty() {
        return Err(SkillError::EmptyField("name"));
    }
    if metadata.description.trim().is_empty() {
        return Err(SkillError::EmptyField("description"));
    }
    if !is_valid_skill_name(&metadata.name) {
        return Err(SkillError::InvalidName(metadata.name));
    }

    Ok(ParsedSkill {
        metadata,
        body: body.trim().to_owned(),
    })
}

fn split_frontmatter(content: &str) -> Result<(&str, &str), SkillError> {
    let content = content.trim_start();
    let mut lines = content.split_inclusive('\n');
    let Some(first) = lines.next().filter(|line| line.trim_end() == "---")
    else {
        return Err(SkillError::MissingFrontmatter);
    };

    let start = first.len();
    let mut offset = start;
    for line in lines {
        if line.trim_end() == "---" {
            let body = &content[offset + line.len()..];
            return Ok((&content[start..offset], body));
        }
        offset += line.len();
    }
    Err(SkillError::UnterminatedFrontmatter)
}

fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_yaml::Value::String(s)) => Some(s),
        Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
        Some(serde_yaml::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}
