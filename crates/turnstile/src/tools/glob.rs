use std::path::Path;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::spawn_blocking;
use turnstile_core::tool::{Error as ToolError, Tool, ToolResult};

const MAX_MATCHES: usize = 50;

/// Input of [`GlobTool`].
#[derive(Deserialize, JsonSchema)]
pub struct GlobInput {
    #[schemars(description = "The glob pattern, relative to `path`.")]
    pattern: String,
    #[schemars(description = "Absolute path of the directory to search in.")]
    path: String,
}

/// Lists the files matching a glob pattern.
pub struct GlobTool {
    parameter_schema: Value,
}

impl GlobTool {
    /// Creates a new glob tool.
    #[inline]
    pub fn new() -> Self {
        GlobTool {
            parameter_schema: schema_for!(GlobInput).to_value(),
        }
    }
}

impl Default for GlobTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for GlobTool {
    type Input = GlobInput;

    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files and directories matching a glob pattern such as `*.md` \
         or `**/*.rs`. Returns at most 50 paths."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: GlobInput,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move {
            let pattern = full_pattern(&input)?;
            let paths = glob::glob(&pattern).map_err(|err| {
                ToolError::invalid_input().with_reason(err.to_string())
            })?;

            let (matches, truncated) = spawn_blocking(move || {
                let mut matches = vec![];
                let mut paths = paths.flatten();
                for path in paths.by_ref().take(MAX_MATCHES) {
                    matches.push(path.to_string_lossy().into_owned());
                }
                (matches, paths.next().is_some())
            })
            .await
            .map_err(|_| {
                ToolError::execution_error().with_reason("glob task failed")
            })?;

            debug!("glob {pattern} matched {} paths", matches.len());
            Ok(json!({ "matches": matches, "truncated": truncated }))
        }
    }
}

fn full_pattern(input: &GlobInput) -> Result<String, ToolError> {
    if Path::new(&input.pattern).is_absolute() {
        return Err(ToolError::invalid_input()
            .with_reason("`pattern` must be relative to `path`"));
    }
    if !Path::new(&input.path).is_absolute() {
        return Err(
            ToolError::invalid_input().with_reason("`path` must be absolute")
        );
    }
    let mut pattern = glob::Pattern::escape(&input.path);
    if !pattern.ends_with('/') {
        pattern.push('/');
    }
    pattern.push_str(&input.pattern);
    Ok(pattern)
}

#[cfg(test)]
mod tests {
    use turnstile_core::tool::ErrorKind;

    use super::*;

    fn input(pattern: &str, path: &str) -> GlobInput {
        GlobInput {
            pattern: pattern.to_owned(),
            path: path.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_input_validation() {
        let tool = GlobTool::new();

        let err = tool.execute(input("*.rs", "relative/path")).await;
        assert_eq!(err.unwrap_err().kind(), ErrorKind::InvalidInput);

        let err = tool.execute(input("/*.rs", "/tmp")).await;
        assert_eq!(err.unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_matches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("notes")).unwrap();
        std::fs::write(dir.path().join("a.md"), "").unwrap();
        std::fs::write(dir.path().join("notes/b.md"), "").unwrap();
        std::fs::write(dir.path().join("c.txt"), "").unwrap();
        let root = dir.path().to_str().unwrap();

        let tool = GlobTool::new();
        let result = tool.execute(input("**/*.md", root)).await.unwrap();
        let mut matches: Vec<_> = result["matches"]
            .as_array()
            .unwrap()
            .iter()
            .map(|path| path.as_str().unwrap().to_owned())
            .collect();
        matches.sort();
        assert_eq!(matches.len(), 2);
        assert!(matches[0].ends_with("a.md"));
        assert!(matches[1].ends_with("notes/b.md"));
        assert_eq!(result["truncated"], json!(false));
    }

    #[tokio::test]
    async fn test_truncated() {
        let dir = tempfile::tempdir().unwrap();
        for idx in 0..(MAX_MATCHES + 1) {
            std::fs::write(dir.path().join(format!("{idx}.txt")), "").unwrap();
        }
        let root = dir.path().to_str().unwrap();

        let result = GlobTool::new().execute(input("*", root)).await.unwrap();
        assert_eq!(result["matches"].as_array().unwrap().len(), MAX_MATCHES);
        assert_eq!(result["truncated"], json!(true));
    }
}
