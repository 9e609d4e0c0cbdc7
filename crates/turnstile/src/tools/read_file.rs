use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::spawn_blocking;
use turnstile_core::tool::{Error as ToolError, Tool, ToolResult};

const MAX_LINES: usize = 50;

/// A file and the line to start reading from.
#[derive(Deserialize, JsonSchema)]
pub struct ReadRange {
    #[schemars(description = "Absolute path to the file.")]
    path: String,
    #[schemars(description = "1-based line to start from, defaults to 1.")]
    start_line: Option<usize>,
}

/// Input of [`ReadFileTool`].
#[derive(Deserialize, JsonSchema)]
pub struct ReadFileInput {
    #[schemars(description = "Files to read.")]
    files: Vec<ReadRange>,
}

/// Reads files and returns their lines prefixed with line numbers.
pub struct ReadFileTool {
    parameter_schema: Value,
}

impl ReadFileTool {
    /// Creates a new read file tool.
    #[inline]
    pub fn new() -> Self {
        ReadFileTool {
            parameter_schema: schema_for!(ReadFileInput).to_value(),
        }
    }
}

impl Default for ReadFileTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for ReadFileTool {
    type Input = ReadFileInput;

    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read files from absolute paths. Returns up to 50 numbered lines of \
         each file, starting at the given 1-based line."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: ReadFileInput,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move {
            let mut files = Vec::with_capacity(input.files.len());
            for range in input.files {
                if !Path::new(&range.path).is_absolute() {
                    return Err(ToolError::invalid_input()
                        .with_reason("`path` must be absolute"));
                }
                let start_line = range.start_line.unwrap_or(1);
                if start_line == 0 {
                    return Err(ToolError::invalid_input()
                        .with_reason("`start_line` must be 1-based"));
                }

                let path = range.path;
                let section = spawn_blocking(move || {
                    let file = File::open(&path).map_err(|err| {
                        ToolError::execution_error()
                            .with_reason(format!("{path}: {err}"))
                    })?;
                    let content = numbered_lines(file, start_line)?;
                    Ok::<_, ToolError>(json!({
                        "path": path,
                        "content": content,
                    }))
                })
                .await
                .map_err(|_| {
                    ToolError::execution_error().with_reason("read task failed")
                })??;
                files.push(section);
            }
            Ok(json!({ "files": files }))
        }
    }
}

/// Formats at most [`MAX_LINES`] lines starting at `start_line` as
/// `<number>: <line>`, numbers right-aligned.
fn numbered_lines<R: Read>(
    reader: R,
    start_line: usize,
) -> Result<String, ToolError> {
    let lines = BufReader::new(reader)
        .lines()
        .skip(start_line - 1)
        .take(MAX_LINES)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            ToolError::execution_error().with_reason(err.to_string())
        })?;

    let Some(last_line) = lines.len().checked_sub(1) else {
        return Ok(String::new());
    };
    let width = (start_line + last_line).to_string().len();
    let mut content = String::new();
    for (offset, line) in lines.iter().enumerate() {
        let line_no = start_line + offset;
        content.push_str(&format!("{line_no:>width$}: {line}\n"));
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use turnstile_core::tool::ErrorKind;

    use super::*;

    #[test]
    fn test_numbered_lines() {
        let input = b"first\nsecond\nthird\n";
        let content = numbered_lines(Cursor::new(input), 2).unwrap();
        assert_eq!(content, "2: second\n3: third\n");

        let content = numbered_lines(Cursor::new(input), 7).unwrap();
        assert_eq!(content, "");
    }

    #[test]
    fn test_numbered_lines_limit() {
        let input = "line\n".repeat(MAX_LINES + 10);
        let content = numbered_lines(Cursor::new(input), 5).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), MAX_LINES);
        assert_eq!(lines[0], " 5: line");
        assert_eq!(lines[MAX_LINES - 1], "54: line");
    }

    #[tokio::test]
    async fn test_read_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Notes\nbuy milk\n").unwrap();
        let path = path.to_str().unwrap().to_owned();

        let tool = ReadFileTool::new();
        let result = tool
            .execute(ReadFileInput {
                files: vec![ReadRange {
                    path: path.clone(),
                    start_line: None,
                }],
            })
            .await
            .unwrap();
        assert_eq!(
            result,
            json!({
                "files": [{
                    "path": path,
                    "content": "1: # Notes\n2: buy milk\n",
                }]
            })
        );

        let err = tool
            .execute(ReadFileInput {
                files: vec![ReadRange {
                    path: "relative.md".to_owned(),
                    start_line: None,
                }],
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let missing = dir.path().join("missing.md");
        let err = tool
            .execute(ReadFileInput {
                files: vec![ReadRange {
                    path: missing.to_str().unwrap().to_owned(),
                    start_line: Some(1),
                }],
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionError);
    }
}
