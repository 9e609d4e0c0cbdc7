//! The configuration file of the command line program.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use turnstile_core::DEFAULT_MAX_ITERATIONS;
use turnstile_core::augment::DEFAULT_TOP_K;

use crate::rag::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

/// The session configuration. Every field is optional.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// The chat model, overriding `OPENAI_MODEL`.
    pub model: Option<String>,
    /// The system prompt, replacing the built-in one.
    pub system_prompt: Option<String>,
    /// How many model calls one user input may take.
    pub max_iterations: usize,
    /// MCP servers to connect to.
    pub mcp_servers: Vec<McpServerConfig>,
    /// A directory with one `SKILL.md` per subdirectory.
    pub skills_directory: Option<PathBuf>,
    /// Whether skills are offered. Defaults to whether a directory is set.
    pub enable_skills: Option<bool>,
    /// Whether guidance of matched skills is injected into user input.
    pub inject_matched_skills: bool,
    /// Retrieval of reference material.
    pub rag: Option<RagConfig>,
    /// Whether the built-in `workspace` tools are offered.
    pub builtin_tools: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: None,
            system_prompt: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            mcp_servers: vec![],
            skills_directory: None,
            enable_skills: None,
            inject_matched_skills: false,
            rag: None,
            builtin_tools: false,
        }
    }
}

impl Config {
    /// Loads the configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).with_context(|| {
            format!("failed to read config file {}", path.display())
        })?;
        Self::from_json(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parses the configuration from a JSON string.
    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Returns the skills directory if skills are enabled.
    pub fn skills_directory(&self) -> Option<&Path> {
        let dir = self.skills_directory.as_deref()?;
        self.enable_skills.unwrap_or(true).then_some(dir)
    }
}

/// How to reach an MCP server.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpServerConfig {
    /// A child process speaking over its standard streams.
    Stdio {
        /// The provider name, used as the tool namespace.
        name: String,
        /// The program to run.
        command: String,
        /// Arguments of the program.
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment variables.
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// A server speaking the streamable HTTP transport.
    Http {
        /// The provider name, used as the tool namespace.
        name: String,
        /// The endpoint URL.
        url: String,
        /// Extra request headers.
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl McpServerConfig {
    /// Returns the provider name.
    pub fn name(&self) -> &str {
        match self {
            McpServerConfig::Stdio { name, .. } => name,
            McpServerConfig::Http { name, .. } => name,
        }
    }
}

/// Retrieval settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RagConfig {
    /// Whether retrieval is on at startup.
    pub enabled: bool,
    /// Files or directories to index.
    pub sources: Vec<PathBuf>,
    /// How many chunks are retrieved per question.
    pub top_k: usize,
    /// The chunk size in characters.
    pub chunk_size: usize,
    /// How many characters adjacent chunks share.
    pub chunk_overlap: usize,
    /// Where the index is persisted. When the file exists, it is loaded
    /// instead of indexing `sources` again.
    pub index_path: Option<PathBuf>,
    /// Whether directories are scanned recursively.
    pub recursive: bool,
    /// File extensions to index, without the dot.
    pub extensions: Vec<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sources: vec![],
            top_k: DEFAULT_TOP_K,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            index_path: None,
            recursive: true,
            extensions: vec!["md".to_owned(), "txt".to_owned()],
        }
    }
}
