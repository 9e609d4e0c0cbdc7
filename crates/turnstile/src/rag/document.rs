use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use super::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, RagError};

/// A piece of text with where it came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// The identifier, unique within an index.
    pub id: String,
    /// The text.
    pub content: String,
    /// Where the text came from.
    pub metadata: DocumentMetadata,
}

/// The origin of a [`Document`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// The file path or any other origin.
    pub source: String,
    /// The position of the chunk in its document, if it is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    /// How many chunks the document was split into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
}

impl Document {
    /// Creates a document that is not a chunk of another one.
    pub fn new<S1, S2, S3>(id: S1, content: S2, source: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: DocumentMetadata {
                source: source.into(),
                ..Default::default()
            },
        }
    }
}

/// Loads text files and splits them into chunks.
#[derive(Clone, Debug)]
pub struct DocumentProcessor {
    chunk_size: usize,
    chunk_overlap: usize,
    recursive: bool,
    extensions: Vec<String>,
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl DocumentProcessor {
    /// Creates a processor. The chunk size is at least one character and
    /// the overlap is kept below it.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            recursive: true,
            extensions: vec!["md".to_owned(), "txt".to_owned()],
        }
    }

    /// Sets whether subdirectories are scanned.
    #[inline]
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Sets the extensions of the files to load, without the dot.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Loads a file, or the matching files under a directory.
    ///
    /// Files that are not valid UTF-8 are skipped with a warning.
    pub async fn load_documents(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Vec<Document>, RagError> {
        let path = path.as_ref();
        let files = if fs::metadata(path).await?.is_dir() {
            self.collect_files(path).await?
        } else {
            vec![path.to_owned()]
        };

        let mut documents = Vec::with_capacity(files.len());
        for file in files {
            match fs::read_to_string(&file).await {
                Ok(content) => {
                    let source = file.to_string_lossy().into_owned();
                    documents.push(Document::new(
                        source.clone(),
                        content,
                        source,
                    ));
                }
                Err(err) => warn!("skipping {}: {err}", file.display()),
            }
        }
        Ok(documents)
    }

    async fn collect_files(
        &self,
        root: &Path,
    ) -> Result<Vec<PathBuf>, RagError> {
        let mut files = vec![];
        let mut pending = vec![root.to_owned()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if self.recursive {
                        pending.push(path);
                    }
                } else if file_type.is_file() && self.has_extension(&path) {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions.iter().any(|allowed| allowed == ext)
            })
    }

    /// Splits every document into chunks carrying their position.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Document> {
        let mut chunks = vec![];
        for doc in documents {
            let pieces = self.split_text(&doc.content);
            let total = pieces.len();
            chunks.extend(pieces.into_iter().enumerate().map(
                |(index, content)| Document {
                    id: format!("{}_chunk_{index}", doc.id),
                    content,
                    metadata: DocumentMetadata {
                        source: doc.metadata.source.clone(),
                        chunk_index: Some(index),
                        total_chunks: Some(total),
                    },
                },
            ));
        }
        chunks
    }

    /// Splits text into chunks of at most `chunk_size` characters, where
    /// adjacent chunks share about `chunk_overlap` characters.
    ///
    /// A chunk preferably ends at a paragraph, sentence or line boundary
    /// found in the second half of its window. Chunks are trimmed, and
    /// blank text yields no chunk.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return vec![];
        }
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.chunk_size {
            return vec![text.to_owned()];
        }

        let mut chunks = vec![];
        let mut start = 0;
        loop {
            let mut end = (start + self.chunk_size).min(chars.len());
            if end < chars.len() {
                if let Some(boundary) = find_boundary(&chars, start, end) {
                    end = boundary;
                }
            }
            let chunk: String = chars[start..end].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_owned());
            }
            if end >= chars.len() {
                break;
            }
            start = end.saturating_sub(self.chunk_overlap).max(start + 1);
        }
        chunks
    }
}

const SENTENCE_ENDS: [char; 3] = ['.', '!', '?'];
const WIDE_SENTENCE_ENDS: [char; 3] = ['。', '！', '？'];

/// Returns the end of the best chunk in `chars[start..end]`, looking only
/// at the second half of the window.
fn find_boundary(chars: &[char], start: usize, end: usize) -> Option<usize> {
    let min = start + (end - start) / 2;
    let window = min.max(1)..end;

    let paragraph = window
        .clone()
        .rev()
        .find(|&i| chars[i] == '\n' && chars[i - 1] == '\n');
    if let Some(i) = paragraph {
        return Some(i + 1);
    }

    let sentence = window.clone().rev().find(|&i| {
        let next_is_space = chars.get(i + 1).is_none_or(|c| c.is_whitespace());
        WIDE_SENTENCE_ENDS.contains(&chars[i])
            || (SENTENCE_ENDS.contains(&chars[i]) && next_is_space)
    });
    if let Some(i) = sentence {
        return Some(i + 1);
    }

    window.rev().find(|&i| chars[i] == '\n').map(|i| i + 1)
}
