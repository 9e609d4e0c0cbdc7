//! Retrieval of reference material.
//!
//! Documents are split into overlapping chunks, embedded and kept in an
//! in-memory [`VectorStore`]. The [`RagRetriever`] ranks the chunks by
//! cosine similarity to the question and renders the best ones as the
//! reference text used by the augmentation step.

mod document;
mod embedding;
mod retriever;
mod store;

pub use document::{Document, DocumentMetadata, DocumentProcessor};
pub use embedding::{Embedder, OpenAIEmbedder, cosine_similarity};
pub use retriever::RagRetriever;
pub use store::{RetrievalResult, VectorDocument, VectorStore};

/// The default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// The default number of characters shared by adjacent chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// The embedding model used unless `OPENAI_EMBEDDING_MODEL` is set.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Errors of the retrieval subsystem.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Reading or writing a file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A saved index or a response is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The embedding request failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The embedding service rejected the request.
    #[error("embedding service responded with status {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The response body.
        body: String,
    },
    /// The number of embeddings does not match the number of texts.
    #[error("expected {expected} embeddings, got {actual}")]
    #[allow(missing_docs)]
    EmbeddingCount { expected: usize, actual: usize },
}
