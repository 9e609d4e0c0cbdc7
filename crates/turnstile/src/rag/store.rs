use std::cmp::Ordering;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use super::{Document, RagError, cosine_similarity};

/// A document with its embedding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    /// The document.
    #[serde(flatten)]
    pub document: Document,
    /// The embedding of the content.
    pub embedding: Vec<f32>,
}

/// A retrieved document with its similarity to the query.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrievalResult {
    /// The document.
    pub document: Document,
    /// The cosine similarity, higher is closer.
    pub score: f32,
}

/// An in-memory vector store, persisted as a JSON array.
#[derive(Clone, Debug, Default)]
pub struct VectorStore {
    documents: Vec<VectorDocument>,
}

impl VectorStore {
    /// Creates an empty store.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds documents with their embeddings, which must be given in the
    /// same order.
    pub fn add(
        &mut self,
        documents: Vec<Document>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<(), RagError> {
        if documents.len() != embeddings.len() {
            return Err(RagError::EmbeddingCount {
                expected: documents.len(),
                actual: embeddings.len(),
            });
        }
        self.documents.extend(
            documents
                .into_iter()
                .zip(embeddings)
                .map(|(document, embedding)| VectorDocument {
                    document,
                    embedding,
                }),
        );
        Ok(())
    }

    /// Returns the `top_k` documents most similar to the query embedding,
    /// best first.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<RetrievalResult> {
        let mut scored: Vec<_> = self
            .documents
            .iter()
            .map(|doc| (cosine_similarity(query, &doc.embedding), doc))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);
        scored
            .into_iter()
            .map(|(score, doc)| RetrievalResult {
                document: doc.document.clone(),
                score,
            })
            .collect()
    }

    /// Writes all documents to `path`.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), RagError> {
        let data = serde_json::to_vec_pretty(&self.documents)?;
        fs::write(path, data).await?;
        Ok(())
    }

    /// Replaces the content with the documents saved at `path`.
    pub async fn load(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<(), RagError> {
        let data = fs::read(path).await?;
        self.documents = serde_json::from_slice(&data)?;
        Ok(())
    }

    /// Removes all documents.
    #[inline]
    pub fn clear(&mut self) {
        self.documents.clear();
    }

    /// Returns the number of documents.
    #[inline]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns whether the store is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Returns the stored documents without embeddings.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter().map(|doc| &doc.document)
    }
}
