use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use turnstile_core::augment::{BoxError, DEFAULT_TOP_K, Retriever};

use super::{
    Document, DocumentProcessor, Embedder, RagError, RetrievalResult,
    VectorStore,
};
use crate::config::RagConfig;

const EMBEDDING_BATCH_SIZE: usize = 64;

/// Indexes documents and retrieves the chunks relevant to a question.
pub struct RagRetriever {
    embedder: Arc<dyn Embedder>,
    processor: DocumentProcessor,
    store: RwLock<VectorStore>,
    top_k: usize,
}

impl RagRetriever {
    /// Creates a retriever with an empty index.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            processor: DocumentProcessor::default(),
            store: RwLock::new(VectorStore::new()),
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Creates a retriever from the settings and fills its index.
    ///
    /// A saved index at `index_path` is loaded as is. Otherwise every
    /// source is indexed, and the index is saved when a path is set.
    pub async fn from_config(
        config: &RagConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RagError> {
        let processor =
            DocumentProcessor::new(config.chunk_size, config.chunk_overlap)
                .with_recursive(config.recursive)
                .with_extensions(config.extensions.iter().cloned());
        let retriever = Self::new(embedder)
            .with_processor(processor)
            .with_top_k(config.top_k);

        if let Some(index_path) = &config.index_path {
            if fs::try_exists(index_path).await? {
                retriever.load(index_path).await?;
                info!(
                    "loaded {} chunks from {}",
                    retriever.len().await,
                    index_path.display()
                );
                return Ok(retriever);
            }
        }

        for source in &config.sources {
            retriever.index_path(source).await?;
        }
        if let Some(index_path) = &config.index_path {
            retriever.save(index_path).await?;
        }
        Ok(retriever)
    }

    /// Sets how documents are loaded and chunked.
    #[inline]
    pub fn with_processor(mut self, processor: DocumentProcessor) -> Self {
        self.processor = processor;
        self
    }

    /// Sets how many chunks [`RagRetriever::retrieve`] returns by default.
    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Loads, chunks and indexes a file or directory. Returns the number
    /// of chunks added.
    pub async fn index_path(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<usize, RagError> {
        let path = path.as_ref();
        let documents = self.processor.load_documents(path).await?;
        if documents.is_empty() {
            warn!("no documents found under {}", path.display());
            return Ok(0);
        }
        let chunks = self.processor.split_documents(&documents);
        let count = chunks.len();
        self.add_documents(chunks).await?;
        info!(
            "indexed {} documents from {} as {count} chunks",
            documents.len(),
            path.display()
        );
        Ok(count)
    }

    /// Embeds and adds documents as they are, without chunking. Blank
    /// documents are skipped.
    pub async fn add_documents(
        &self,
        mut documents: Vec<Document>,
    ) -> Result<(), RagError> {
        documents.retain(|doc| {
            let blank = doc.content.trim().is_empty();
            if blank {
                debug!("skipping blank document {}", doc.id);
            }
            !blank
        });
        let mut embeddings = Vec::with_capacity(documents.len());
        for batch in documents.chunks(EMBEDDING_BATCH_SIZE) {
            let texts: Vec<_> =
                batch.iter().map(|doc| doc.content.clone()).collect();
            embeddings.extend(self.embedder.embed(&texts).await?);
        }
        self.store.write().await.add(documents, embeddings)
    }

    /// Returns the chunks most similar to `query`, best first. `top_k`
    /// defaults to the configured value.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievalResult>, RagError> {
        let store = self.store.read().await;
        if store.is_empty() {
            debug!("the index is empty, nothing to retrieve");
            return Ok(vec![]);
        }
        let top_k = top_k.unwrap_or(self.top_k);
        let query_embedding = self
            .embedder
            .embed(&[query.to_owned()])
            .await?
            .pop()
            .unwrap_or_default();
        let results = store.search(&query_embedding, top_k);
        for (idx, result) in results.iter().enumerate() {
            trace!(
                "retrieved #{} ({:.4}): {}",
                idx + 1,
                result.score,
                result.document.metadata.source
            );
        }
        Ok(results)
    }

    /// Renders the retrieved chunks as numbered blocks with their source,
    /// or an empty string when nothing was retrieved.
    pub async fn retrieve_context(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<String, RagError> {
        let results = self.retrieve(query, Some(top_k)).await?;
        Ok(render_context(&results))
    }

    /// Saves the index as JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), RagError> {
        self.store.read().await.save(path).await
    }

    /// Replaces the index with one saved by [`RagRetriever::save`].
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<(), RagError> {
        self.store.write().await.load(path).await
    }

    /// Drops the whole index.
    pub async fn clear(&self) {
        self.store.write().await.clear();
    }

    /// Returns the number of indexed chunks.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    /// Returns whether nothing is indexed.
    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }
}

fn render_context(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(idx, result)| {
            let source = match result.document.metadata.source.as_str() {
                "" => "unknown",
                source => source,
            };
            format!(
                "[Document {}] (source: {source})\n{}",
                idx + 1,
                result.document.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[async_trait]
impl Retriever for RagRetriever {
    async fn retrieve_context(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<String, BoxError> {
        Ok(RagRetriever::retrieve_context(self, query, top_k).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const TOPICS: [&str; 3] = ["cat", "dog", "fish"];

    /// Counts topic words, which is enough to rank texts by topic.
    #[derive(Default)]
    struct TopicEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for TopicEmbedder {
        async fn embed(
            &self,
            texts: &[String],
        ) -> Result<Vec<Vec<f32>>, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // The embeddings endpoint rejects blank input.
            if texts.iter().any(|text| text.trim().is_empty()) {
                return Err(RagError::Status {
                    status: 400,
                    body: "blank input".to_owned(),
                });
            }
            Ok(texts
                .iter()
                .map(|text| {
                    let text = text.to_lowercase();
                    TOPICS
                        .iter()
                        .map(|topic| text.matches(topic).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    fn docs() -> Vec<Document> {
        vec![
            Document::new("1", "Cats purr. A cat sleeps.", "cats.md"),
            Document::new("2", "Dogs bark at the dog park.", "dogs.md"),
            Document::new("3", "Fish swim.", ""),
        ]
    }

    #[tokio::test]
    async fn test_retrieve_context() {
        let retriever = RagRetriever::new(Arc::new(TopicEmbedder::default()));
        retriever.add_documents(docs()).await.unwrap();
        assert_eq!(retriever.len().await, 3);

        let context = retriever
            .retrieve_context("tell me about my cat", 1)
            .await
            .unwrap();
        assert_eq!(
            context,
            "[Document 1] (source: cats.md)\nCats purr. A cat sleeps."
        );

        let context =
            retriever.retrieve_context("fish or dog", 2).await.unwrap();
        let blocks: Vec<_> = context.split("\n\n---\n\n").collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("[Document 1] "));
        assert!(blocks[1].starts_with("[Document 2] "));
        assert!(context.contains("(source: unknown)\nFish swim."));
    }

    #[tokio::test]
    async fn test_empty_index() {
        let embedder = Arc::new(TopicEmbedder::default());
        let retriever = RagRetriever::new(embedder.clone());
        let context = retriever.retrieve_context("cat", 3).await.unwrap();
        assert_eq!(context, "");
        // The query is not embedded when there is nothing to compare with.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_index_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let docs_dir = dir.path().join("docs");
        std::fs::create_dir(&docs_dir).unwrap();
        std::fs::write(docs_dir.join("cats.md"), "A cat. ".repeat(40)).unwrap();
        std::fs::write(docs_dir.join("dogs.txt"), "A dog.").unwrap();

        let retriever = RagRetriever::new(Arc::new(TopicEmbedder::default()))
            .with_processor(DocumentProcessor::new(100, 20))
            .with_top_k(1);
        let count = retriever.index_path(&docs_dir).await.unwrap();
        assert!(count > 2);

        let results = retriever.retrieve("dog", None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.content, "A dog.");

        let index = dir.path().join("index.json");
        retriever.save(&index).await.unwrap();
        retriever.clear().await;
        assert!(retriever.is_empty().await);

        retriever.load(&index).await.unwrap();
        assert_eq!(retriever.len().await, count);

        let empty = dir.path().join("empty");
        std::fs::create_dir(&empty).unwrap();
        assert_eq!(retriever.index_path(&empty).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_from_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cats.md"), "A cat.").unwrap();
        std::fs::write(dir.path().join("dogs.md"), "A dog.").unwrap();
        let index = dir.path().join("index.json");
        let config = RagConfig {
            sources: vec![
                dir.path().join("cats.md"),
                dir.path().join("dogs.md"),
            ],
            top_k: 1,
            index_path: Some(index.clone()),
            ..Default::default()
        };

        let embedder = Arc::new(TopicEmbedder::default());
        let retriever =
            RagRetriever::from_config(&config, embedder.clone()).await.unwrap();
        assert_eq!(retriever.len().await, 2);
        assert!(index.exists());
        let results = retriever.retrieve("cat", None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.content, "A cat.");

        // The saved index is reused, so the sources are not embedded again.
        let embedder = Arc::new(TopicEmbedder::default());
        let retriever =
            RagRetriever::from_config(&config, embedder.clone()).await.unwrap();
        assert_eq!(retriever.len().await, 2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_sources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.md"), "").unwrap();
        std::fs::write(dir.path().join("blank.md"), " \n\n ").unwrap();
        std::fs::write(dir.path().join("cats.md"), "A cat.").unwrap();
        let config = RagConfig {
            sources: vec![dir.path().to_owned()],
            ..Default::default()
        };

        let embedder = Arc::new(TopicEmbedder::default());
        let retriever =
            RagRetriever::from_config(&config, embedder).await.unwrap();
        assert_eq!(retriever.len().await, 1);

        retriever
            .add_documents(vec![Document::new("e", "", "e.md")])
            .await
            .unwrap();
        assert_eq!(retriever.len().await, 1);
    }

    #[tokio::test]
    async fn test_as_retriever() {
        let retriever = RagRetriever::new(Arc::new(TopicEmbedder::default()));
        retriever.add_documents(docs()).await.unwrap();
        let retriever: Arc<dyn Retriever> = Arc::new(retriever);
        let context = retriever.retrieve_context("dog", 1).await.unwrap();
        assert!(context.contains("Dogs bark"));
    }
}
