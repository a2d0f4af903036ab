//! Chunk, embed, store and retrieve.
//!
//! [`RagPipeline`] owns no state of its own; it wires a [`Chunker`], an
//! [`EmbeddingProvider`] and a [`VectorStore`] together and tags every
//! failure with the collection or document it concerns.
//!
//! ```rust,ignore
//! use docrag::{InMemoryVectorStore, RagPipeline, loader};
//!
//! let pipeline = RagPipeline::builder()
//!     .embedding_provider(Arc::new(embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! pipeline.create_collection("rag_documents").await?;
//! pipeline.ingest("rag_documents", &loader::from_text("Ferris is a crab.", None)).await?;
//! let hits = pipeline.query("rag_documents", "who is Ferris?").await?;
//! ```

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::chunking::{Chunker, chunker_for};
use crate::config::RagConfig;
use crate::document::{Chunk, Document, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
}

fn pipeline_error(context: String, e: RagError) -> RagError {
    error!(error = %e, "{context}");
    RagError::PipelineError(format!("{context}: {e}"))
}

impl RagPipeline {
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Create `name` sized for the embedding provider's vectors.
    pub async fn create_collection(&self, name: &str) -> Result<()> {
        self.vector_store
            .create_collection(name, self.embedding_provider.dimensions())
            .await
            .map_err(|e| pipeline_error(format!("failed to create collection '{name}'"), e))
    }

    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        self.vector_store
            .delete_collection(name)
            .await
            .map_err(|e| pipeline_error(format!("failed to delete collection '{name}'"), e))
    }

    /// Empty `name` by dropping and recreating it.
    pub async fn reset_collection(&self, name: &str) -> Result<()> {
        self.delete_collection(name).await?;
        self.create_collection(name).await?;
        info!(collection = name, "reset collection");
        Ok(())
    }

    pub async fn count(&self, collection: &str) -> Result<usize> {
        self.vector_store
            .count(collection)
            .await
            .map_err(|e| pipeline_error(format!("failed to count collection '{collection}'"), e))
    }

    /// Split `document` without embedding or storing anything.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.chunker.chunk(document)
    }

    /// Chunk `document`, embed all chunks in one batch and store them in
    /// place of any chunks already stored for the same document id.
    ///
    /// Returns the stored chunks with their embeddings. A document with no
    /// text stores nothing.
    pub async fn ingest(&self, collection: &str, document: &Document) -> Result<Vec<Chunk>> {
        let mut chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            debug!(document.id = %document.id, "document produced no chunks");
            return Ok(chunks);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
            pipeline_error(format!("embedding failed for document '{}'", document.id), e)
        })?;
        if vectors.len() != chunks.len() {
            return Err(RagError::PipelineError(format!(
                "document '{}' produced {} chunks but {} embeddings",
                document.id,
                chunks.len(),
                vectors.len()
            )));
        }
        chunks.iter_mut().zip(vectors).for_each(|(chunk, vector)| chunk.embedding = vector);

        // An earlier version of the document may have had more chunks.
        self.vector_store.delete_document(collection, &document.id).await.map_err(|e| {
            pipeline_error(format!("failed to replace document '{}'", document.id), e)
        })?;
        self.vector_store.upsert(collection, &chunks).await.map_err(|e| {
            pipeline_error(format!("failed to store document '{}'", document.id), e)
        })?;

        info!(
            document.id = %document.id,
            collection,
            chunk_count = chunks.len(),
            "ingested document"
        );
        Ok(chunks)
    }

    /// [`ingest`](Self::ingest) each document in turn, stopping at the first
    /// failure.
    pub async fn ingest_batch(
        &self,
        collection: &str,
        documents: &[Document],
    ) -> Result<Vec<Chunk>> {
        let mut stored = Vec::new();
        for document in documents {
            stored.extend(self.ingest(collection, document).await?);
        }
        Ok(stored)
    }

    /// Retrieve with the configured `top_k`.
    pub async fn query(&self, collection: &str, query: &str) -> Result<Vec<SearchResult>> {
        self.query_with_top_k(collection, query, self.config.top_k).await
    }

    /// Embed `query` and return the `top_k` closest chunks, best first.
    ///
    /// When a similarity threshold is configured, weaker hits are dropped.
    pub async fn query_with_top_k(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let vector = self
            .embedding_provider
            .embed(query)
            .await
            .map_err(|e| pipeline_error("query embedding failed".to_string(), e))?;

        let mut results = self
            .vector_store
            .search(collection, &vector, top_k)
            .await
            .map_err(|e| pipeline_error(format!("search failed in collection '{collection}'"), e))?;

        if let Some(threshold) = self.config.similarity_threshold {
            results.retain(|r| r.score >= threshold);
        }

        info!(collection, top_k, result_count = results.len(), "retrieved chunks");
        Ok(results)
    }
}

/// Builds a [`RagPipeline`].
///
/// The embedding provider and vector store are required. The config defaults
/// to [`RagConfig::default()`] and the chunker to the one its
/// `chunk_strategy` names.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl RagPipelineBuilder {
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// # Errors
    ///
    /// [`RagError::ConfigError`] when the provider or store is missing.
    pub fn build(self) -> Result<RagPipeline> {
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let config = self.config.unwrap_or_default();
        let chunker = self.chunker.unwrap_or_else(|| chunker_for(&config));

        Ok(RagPipeline { config, embedding_provider, vector_store, chunker })
    }
}
