//! Storage and nearest-neighbour lookup for embedded chunks.

use async_trait::async_trait;

use crate::document::{Chunk, SearchResult};
use crate::error::Result;

/// Named collections of embedded [`Chunk`]s.
///
/// Chunks are keyed by id, so upserting a chunk id that is already present
/// replaces it. Chunks and query vectors whose length differs from the
/// collection's `dimensions` are rejected. Backends:
/// [`InMemoryVectorStore`](crate::InMemoryVectorStore),
/// [`LocalVectorStore`](crate::LocalVectorStore) and, with the `qdrant`
/// feature, `QdrantVectorStore`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create `name` for vectors of length `dimensions`. Existing collections
    /// are left untouched.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Drop `name` with everything in it. Missing collections are ignored.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<()>;

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()>;

    /// Remove every chunk whose `document_id` is `document_id`.
    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<()>;

    /// At most `top_k` chunks closest to `embedding`, best first.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Number of chunks in `collection`.
    async fn count(&self, collection: &str) -> Result<usize>;
}
