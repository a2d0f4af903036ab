//! Process-local vector store, plus the cosine ranking shared with
//! [`LocalVectorStore`](crate::LocalVectorStore).

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "InMemory";

#[derive(Debug, Default)]
struct MemoryCollection {
    dimensions: usize,
    chunks: HashMap<String, Chunk>,
}

/// Keeps every collection in memory; nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Cosine of the angle between `a` and `b`; 0.0 when either is all zeros.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Score every chunk against `embedding` and keep the best `top_k`.
///
/// Ties are broken by chunk id so results are deterministic.
pub(crate) fn rank<'a>(
    chunks: impl Iterator<Item = &'a Chunk>,
    embedding: &[f32],
    top_k: usize,
) -> Vec<SearchResult> {
    let mut scored: Vec<SearchResult> = chunks
        .map(|chunk| SearchResult {
            chunk: chunk.clone(),
            score: cosine_similarity(&chunk.embedding, embedding),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    scored.truncate(top_k);
    scored
}

pub(crate) fn missing_collection(backend: &str, collection: &str) -> RagError {
    RagError::VectorStoreError {
        backend: backend.to_string(),
        message: format!("collection '{collection}' does not exist"),
    }
}

/// Reject a vector whose length is not the collection's `dimensions`.
/// A collection with zero dimensions accepts any length.
pub(crate) fn check_dimensions(
    backend: &str,
    collection: &str,
    dimensions: usize,
    vector: &[f32],
) -> Result<()> {
    if dimensions == 0 || vector.len() == dimensions {
        return Ok(());
    }
    Err(RagError::VectorStoreError {
        backend: backend.to_string(),
        message: format!(
            "collection '{collection}' holds {dimensions}-dimensional vectors, got {}",
            vector.len()
        ),
    })
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| MemoryCollection { dimensions, chunks: HashMap::new() });
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store =
            collections.get_mut(collection).ok_or_else(|| missing_collection(BACKEND, collection))?;
        for chunk in chunks {
            check_dimensions(BACKEND, collection, store.dimensions, &chunk.embedding)?;
        }
        for chunk in chunks {
            store.chunks.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store =
            collections.get_mut(collection).ok_or_else(|| missing_collection(BACKEND, collection))?;
        for id in ids {
            store.chunks.remove(*id);
        }
        Ok(())
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store =
            collections.get_mut(collection).ok_or_else(|| missing_collection(BACKEND, collection))?;
        store.chunks.retain(|_, chunk| chunk.document_id != document_id);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let store =
            collections.get(collection).ok_or_else(|| missing_collection(BACKEND, collection))?;
        check_dimensions(BACKEND, collection, store.dimensions, embedding)?;
        Ok(rank(store.chunks.values(), embedding, top_k))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        let store =
            collections.get(collection).ok_or_else(|| missing_collection(BACKEND, collection))?;
        Ok(store.chunks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_orthogonal_and_parallel_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    fn chunk(id: &str, document_id: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: format!("text of {id}"),
            embedding,
            metadata: HashMap::new(),
            document_id: document_id.to_string(),
        }
    }

    #[tokio::test]
    async fn rejects_vectors_of_the_wrong_length() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", 2).await.unwrap();

        let err = store.upsert("docs", &[chunk("a_0", "a", vec![1.0, 0.0, 0.0, 0.0])]).await;
        assert!(matches!(err, Err(RagError::VectorStoreError { .. })));
        assert_eq!(store.count("docs").await.unwrap(), 0);

        store.upsert("docs", &[chunk("a_0", "a", vec![1.0, 0.0])]).await.unwrap();
        assert!(store.search("docs", &[1.0, 0.0, 0.0], 1).await.is_err());
        assert_eq!(store.search("docs", &[1.0, 0.0], 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_document_keeps_other_documents() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", 2).await.unwrap();
        store
            .upsert(
                "docs",
                &[
                    chunk("a_0", "a", vec![1.0, 0.0]),
                    chunk("a_1", "a", vec![0.0, 1.0]),
                    chunk("b_0", "b", vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        store.delete_document("docs", "a").await.unwrap();
        let remaining = store.search("docs", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].chunk.id, "b_0");
    }
}
