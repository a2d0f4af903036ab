//! [Qdrant](https://qdrant.tech/) backend, behind the `qdrant` feature.
//!
//! Qdrant point ids must be integers or UUIDs, so composite chunk ids such as
//! `manual.pdf_3` are mapped to a name-based UUID (v5). The original id, text,
//! parent document and metadata travel in the point payload.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointId, PointStruct, PointsIdsList, ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder,
    Value, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const CHUNK_ID_FIELD: &str = "chunk_id";
const TEXT_FIELD: &str = "text";
const DOCUMENT_ID_FIELD: &str = "document_id";
const METADATA_FIELD: &str = "metadata";

/// A [`VectorStore`] over a Qdrant server, using cosine distance.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Connect to the gRPC endpoint at `url`, e.g. `http://localhost:6334`.
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(qdrant_error)?;
        info!(url, "connected to qdrant");
        Ok(Self { client })
    }

    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }
}

fn qdrant_error(e: QdrantError) -> RagError {
    RagError::VectorStoreError { backend: "qdrant".to_string(), message: e.to_string() }
}

fn point_id(chunk_id: &str) -> PointId {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string().into()
}

fn to_point(chunk: &Chunk) -> Result<PointStruct> {
    let payload = json!({
        CHUNK_ID_FIELD: chunk.id,
        TEXT_FIELD: chunk.text,
        DOCUMENT_ID_FIELD: chunk.document_id,
        METADATA_FIELD: chunk.metadata,
    });
    let payload = to_payload(&chunk.id, payload)?;
    Ok(PointStruct::new(point_id(&chunk.id), chunk.embedding.clone(), payload))
}

fn to_payload(chunk_id: &str, value: serde_json::Value) -> Result<Payload> {
    Payload::try_from(value).map_err(|e| RagError::VectorStoreError {
        backend: "qdrant".to_string(),
        message: format!("invalid payload for chunk '{chunk_id}': {e}"),
    })
}

fn as_string(value: &Value) -> Option<String> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn from_scored(point: ScoredPoint) -> SearchResult {
    let field = |name: &str| point.payload.get(name).and_then(as_string).unwrap_or_default();

    let metadata = point.payload.get(METADATA_FIELD).map(|v| &v.kind);
    let metadata: HashMap<String, String> = match metadata {
        Some(Some(Kind::StructValue(fields))) => fields
            .fields
            .iter()
            .filter_map(|(key, value)| as_string(value).map(|v| (key.clone(), v)))
            .collect(),
        _ => HashMap::new(),
    };

    SearchResult {
        chunk: Chunk {
            id: field(CHUNK_ID_FIELD),
            text: field(TEXT_FIELD),
            embedding: Vec::new(),
            metadata,
            document_id: field(DOCUMENT_ID_FIELD),
        },
        score: point.score,
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if self.client.collection_exists(name).await.map_err(qdrant_error)? {
            debug!(collection = name, "qdrant collection already exists");
            return Ok(());
        }
        let vectors = VectorParamsBuilder::new(dimensions as u64, Distance::Cosine);
        self.client
            .create_collection(CreateCollectionBuilder::new(name).vectors_config(vectors))
            .await
            .map_err(qdrant_error)?;
        info!(collection = name, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        if self.client.collection_exists(name).await.map_err(qdrant_error)? {
            self.client.delete_collection(name).await.map_err(qdrant_error)?;
            info!(collection = name, "deleted qdrant collection");
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let points = chunks.iter().map(to_point).collect::<Result<Vec<_>>>()?;
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(qdrant_error)?;
        debug!(collection, count = chunks.len(), "upserted qdrant points");
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids = PointsIdsList { ids: ids.iter().map(|id| point_id(id)).collect() };
        self.client
            .delete_points(DeletePointsBuilder::new(collection).points(ids).wait(true))
            .await
            .map_err(qdrant_error)?;
        Ok(())
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<()> {
        let filter = Filter::must([Condition::matches(DOCUMENT_ID_FIELD, document_id.to_string())]);
        self.client
            .delete_points(DeletePointsBuilder::new(collection).points(filter).wait(true))
            .await
            .map_err(qdrant_error)?;
        debug!(collection, document_id, "deleted qdrant document points");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let request = SearchPointsBuilder::new(collection, embedding.to_vec(), top_k as u64)
            .with_payload(true);
        let response = self.client.search_points(request).await.map_err(qdrant_error)?;
        Ok(response.result.into_iter().map(from_scored).collect())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(qdrant_error)?;
        Ok(response.result.map_or(0, |r| r.count as usize))
    }
}
