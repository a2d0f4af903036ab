//! Query and indexing front end.
//!
//! [`QueryEngine`] is the boundary the CLI talks to. Its operations never
//! return errors for per-request failures; they report them in the payload
//! instead so an interactive session can carry on.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::answer::{QueryResponse, parse_reply};
use crate::document::{Document, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::entities::{
    DisabledEntityExtractor, Entity, EntityExtractor, HuggingFaceEntityExtractor, dedupe_entities,
};
use crate::error::{RagError, Result};
use crate::inmemory::InMemoryVectorStore;
use crate::llm::ChatModel;
use crate::loader;
use crate::local::LocalVectorStore;
use crate::openai::{OpenAIChatModel, OpenAIEmbeddingProvider, OpenAIEndpoint};
use crate::pipeline::RagPipeline;
use crate::prompt::answer_request;
use crate::settings::{DEFAULT_COLLECTION, Provider, Settings, StoreBackend};
use crate::vectorstore::VectorStore;

/// Outcome of indexing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IndexReport {
    Success { document: String, chunks: usize, total_documents: usize },
    Error { document: String, error: String },
}

impl IndexReport {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Outcome of [`QueryEngine::reset_index`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetReport {
    pub status: Status,
    pub message: String,
}

/// Size of the engine's collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub collection_name: String,
    pub count: usize,
}

/// Indexes documents and answers questions over them.
pub struct QueryEngine {
    pipeline: Arc<RagPipeline>,
    chat_model: Arc<dyn ChatModel>,
    entity_extractor: Arc<dyn EntityExtractor>,
    collection: String,
    use_entity_extraction: bool,
}

impl QueryEngine {
    pub fn builder() -> QueryEngineBuilder {
        QueryEngineBuilder::default()
    }

    /// Assemble an engine from resolved [`Settings`].
    ///
    /// Entity extraction is only switched on when requested and a
    /// Hugging Face token is available; otherwise it is disabled with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for missing credentials or an
    /// unavailable store backend, or any error from opening the store.
    pub async fn from_settings(settings: &Settings, use_entity_extraction: bool) -> Result<Self> {
        let (embedding_provider, chat_model) = model_clients(settings)?;
        let vector_store = open_vector_store(settings).await?;

        let pipeline = RagPipeline::builder()
            .config(settings.rag.clone())
            .embedding_provider(embedding_provider)
            .vector_store(vector_store)
            .build()?;

        let entity_extractor: Arc<dyn EntityExtractor> =
            match (use_entity_extraction, settings.hf_api_token.as_deref()) {
                (false, _) => Arc::new(DisabledEntityExtractor),
                (true, None) => {
                    warn!("HF_API_TOKEN not set, entity extraction disabled");
                    Arc::new(DisabledEntityExtractor)
                }
                (true, Some(token)) => {
                    let mut extractor = HuggingFaceEntityExtractor::new(token)?;
                    if let Some(model) = &settings.ner_model {
                        extractor = extractor.with_model(model);
                    }
                    Arc::new(extractor)
                }
            };

        Self::builder()
            .pipeline(Arc::new(pipeline))
            .chat_model(chat_model)
            .entity_extractor(entity_extractor)
            .collection(&settings.collection_name)
            .use_entity_extraction(use_entity_extraction)
            .build()
            .await
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn pipeline(&self) -> &Arc<RagPipeline> {
        &self.pipeline
    }

    /// Whether queries will run entity extraction.
    pub fn entities_enabled(&self) -> bool {
        self.use_entity_extraction && self.entity_extractor.is_enabled()
    }

    /// Load, chunk, embed and store one file.
    ///
    /// `original_filename` overrides the name recorded as the chunk source,
    /// for uploads saved under a temporary path.
    pub async fn index_document(
        &self,
        path: impl AsRef<Path>,
        original_filename: Option<&str>,
    ) -> IndexReport {
        let path = path.as_ref();
        let document_name = original_filename.map(str::to_string).unwrap_or_else(|| {
            path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
        });

        let document = match loader::load_file(path, original_filename) {
            Ok(document) => document,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to load document");
                return IndexReport::Error { document: document_name, error: e.to_string() };
            }
        };

        self.index(document_name, &document).await
    }

    /// Chunk, embed and store raw text. Without metadata the source is
    /// `direct_text_input`.
    pub async fn index_text(
        &self,
        text: &str,
        metadata: Option<HashMap<String, String>>,
    ) -> IndexReport {
        let document = loader::from_text(text, metadata);
        self.index(document.id.clone(), &document).await
    }

    async fn index(&self, document_name: String, document: &Document) -> IndexReport {
        let result = async {
            let chunks = self.pipeline.ingest(&self.collection, document).await?;
            let total = self.pipeline.count(&self.collection).await?;
            Ok::<_, RagError>((chunks.len(), total))
        }
        .await;

        match result {
            Ok((chunks, total_documents)) => {
                info!(document = %document_name, chunks, total_documents, "indexed document");
                IndexReport::Success { document: document_name, chunks, total_documents }
            }
            Err(e) => {
                error!(document = %document_name, error = %e, "failed to index document");
                IndexReport::Error { document: document_name, error: e.to_string() }
            }
        }
    }

    /// Answer `query` from the `top_k` most similar chunks.
    ///
    /// Failures anywhere in retrieval or generation become an error answer.
    pub async fn query(&self, query: &str, top_k: usize) -> QueryResponse {
        match self.try_query(query, top_k).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "query failed");
                QueryResponse::from_error(e)
            }
        }
    }

    async fn try_query(&self, query: &str, top_k: usize) -> Result<QueryResponse> {
        info!(query_len = query.len(), top_k, "processing query");

        let results = self.pipeline.query_with_top_k(&self.collection, query, top_k).await?;

        let entities = if self.entities_enabled() {
            self.collect_entities(query, &results).await
        } else {
            Vec::new()
        };

        let request = answer_request(query, &results);
        let reply = self.chat_model.complete(request).await?;

        Ok(parse_reply(&reply, entities))
    }

    /// Entities from the query, then from each retrieved chunk in order.
    async fn collect_entities(&self, query: &str, results: &[SearchResult]) -> Vec<Entity> {
        let mut all = self.extract_or_empty(query).await;
        for result in results {
            all.extend(self.extract_or_empty(&result.chunk.text).await);
        }
        dedupe_entities(all)
    }

    async fn extract_or_empty(&self, text: &str) -> Vec<Entity> {
        self.entity_extractor.extract(text).await.unwrap_or_else(|e| {
            warn!(error = %e, "entity extraction failed");
            Vec::new()
        })
    }

    /// Remove every indexed chunk.
    pub async fn reset_index(&self) -> ResetReport {
        match self.pipeline.reset_collection(&self.collection).await {
            Ok(()) => ResetReport {
                status: Status::Success,
                message: "Vector store reset successfully".to_string(),
            },
            Err(e) => {
                error!(collection = %self.collection, error = %e, "reset failed");
                ResetReport {
                    status: Status::Error,
                    message: format!("Error resetting vector store: {e}"),
                }
            }
        }
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let count = self.pipeline.count(&self.collection).await?;
        Ok(StoreStats { collection_name: self.collection.clone(), count })
    }
}

/// Builder for [`QueryEngine`]. `pipeline` and `chat_model` are required.
#[derive(Default)]
pub struct QueryEngineBuilder {
    pipeline: Option<Arc<RagPipeline>>,
    chat_model: Option<Arc<dyn ChatModel>>,
    entity_extractor: Option<Arc<dyn EntityExtractor>>,
    collection: Option<String>,
    use_entity_extraction: bool,
}

impl QueryEngineBuilder {
    pub fn pipeline(mut self, pipeline: Arc<RagPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn chat_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.chat_model = Some(model);
        self
    }

    pub fn entity_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.entity_extractor = Some(extractor);
        self
    }

    /// Collection to index into and query. Defaults to `rag_documents`.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    pub fn use_entity_extraction(mut self, enabled: bool) -> Self {
        self.use_entity_extraction = enabled;
        self
    }

    /// Build the engine and make sure its collection exists.
    pub async fn build(self) -> Result<QueryEngine> {
        let pipeline = self
            .pipeline
            .ok_or_else(|| RagError::ConfigError("pipeline is required".to_string()))?;
        let chat_model = self
            .chat_model
            .ok_or_else(|| RagError::ConfigError("chat_model is required".to_string()))?;
        let collection = self.collection.unwrap_or_else(|| DEFAULT_COLLECTION.to_string());

        pipeline.create_collection(&collection).await?;

        Ok(QueryEngine {
            pipeline,
            chat_model,
            entity_extractor: self
                .entity_extractor
                .unwrap_or_else(|| Arc::new(DisabledEntityExtractor)),
            collection,
            use_entity_extraction: self.use_entity_extraction,
        })
    }
}

fn required(value: &Option<String>, key: &str) -> Result<String> {
    value
        .clone()
        .ok_or_else(|| RagError::ConfigError(format!("{key} environment variable not set")))
}

/// Embedding provider and chat model for the configured [`Provider`].
fn model_clients(
    settings: &Settings,
) -> Result<(Arc<dyn EmbeddingProvider>, Arc<dyn ChatModel>)> {
    match settings.provider {
        Provider::Azure => {
            let endpoint = OpenAIEndpoint::azure(
                required(&settings.azure_endpoint, "AZURE_OPENAI_ENDPOINT")?,
                required(&settings.azure_api_key, "AZURE_OPENAI_API_KEY")?,
                &settings.azure_api_version,
            );
            let embedder = OpenAIEmbeddingProvider::with_endpoint(
                endpoint.clone(),
                &settings.azure_embedding_deployment,
            )?;
            let chat = OpenAIChatModel::new(
                endpoint,
                settings.azure_deployment.clone().unwrap_or_default(),
            )?;
            Ok((Arc::new(embedder), Arc::new(chat)))
        }
        Provider::OpenAI => {
            let endpoint = OpenAIEndpoint::compatible(
                &settings.openai_base_url,
                required(&settings.openai_api_key, "OPENAI_API_KEY")?,
            );
            let embedder = OpenAIEmbeddingProvider::with_endpoint(
                endpoint.clone(),
                &settings.openai_embedding_model,
            )?;
            let chat = OpenAIChatModel::new(endpoint, &settings.openai_chat_model)?;
            Ok((Arc::new(embedder), Arc::new(chat)))
        }
    }
}

/// Open the configured [`VectorStore`] backend.
pub async fn open_vector_store(settings: &Settings) -> Result<Arc<dyn VectorStore>> {
    match settings.store {
        StoreBackend::Local => Ok(Arc::new(LocalVectorStore::open(&settings.store_dir).await?)),
        StoreBackend::Memory => Ok(Arc::new(InMemoryVectorStore::new())),
        #[cfg(feature = "qdrant")]
        StoreBackend::Qdrant => {
            Ok(Arc::new(crate::qdrant::QdrantVectorStore::new(&settings.qdrant_url)?))
        }
        #[cfg(not(feature = "qdrant"))]
        StoreBackend::Qdrant => Err(RagError::ConfigError(
            "VECTOR_STORE=qdrant requires the `qdrant` feature".to_string(),
        )),
    }
}
