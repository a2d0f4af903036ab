//! Runtime settings resolved from a secrets file and the environment.
//!
//! Lookup order for every key: `secrets.toml` (path overridable with
//! `DOCRAG_SECRETS_FILE`), then the process environment, which `.env` is
//! loaded into first. Numeric values that fail to parse fall back to their
//! defaults with a warning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::{ChunkStrategy, RagConfig};
use crate::error::{RagError, Result};
use crate::local::DEFAULT_STORE_DIR;
use crate::openai::{
    DEFAULT_AZURE_API_VERSION, DEFAULT_AZURE_EMBEDDING_DEPLOYMENT, DEFAULT_CHAT_MODEL,
    DEFAULT_EMBEDDING_MODEL, OPENAI_BASE_URL,
};

/// The default collection name.
pub const DEFAULT_COLLECTION: &str = "rag_documents";

/// The default limit on files indexed per `index` call.
pub const DEFAULT_MAX_DOCUMENTS: usize = 2;

const DEFAULT_SECRETS_FILE: &str = "secrets.toml";

/// Which service hosts the embedding and chat models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    Azure,
    OpenAI,
}

/// Which [`VectorStore`](crate::VectorStore) backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// JSON files under `store_dir`.
    #[default]
    Local,
    /// Process memory only.
    Memory,
    /// A Qdrant server at `qdrant_url` (requires the `qdrant` feature).
    Qdrant,
}

/// Key/value source: a parsed secrets file layered over the environment.
#[derive(Debug, Clone, Default)]
pub struct SecretSource {
    file: HashMap<String, String>,
}

impl SecretSource {
    /// Load `.env`, then the secrets file if it exists.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        let path = std::env::var("DOCRAG_SECRETS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SECRETS_FILE));
        if path.exists() { Self::from_file(&path) } else { Ok(Self::default()) }
    }

    /// Parse a flat TOML table. Non-string scalars are stringified.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RagError::ConfigError(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw)
            .map_err(|e| RagError::ConfigError(format!("failed to parse {}: {e}", path.display())))
    }

    fn from_toml(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        let table: toml::Table = raw.parse()?;
        let file = table
            .into_iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    toml::Value::String(s) => s,
                    toml::Value::Integer(i) => i.to_string(),
                    toml::Value::Float(f) => f.to_string(),
                    toml::Value::Boolean(b) => b.to_string(),
                    _ => return None,
                };
                Some((key, value))
            })
            .collect();
        Ok(Self { file })
    }

    /// Look up `key`, secrets file first.
    pub fn get(&self, key: &str) -> Option<String> {
        self.file.get(key).cloned().or_else(|| std::env::var(key).ok())
    }
}

/// Everything needed to assemble a [`QueryEngine`](crate::QueryEngine).
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub provider: Provider,
    pub azure_endpoint: Option<String>,
    pub azure_api_key: Option<String>,
    pub azure_api_version: String,
    pub azure_deployment: Option<String>,
    pub azure_embedding_deployment: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_chat_model: String,
    pub openai_embedding_model: String,
    pub rag: RagConfig,
    pub max_documents: usize,
    pub store: StoreBackend,
    pub store_dir: PathBuf,
    pub collection_name: String,
    pub qdrant_url: String,
    pub hf_api_token: Option<String>,
    pub ner_model: Option<String>,
}

impl Settings {
    /// Resolve settings from `.env`, the secrets file and the environment.
    pub fn load() -> Result<Self> {
        let source = SecretSource::load()?;
        Self::from_lookup(|key| source.get(key))
    }

    /// Resolve settings through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for unknown enum values or an
    /// inconsistent chunking configuration.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let number = |key: &str, default: usize| match get(key) {
            None => default,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(key, value = %raw, default, "invalid number, using default");
                default
            }),
        };

        let provider = match get("DOCRAG_PROVIDER").as_deref().map(str::to_ascii_lowercase) {
            None => Provider::Azure,
            Some(p) if p == "azure" => Provider::Azure,
            Some(p) if p == "openai" => Provider::OpenAI,
            Some(other) => {
                return Err(RagError::ConfigError(format!("unknown DOCRAG_PROVIDER '{other}'")));
            }
        };

        let store = match get("VECTOR_STORE").as_deref().map(str::to_ascii_lowercase) {
            None => StoreBackend::Local,
            Some(s) if s == "local" => StoreBackend::Local,
            Some(s) if s == "memory" => StoreBackend::Memory,
            Some(s) if s == "qdrant" => StoreBackend::Qdrant,
            Some(other) => {
                return Err(RagError::ConfigError(format!("unknown VECTOR_STORE '{other}'")));
            }
        };

        let defaults = RagConfig::default();
        let chunk_strategy = match get("CHUNK_STRATEGY") {
            Some(raw) => raw.parse::<ChunkStrategy>()?,
            None => defaults.chunk_strategy,
        };
        let mut rag = RagConfig::builder()
            .chunk_size(number("CHUNK_SIZE", defaults.chunk_size))
            .chunk_overlap(number("CHUNK_OVERLAP", defaults.chunk_overlap))
            .top_k(number("TOP_K", defaults.top_k))
            .chunk_strategy(chunk_strategy);
        if let Some(raw) = get("SIMILARITY_THRESHOLD") {
            match raw.parse::<f32>() {
                Ok(threshold) => rag = rag.similarity_threshold(threshold),
                Err(_) => warn!(value = %raw, "invalid SIMILARITY_THRESHOLD, ignoring"),
            }
        }

        Ok(Self {
            provider,
            azure_endpoint: get("AZURE_OPENAI_ENDPOINT"),
            azure_api_key: get("AZURE_OPENAI_API_KEY"),
            azure_api_version: get("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            azure_deployment: get("AZURE_OPENAI_DEPLOYMENT_NAME"),
            azure_embedding_deployment: get("AZURE_OPENAI_EMBEDDING_DEPLOYMENT_NAME")
                .unwrap_or_else(|| DEFAULT_AZURE_EMBEDDING_DEPLOYMENT.to_string()),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            openai_chat_model: get("OPENAI_CHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            openai_embedding_model: get("OPENAI_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            rag: rag.build()?,
            max_documents: number("MAX_DOCUMENTS", DEFAULT_MAX_DOCUMENTS),
            store,
            store_dir: get("VECTOR_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR)),
            collection_name: get("COLLECTION_NAME")
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            qdrant_url: get("QDRANT_URL").unwrap_or_else(|| "http://localhost:6334".to_string()),
            hf_api_token: get("HF_API_TOKEN"),
            ner_model: get("NER_MODEL"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_any_configuration() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.provider, Provider::Azure);
        assert_eq!(s.azure_api_version, "2023-05-15");
        assert_eq!(s.azure_embedding_deployment, "text-embedding-ada-002");
        assert_eq!(s.rag.chunk_size, 500);
        assert_eq!(s.rag.chunk_overlap, 50);
        assert_eq!(s.max_documents, 2);
        assert_eq!(s.store, StoreBackend::Local);
        assert_eq!(s.store_dir, PathBuf::from("./chroma_db"));
        assert_eq!(s.collection_name, "rag_documents");
        assert_eq!(s.azure_deployment, None);
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let s = settings(&[("CHUNK_SIZE", "big"), ("CHUNK_OVERLAP", "20"), ("MAX_DOCUMENTS", "-1")])
            .unwrap();
        assert_eq!(s.rag.chunk_size, 500);
        assert_eq!(s.rag.chunk_overlap, 20);
        assert_eq!(s.max_documents, 2);
    }

    #[test]
    fn inconsistent_chunking_is_rejected() {
        assert!(settings(&[("CHUNK_SIZE", "40"), ("CHUNK_OVERLAP", "40")]).is_err());
    }

    #[test]
    fn selects_openai_provider_and_memory_store() {
        let s = settings(&[
            ("DOCRAG_PROVIDER", "OpenAI"),
            ("VECTOR_STORE", "memory"),
            ("OPENAI_API_KEY", "sk-test"),
            ("CHUNK_STRATEGY", "markdown"),
        ])
        .unwrap();
        assert_eq!(s.provider, Provider::OpenAI);
        assert_eq!(s.store, StoreBackend::Memory);
        assert_eq!(s.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(s.rag.chunk_strategy, ChunkStrategy::Markdown);
        assert!(settings(&[("DOCRAG_PROVIDER", "cohere")]).is_err());
    }

    #[test]
    fn blank_values_count_as_unset() {
        let s = settings(&[("AZURE_OPENAI_DEPLOYMENT_NAME", "  ")]).unwrap();
        assert_eq!(s.azure_deployment, None);
    }

    #[test]
    fn secrets_file_values_are_stringified() {
        let source =
            SecretSource::from_toml("CHUNK_SIZE = 800\nAZURE_OPENAI_API_KEY = \"abc\"\n").unwrap();
        assert_eq!(source.file.get("CHUNK_SIZE").map(String::as_str), Some("800"));
        assert_eq!(source.get("AZURE_OPENAI_API_KEY").as_deref(), Some("abc"));
    }
}
