//! Data types for documents, chunks, and search results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata key holding the originating filename.
pub const SOURCE_KEY: &str = "source";

/// Metadata key holding a chunk's position within its document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// Source label used for text that did not come from a file.
pub const DIRECT_TEXT_SOURCE: &str = "direct_text_input";

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document. For files this is the filename.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    pub metadata: HashMap<String, String>,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// The `source` metadata value, if any.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// A segment of a [`Document`] with its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Composite identifier `{document_id}_{chunk_index}`.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text. Empty until embedded.
    pub embedding: Vec<f32>,
    /// Key-value metadata inherited from the parent document plus chunk-specific fields.
    pub metadata: HashMap<String, String>,
    /// The ID of the parent [`Document`].
    pub document_id: String,
}

impl Chunk {
    /// Build an un-embedded chunk for position `index` of `document`.
    pub(crate) fn for_document(document: &Document, index: usize, text: String) -> Self {
        let mut metadata = document.metadata.clone();
        metadata.insert(CHUNK_INDEX_KEY.to_string(), index.to_string());
        Self {
            id: format!("{}_{index}", document.id),
            text,
            embedding: Vec::new(),
            metadata,
            document_id: document.id.clone(),
        }
    }

    /// The `source` metadata value, if any.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

impl SearchResult {
    /// Cosine distance derived from the similarity score (lower is closer).
    pub fn distance(&self) -> f32 {
        1.0 - self.score
    }
}
