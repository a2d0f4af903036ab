//! Error type shared by every docrag component.

use thiserror::Error;

/// Everything that can go wrong while loading, indexing or answering.
///
/// Variants that wrap a remote or pluggable backend carry its name so logs
/// show which service failed.
#[derive(Debug, Error)]
pub enum RagError {
    /// A file could not be read or yielded no text.
    #[error("Loader error ({path}): {message}")]
    LoaderError { path: String, message: String },

    /// The loader has no reader for this extension.
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError { provider: String, message: String },

    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError { backend: String, message: String },

    /// The chat completion call failed or returned nothing usable.
    #[error("Model error ({provider}): {message}")]
    ModelError { provider: String, message: String },

    #[error("Entity extraction error ({extractor}): {message}")]
    EntityError { extractor: String, message: String },

    /// Missing credentials or inconsistent settings.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A pipeline step failed; the message names the document or collection.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

pub type Result<T> = std::result::Result<T, RagError>;
