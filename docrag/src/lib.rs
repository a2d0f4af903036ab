//! # docrag
//!
//! Question answering over your own documents with retrieval-augmented
//! generation.
//!
//! ## Overview
//!
//! Documents are loaded ([`loader`]), split into overlapping chunks
//! ([`chunking`]), embedded ([`EmbeddingProvider`]) and stored in a
//! [`VectorStore`]. A question is embedded the same way, the nearest chunks
//! are pasted into a prompt, and the chat model's JSON reply is parsed into a
//! [`QueryResponse`]. Named entities can optionally be attached to answers.
//!
//! - [`RagPipeline`] - chunk, embed, store and retrieve
//! - [`QueryEngine`] - indexing and question answering with status payloads
//! - [`Settings`] - configuration from `secrets.toml`, `.env` and the environment
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docrag::{QueryEngine, Settings};
//!
//! let settings = Settings::load()?;
//! let engine = QueryEngine::from_settings(&settings, false).await?;
//!
//! let report = engine.index_document("handbook.pdf", None).await;
//! let response = engine.query("What is the refund policy?", settings.rag.top_k).await;
//! println!("{}", response.answer_text());
//! ```
//!
//! ## Vector Stores
//!
//! | Backend | Notes |
//! |---------|-------|
//! | [`LocalVectorStore`] | JSON files on disk (default, `./chroma_db`) |
//! | [`InMemoryVectorStore`] | Process memory, for tests |
//! | `QdrantVectorStore` | Qdrant server, `qdrant` feature |

pub mod answer;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod entities;
pub mod error;
pub mod inmemory;
pub mod llm;
pub mod loader;
pub mod local;
pub mod openai;
pub mod pipeline;
pub mod prompt;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod settings;
pub mod vectorstore;

pub use answer::{QueryResponse, parse_reply};
pub use chunking::{Chunker, FixedSizeChunker, MarkdownChunker, RecursiveChunker};
pub use config::{ChunkStrategy, RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, SearchResult};
pub use embedding::EmbeddingProvider;
pub use engine::{IndexReport, QueryEngine, QueryEngineBuilder, ResetReport, Status, StoreStats};
pub use entities::{DisabledEntityExtractor, Entity, EntityExtractor, HuggingFaceEntityExtractor};
pub use error::{RagError, Result};
pub use inmemory::InMemoryVectorStore;
pub use llm::{ChatMessage, ChatModel, ChatRequest, Role};
pub use local::LocalVectorStore;
pub use openai::{OpenAIChatModel, OpenAIEmbeddingProvider, OpenAIEndpoint};
pub use pipeline::{RagPipeline, RagPipelineBuilder};
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
pub use settings::{Provider, Settings, StoreBackend};
pub use vectorstore::VectorStore;
