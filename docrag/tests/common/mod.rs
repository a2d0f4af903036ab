//! Deterministic stand-ins for the network-backed providers.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docrag::{
    ChatModel, ChatRequest, EmbeddingProvider, Entity, EntityExtractor, InMemoryVectorStore,
    RagConfig, RagError, RagPipeline, Result,
};

pub const DIM: usize = 64;

/// Bag-of-words embedding: each lowercase word bumps one hashed dimension.
pub struct HashEmbedder;

fn bucket(word: &str) -> usize {
    let hash = word.bytes().fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3));
    (hash % DIM as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0; DIM];
        for word in text.split_whitespace() {
            let word: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
            if !word.is_empty() {
                v[bucket(&word.to_lowercase())] += 1.0;
            }
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// An embedder whose every call fails.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::EmbeddingError { provider: "test".into(), message: "service unavailable".into() })
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Replies with a fixed string and remembers the requests it saw.
#[derive(Default)]
pub struct ScriptedChatModel {
    reply: String,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatModel {
    pub fn replying(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { reply: reply.into(), requests: Mutex::new(Vec::new()) })
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request);
        Ok(self.reply.clone())
    }
}

/// Tags every capitalised word as `ORG`; fails on text containing `boom`.
pub struct CapitalisedWords;

#[async_trait]
impl EntityExtractor for CapitalisedWords {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn extract(&self, text: &str) -> Result<Vec<Entity>> {
        if text.contains("boom") {
            return Err(RagError::EntityError { extractor: "test".into(), message: "boom".into() });
        }
        Ok(text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
            .map(|w| Entity {
                entity_type: "ORG".into(),
                text: w.into(),
                score: 0.9,
                start: Some(0),
                end: Some(w.len()),
            })
            .collect())
    }
}

pub fn pipeline(embedder: Arc<dyn EmbeddingProvider>, config: RagConfig) -> Arc<RagPipeline> {
    Arc::new(
        RagPipeline::builder()
            .config(config)
            .embedding_provider(embedder)
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .build()
            .unwrap(),
    )
}
