//! Chat completion model trait and request types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Sampling temperature used for answer generation.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Completion token budget used for answer generation.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// The author of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// A single chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the model for a JSON object reply.
    pub json_response: bool,
}

impl ChatRequest {
    /// A request with the answer-generation defaults: temperature 0.3,
    /// 1000 max tokens, JSON object replies.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            json_response: true,
        }
    }
}

/// A hosted chat completion model.
///
/// Implementations return the text content of the first choice.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model or deployment name, for logging.
    fn name(&self) -> &str;

    /// Run one completion and return the reply text.
    async fn complete(&self, request: ChatRequest) -> Result<String>;
}
