//! Optional named-entity extraction.
//!
//! [`HuggingFaceEntityExtractor`] calls a token-classification model on the
//! Hugging Face Inference API (default `dslim/bert-base-NER`) with the
//! `simple` aggregation strategy, so each entity arrives as one grouped span.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{RagError, Result};

/// The default Hugging Face Inference API base URL.
pub const HF_INFERENCE_URL: &str = "https://api-inference.huggingface.co/models";

/// The default token-classification model.
pub const DEFAULT_NER_MODEL: &str = "dslim/bert-base-NER";

fn default_score() -> f32 {
    1.0
}

/// A named entity found in text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    /// Entity group, e.g. `PER`, `ORG`, `LOC`, `MISC`.
    #[serde(rename = "type")]
    pub entity_type: String,
    pub text: String,
    #[serde(default = "default_score")]
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
}

/// Extracts named entities from text.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Whether this extractor can produce anything at all.
    fn is_enabled(&self) -> bool;

    /// Extract entities from `text`.
    async fn extract(&self, text: &str) -> Result<Vec<Entity>>;
}

/// An extractor that never finds anything. Used when extraction is off or
/// no backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledEntityExtractor;

#[async_trait]
impl EntityExtractor for DisabledEntityExtractor {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn extract(&self, _text: &str) -> Result<Vec<Entity>> {
        Ok(Vec::new())
    }
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters,
}

#[derive(Serialize)]
struct InferenceParameters {
    aggregation_strategy: &'static str,
}

#[derive(Deserialize)]
struct HfEntity {
    #[serde(alias = "entity")]
    entity_group: String,
    word: String,
    score: f32,
    start: Option<usize>,
    end: Option<usize>,
}

impl From<HfEntity> for Entity {
    fn from(e: HfEntity) -> Self {
        Self {
            entity_type: e.entity_group,
            text: e.word,
            score: e.score,
            start: e.start,
            end: e.end,
        }
    }
}

/// An [`EntityExtractor`] backed by the Hugging Face Inference API.
pub struct HuggingFaceEntityExtractor {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_token: String,
}

impl HuggingFaceEntityExtractor {
    /// Create an extractor for the default model using `api_token`.
    pub fn new(api_token: impl Into<String>) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(RagError::EntityError {
                extractor: "HuggingFace".into(),
                message: "API token must not be empty".into(),
            });
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: HF_INFERENCE_URL.to_string(),
            model: DEFAULT_NER_MODEL.to_string(),
            api_token,
        })
    }

    /// Use a different token-classification model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point at a self-hosted inference server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.model)
    }

    fn entity_error(&self, message: impl Into<String>) -> RagError {
        RagError::EntityError {
            extractor: format!("HuggingFace:{}", self.model),
            message: message.into(),
        }
    }
}

#[async_trait]
impl EntityExtractor for HuggingFaceEntityExtractor {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn extract(&self, text: &str) -> Result<Vec<Entity>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.model, text_len = text.len(), "extracting entities");

        let body = InferenceRequest {
            inputs: text,
            parameters: InferenceParameters { aggregation_strategy: "simple" },
        };
        let response = self
            .client
            .post(self.url())
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(model = %self.model, error = %e, "entity request failed");
                self.entity_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!(model = %self.model, %status, "entity API error");
            return Err(self.entity_error(format!("API returned {status}: {detail}")));
        }

        let entities: Vec<HfEntity> = response
            .json()
            .await
            .map_err(|e| self.entity_error(format!("failed to parse response: {e}")))?;

        Ok(entities.into_iter().map(Entity::from).collect())
    }
}

/// Drop repeated `(type, text)` pairs, keeping the first occurrence, and
/// strip character offsets.
pub fn dedupe_entities(entities: impl IntoIterator<Item = Entity>) -> Vec<Entity> {
    let mut seen = HashSet::new();
    entities
        .into_iter()
        .filter(|e| seen.insert((e.entity_type.clone(), e.text.clone())))
        .map(|e| Entity { start: None, end: None, ..e })
        .collect()
}
