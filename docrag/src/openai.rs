//! OpenAI and Azure OpenAI backends for embeddings and chat completions.
//!
//! Both services share a wire format and differ only in URL layout and
//! authentication, captured by [`OpenAIEndpoint`]. Requests go through
//! `reqwest` directly.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::{ChatMessage, ChatModel, ChatRequest};

/// The default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default Azure embedding deployment.
pub const DEFAULT_AZURE_EMBEDDING_DEPLOYMENT: &str = "text-embedding-ada-002";

/// The default Azure OpenAI REST API version.
pub const DEFAULT_AZURE_API_VERSION: &str = "2023-05-15";

/// The default model for OpenAI chat completions.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Dimensionality of `text-embedding-3-small` and `text-embedding-ada-002`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// Output size of the OpenAI embedding model `model`.
///
/// Azure deployments are matched by name, so a deployment called after its
/// model gets the right size. Unknown names fall back to 1536.
pub fn model_dimensions(model: &str) -> usize {
    if model.contains("text-embedding-3-large") { 3072 } else { DEFAULT_DIMENSIONS }
}

/// Where requests go and how they are authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenAIEndpoint {
    /// `api.openai.com` or an OpenAI-compatible server. Bearer auth.
    OpenAI { base_url: String, api_key: String },
    /// An Azure OpenAI resource. Models are addressed by deployment name and
    /// requests carry an `api-key` header.
    Azure { endpoint: String, api_key: String, api_version: String },
}

impl OpenAIEndpoint {
    /// The public OpenAI API.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::OpenAI { base_url: OPENAI_BASE_URL.to_string(), api_key: api_key.into() }
    }

    /// An OpenAI-compatible API at `base_url`.
    pub fn compatible(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::OpenAI { base_url: base_url.into(), api_key: api_key.into() }
    }

    /// An Azure OpenAI resource.
    pub fn azure(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self::Azure {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            api_version: api_version.into(),
        }
    }

    /// Provider label used in errors and logs.
    pub fn provider(&self) -> &'static str {
        match self {
            Self::OpenAI { .. } => "OpenAI",
            Self::Azure { .. } => "AzureOpenAI",
        }
    }

    fn check(&self) -> std::result::Result<(), String> {
        let (location, api_key) = match self {
            Self::OpenAI { base_url, api_key } => (base_url, api_key),
            Self::Azure { endpoint, api_key, .. } => (endpoint, api_key),
        };
        if location.trim().is_empty() {
            return Err("endpoint URL must not be empty".into());
        }
        if api_key.is_empty() {
            return Err("API key must not be empty".into());
        }
        Ok(())
    }

    /// URL for `operation` (`embeddings`, `chat/completions`) on `model`.
    ///
    /// For Azure, `model` is the deployment name.
    pub fn url(&self, operation: &str, model: &str) -> String {
        match self {
            Self::OpenAI { base_url, .. } => {
                format!("{}/{operation}", base_url.trim_end_matches('/'))
            }
            Self::Azure { endpoint, api_version, .. } => format!(
                "{}/openai/deployments/{model}/{operation}?api-version={api_version}",
                endpoint.trim_end_matches('/')
            ),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::OpenAI { api_key, .. } => request.bearer_auth(api_key),
            Self::Azure { api_key, .. } => request.header("api-key", api_key),
        }
    }
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// POST `body` as JSON and decode the reply. Errors come back as plain
/// messages so callers can wrap them in their own [`RagError`] variant.
async fn post_json<B, R>(
    client: &reqwest::Client,
    endpoint: &OpenAIEndpoint,
    url: &str,
    body: &B,
) -> std::result::Result<R, String>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let provider = endpoint.provider();
    let response = endpoint.authorize(client.post(url)).json(body).send().await.map_err(|e| {
        error!(provider, error = %e, "request failed");
        format!("request failed: {e}")
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail =
            serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);

        error!(provider, %status, "API error");
        return Err(format!("API returned {status}: {detail}"));
    }

    response.json::<R>().await.map_err(|e| {
        error!(provider, error = %e, "failed to parse response");
        format!("failed to parse response: {e}")
    })
}

// ── Embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by the OpenAI or Azure OpenAI embeddings API.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::azure(
///     "https://my-resource.openai.azure.com",
///     "key",
///     "2023-05-15",
///     "text-embedding-ada-002",
/// )?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    endpoint: OpenAIEndpoint,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a provider for the public OpenAI API with the default model
    /// (`text-embedding-3-small`).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_endpoint(OpenAIEndpoint::openai(api_key), DEFAULT_EMBEDDING_MODEL)
    }

    /// Create a provider for an Azure OpenAI embedding deployment.
    pub fn azure(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Result<Self> {
        Self::with_endpoint(OpenAIEndpoint::azure(endpoint, api_key, api_version), deployment)
    }

    /// Create a provider for an arbitrary endpoint and model (or deployment).
    pub fn with_endpoint(endpoint: OpenAIEndpoint, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        endpoint.check().map_err(|message| RagError::EmbeddingError {
            provider: endpoint.provider().into(),
            message,
        })?;

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            dimensions: model_dimensions(&model),
            model,
            request_dimensions: None,
        })
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    /// The model or deployment name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn embedding_error(&self, message: impl Into<String>) -> RagError {
        RagError::EmbeddingError {
            provider: self.endpoint.provider().into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = self.endpoint.provider(), text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| self.embedding_error("API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = self.endpoint.provider(),
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let url = self.endpoint.url("embeddings", &self.model);
        let mut response: EmbeddingResponse =
            post_json(&self.client, &self.endpoint, &url, &request_body)
                .await
                .map_err(|message| self.embedding_error(message))?;

        if response.data.len() != texts.len() {
            return Err(self.embedding_error(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ── Chat completions ───────────────────────────────────────────────

/// A [`ChatModel`] backed by the OpenAI or Azure OpenAI chat completions API.
pub struct OpenAIChatModel {
    client: reqwest::Client,
    endpoint: OpenAIEndpoint,
    model: String,
}

impl OpenAIChatModel {
    /// Create a chat model for `model` (Azure: the deployment name).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the model name is empty or the
    /// endpoint lacks a URL or key.
    pub fn new(endpoint: OpenAIEndpoint, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(RagError::ConfigError(match endpoint {
                OpenAIEndpoint::Azure { .. } => {
                    "AZURE_OPENAI_DEPLOYMENT_NAME environment variable not set".to_string()
                }
                OpenAIEndpoint::OpenAI { .. } => "chat model name must not be empty".to_string(),
            }));
        }
        endpoint
            .check()
            .map_err(|e| RagError::ConfigError(format!("{}: {e}", endpoint.provider())))?;

        Ok(Self { client: reqwest::Client::new(), endpoint, model })
    }

    fn model_error(&self, message: impl Into<String>) -> RagError {
        RagError::ModelError { provider: self.endpoint.provider().into(), message: message.into() }
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<String> {
        debug!(
            provider = self.endpoint.provider(),
            model = %self.model,
            messages = request.messages.len(),
            "chat completion"
        );

        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request
                .json_response
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let url = self.endpoint.url("chat/completions", &self.model);
        let response: ChatCompletionResponse = post_json(&self.client, &self.endpoint, &url, &body)
            .await
            .map_err(|message| self.model_error(message))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| self.model_error("API returned no choices"))?;

        choice.message.content.ok_or_else(|| self.model_error("API returned an empty message"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_openai_urls() {
        let endpoint = OpenAIEndpoint::compatible("http://localhost:8080/v1/", "sk-test");
        assert_eq!(endpoint.url("embeddings", "ignored"), "http://localhost:8080/v1/embeddings");
        assert_eq!(
            OpenAIEndpoint::openai("sk-test").url("chat/completions", "gpt-4o-mini"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn builds_azure_deployment_urls() {
        let endpoint =
            OpenAIEndpoint::azure("https://res.openai.azure.com/", "key", DEFAULT_AZURE_API_VERSION);
        assert_eq!(
            endpoint.url("embeddings", "text-embedding-ada-002"),
            "https://res.openai.azure.com/openai/deployments/text-embedding-ada-002/embeddings?api-version=2023-05-15"
        );
        assert_eq!(endpoint.provider(), "AzureOpenAI");
    }

    #[test]
    fn rejects_empty_credentials() {
        assert!(OpenAIEmbeddingProvider::new("").is_err());
        assert!(
            OpenAIEmbeddingProvider::azure("", "key", DEFAULT_AZURE_API_VERSION, "ada").is_err()
        );
    }

    #[test]
    fn embedding_dimensions_follow_the_model() {
        let large = OpenAIEndpoint::openai("key");
        let provider = OpenAIEmbeddingProvider::with_endpoint(large, "text-embedding-3-large");
        assert_eq!(provider.unwrap().dimensions(), 3072);
        assert_eq!(OpenAIEmbeddingProvider::new("key").unwrap().dimensions(), 1536);
        let ada = OpenAIEmbeddingProvider::azure(
            "https://res.openai.azure.com",
            "key",
            DEFAULT_AZURE_API_VERSION,
            DEFAULT_AZURE_EMBEDDING_DEPLOYMENT,
        );
        assert_eq!(ada.unwrap().dimensions(), 1536);
        let truncated = OpenAIEmbeddingProvider::new("key").unwrap().with_dimensions(256);
        assert_eq!(truncated.dimensions(), 256);
    }

    #[test]
    fn chat_model_requires_deployment_name() {
        let endpoint = OpenAIEndpoint::azure("https://res.openai.azure.com", "key", "2023-05-15");
        let err = OpenAIChatModel::new(endpoint, "").err().unwrap();
        assert!(err.to_string().contains("AZURE_OPENAI_DEPLOYMENT_NAME"));
    }

    #[test]
    fn serializes_json_mode_chat_request() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let body = ChatCompletionRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            temperature: 0.3,
            max_tokens: 1000,
            response_format: Some(ResponseFormat { kind: "json_object" }),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["max_tokens"], 1000);
    }

    #[test]
    fn decodes_chat_and_embedding_replies() {
        let chat: ChatCompletionResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"{\"answer\":\"42\"}"}}]}"#,
        )
        .unwrap();
        assert_eq!(chat.choices[0].message.content.as_deref(), Some(r#"{"answer":"42"}"#));

        let embeddings: EmbeddingResponse = serde_json::from_str(
            r#"{"data":[{"index":1,"embedding":[0.5]},{"index":0,"embedding":[0.25,0.75]}]}"#,
        )
        .unwrap();
        assert_eq!(embeddings.data.len(), 2);
        assert_eq!(embeddings.data[0].index, 1);
    }
}
