//! Ollama client for embeddings and chat with retry logic

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::generation::prompt::PromptMessage;

use super::embedding::EmbeddingProvider;
use super::llm::LlmProvider;

/// Outcome of a failed attempt: whether another attempt may succeed
enum Attempt {
    Retry(Error),
    Fail(Error),
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessage,
}

#[derive(Deserialize)]
struct OllamaChatMessage {
    content: String,
}

/// Ollama API client with per-request timeout and automatic retry
pub struct OllamaClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: LlmConfig,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Retry an operation with exponential backoff
    async fn retry_request<F, Fut, T>(&self, what: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, Attempt>>,
    {
        let policy = &self.config.retry;
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(Attempt::Fail(e)) => return Err(e),
                Err(Attempt::Retry(e)) => {
                    if attempt >= policy.max_retries {
                        return Err(e);
                    }
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        "{} request failed (attempt {}/{}): {}, retrying in {:?}",
                        what,
                        attempt + 1,
                        policy.max_retries + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// POST a JSON body and decode a JSON reply, classifying failures
    async fn post_json<B, R>(
        &self,
        url: &str,
        body: &B,
        wrap: fn(String) -> Error,
    ) -> std::result::Result<R, Attempt>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = match self.client.post(url).json(body).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Err(Attempt::Retry(Error::Timeout(format!("request to {} timed out", url))))
            }
            Err(e) => return Err(Attempt::Retry(wrap(format!("request to {} failed: {}", url, e)))),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = wrap(format!("HTTP {} from {}: {}", status, url, body));
            return Err(if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                Attempt::Retry(err)
            } else {
                Attempt::Fail(err)
            });
        }

        response.json::<R>().await.map_err(|e| {
            if e.is_timeout() {
                Attempt::Retry(Error::Timeout(format!("response from {} timed out", url)))
            } else {
                Attempt::Fail(wrap(format!("malformed response from {}: {}", url, e)))
            }
        })
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        match self.client.get(self.endpoint("api/tags")).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Embed texts in one request, one vector per input in order
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.endpoint("api/embed");
        let url = url.as_str();
        let request = EmbedRequest {
            model: &self.config.embed_model,
            input: texts,
        };
        let request = &request;

        let response: EmbedResponse = self
            .retry_request("Embedding", move || self.post_json(url, request, Error::Embedding))
            .await?;

        if response.embeddings.len() != texts.len() {
            return Err(Error::embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }
        if response.embeddings.iter().any(|e| e.is_empty()) {
            return Err(Error::embedding("response contained an empty embedding"));
        }

        Ok(response.embeddings)
    }

    /// Chat completion for an ordered list of messages
    pub async fn chat(&self, messages: &[PromptMessage]) -> Result<String> {
        let url = self.endpoint("api/chat");
        let url = url.as_str();
        let request = OllamaChatRequest {
            model: &self.config.chat_model,
            messages,
            stream: false,
            options: self.config.temperature.map(|temperature| ChatOptions { temperature }),
        };
        let request = &request;

        tracing::debug!("Chat completion with model {} ({} messages)", self.config.chat_model, messages.len());

        let response: OllamaChatResponse = self
            .retry_request("Chat", move || self.post_json(url, request, Error::Llm))
            .await?;

        Ok(response.message.content)
    }
}

/// Ollama embedding provider
pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
}

impl OllamaEmbedder {
    /// Create from existing OllamaClient
    pub fn from_client(client: Arc<OllamaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.client.embed_batch(texts).await
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Ollama chat provider for query rewriting and answers
pub struct OllamaLlm {
    client: Arc<OllamaClient>,
    model: String,
}

impl OllamaLlm {
    /// Create from existing OllamaClient
    pub fn from_client(client: Arc<OllamaClient>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl LlmProvider for OllamaLlm {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String> {
        self.client.chat(messages).await
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Build both providers over one shared client
pub fn ollama_providers(config: &LlmConfig) -> Result<(Arc<OllamaEmbedder>, Arc<OllamaLlm>)> {
    let client = Arc::new(OllamaClient::new(config)?);
    let embedder = Arc::new(OllamaEmbedder::from_client(Arc::clone(&client)));
    let llm = Arc::new(OllamaLlm::from_client(client, config.chat_model.clone()));
    Ok((embedder, llm))
}
