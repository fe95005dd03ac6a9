//! Ollama-backed embedding and entity extraction.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use intake_core::defaults;
use intake_core::{EmbeddingBackend, Entity, EntityExtractor, Error, Result, Vector};

use crate::entities::{entity_prompt, parse_entity_response, truncate_chars, ENTITY_SYSTEM_PROMPT};

/// Embedding calls slower than this are logged as slow.
const SLOW_EMBED_MS: u64 = 5_000;

/// Generation calls slower than this are logged as slow.
const SLOW_GEN_MS: u64 = 30_000;

/// Connection settings shared by the Ollama collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaConfig {
    pub base_url: String,
    pub embed_model: String,
    pub gen_model: String,
    pub dimension: usize,
    pub embed_timeout_secs: u64,
    pub gen_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OLLAMA_URL.to_string(),
            embed_model: defaults::EMBED_MODEL.to_string(),
            gen_model: defaults::GEN_MODEL.to_string(),
            dimension: defaults::EMBED_DIMENSION,
            embed_timeout_secs: defaults::EMBED_TIMEOUT_SECS,
            gen_timeout_secs: defaults::GEN_TIMEOUT_SECS,
        }
    }
}

impl OllamaConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `OLLAMA_BASE` | `http://127.0.0.1:11434` |
    /// | `OLLAMA_EMBED_MODEL` | `nomic-embed-text` |
    /// | `OLLAMA_GEN_MODEL` | `qwen3:8b` |
    /// | `OLLAMA_EMBED_DIM` | 768 |
    /// | `OLLAMA_EMBED_TIMEOUT_SECS` | 30 |
    /// | `OLLAMA_GEN_TIMEOUT_SECS` | 120 |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let parsed = |name: &str| std::env::var(name).ok().and_then(|v| v.parse().ok());

        let base_url = std::env::var("OLLAMA_BASE").unwrap_or_else(|_| defaults.base_url.clone());
        Self {
            base_url: defaults.base_url,
            embed_model: std::env::var("OLLAMA_EMBED_MODEL").unwrap_or(defaults.embed_model),
            gen_model: std::env::var("OLLAMA_GEN_MODEL").unwrap_or(defaults.gen_model),
            dimension: parsed("OLLAMA_EMBED_DIM")
                .map(|v: u64| v as usize)
                .unwrap_or(defaults.dimension),
            embed_timeout_secs: parsed("OLLAMA_EMBED_TIMEOUT_SECS")
                .unwrap_or(defaults.embed_timeout_secs),
            gen_timeout_secs: parsed("OLLAMA_GEN_TIMEOUT_SECS")
                .unwrap_or(defaults.gen_timeout_secs),
        }
        .with_base_url(base_url)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    pub fn with_gen_model(mut self, model: impl Into<String>) -> Self {
        self.gen_model = model.into();
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    fn client(&self, timeout_secs: u64) -> Result<Client> {
        Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// Set to `"json"` for guaranteed valid JSON output.
    format: &'static str,
    /// Suppress chain-of-thought for reasoning models.
    think: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

/// Embedding backend calling Ollama's `/api/embed`.
pub struct OllamaEmbedder {
    client: Client,
    config: OllamaConfig,
}

impl OllamaEmbedder {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = config.client(config.embed_timeout_secs)?;
        info!(
            subsystem = "inference",
            component = "ollama",
            base_url = %config.base_url,
            model = %config.embed_model,
            dimension = config.dimension,
            "Initializing Ollama embedder"
        );
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(OllamaConfig::from_env())
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaEmbedder {
    #[instrument(skip(self, texts), fields(subsystem = "inference", component = "ollama", op = "embed_texts", input_count = texts.len()))]
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let start = Instant::now();
        let request = EmbeddingRequest {
            model: &self.config.embed_model,
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.config.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        if result.embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                result.embeddings.len()
            )));
        }

        if let Some((index, bad)) = result
            .embeddings
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != self.config.dimension)
        {
            return Err(Error::Embedding(format!(
                "Embedding {} has dimension {}, expected {}",
                index,
                bad.len(),
                self.config.dimension
            )));
        }

        let vectors: Vec<Vector> = result.embeddings.into_iter().map(Vector::from).collect();
        let elapsed = start.elapsed().as_millis() as u64;

        debug!(
            result_count = vectors.len(),
            duration_ms = elapsed,
            "Embedding complete"
        );
        if elapsed > SLOW_EMBED_MS {
            warn!(
                duration_ms = elapsed,
                input_count = texts.len(),
                slow = true,
                "Slow embedding operation"
            );
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

/// Entity extractor prompting an Ollama chat model for JSON.
pub struct OllamaEntityExtractor {
    client: Client,
    config: OllamaConfig,
    text_limit: usize,
}

impl OllamaEntityExtractor {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = config.client(config.gen_timeout_secs)?;
        info!(
            subsystem = "inference",
            component = "ollama",
            base_url = %config.base_url,
            model = %config.gen_model,
            "Initializing Ollama entity extractor"
        );
        Ok(Self {
            client,
            config,
            text_limit: defaults::ENTITY_TEXT_LIMIT,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(OllamaConfig::from_env())
    }

    /// Override how many characters of document text are sent to the model.
    pub fn with_text_limit(mut self, limit: usize) -> Self {
        self.text_limit = limit;
        self
    }

    async fn chat_json(&self, prompt: String) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.gen_model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: ENTITY_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt,
                },
            ],
            stream: false,
            format: "json",
            think: false,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.config.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;
        Ok(result.message.content)
    }
}

#[async_trait]
impl EntityExtractor for OllamaEntityExtractor {
    #[instrument(skip(self, text), fields(subsystem = "inference", component = "ollama", op = "extract_entities", text_len = text.len()))]
    async fn extract_entities(&self, text: &str) -> Result<Vec<Entity>> {
        let start = Instant::now();
        let excerpt = truncate_chars(text, self.text_limit);

        let content = self.chat_json(entity_prompt(excerpt)).await?;
        let entities = parse_entity_response(&content)?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            entity_count = entities.len(),
            duration_ms = elapsed,
            "Entity extraction complete"
        );
        if elapsed > SLOW_GEN_MS {
            warn!(duration_ms = elapsed, slow = true, "Slow entity extraction");
        }

        Ok(entities)
    }
}
