//! Request/response calls to the document chat service: retrieval search,
//! document ingestion, and non-streaming completions.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ChatConfig;
use crate::errors::ChatError;
use crate::model::{Message, RetrievedContext};

/// Chunking parameters forwarded with ingested documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChunkingParams {
    /// Characters per chunk.
    pub chunk_size: u32,
    /// Characters shared between consecutive chunks.
    pub overlap: u32,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl ChunkingParams {
    fn validate(&self) -> Result<(), ChatError> {
        if self.chunk_size == 0 {
            return Err(ChatError::Validation("chunk_size must be greater than 0".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(ChatError::Validation(
                "overlap must be smaller than chunk_size".into(),
            ));
        }
        Ok(())
    }
}

/// Document content to ingest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestSource {
    Text { title: String, content: String },
    /// Binary document (PDF) uploaded as a file.
    Binary { file_name: String, bytes: Vec<u8> },
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
pub struct IngestReport {
    pub chunks_processed: u64,
    #[serde(default)]
    pub message: Option<String>,
}

/// A stored document as listed by the service.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub content: String,
}

/// Answer of the non-streaming document chat endpoint.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
pub struct DocumentChatReply {
    pub response: String,
    #[serde(default)]
    pub contexts: Vec<String>,
    #[serde(default)]
    pub provider: String,
}

impl DocumentChatReply {
    pub fn context(&self) -> RetrievedContext {
        RetrievedContext {
            contexts: self.contexts.clone(),
            provider: self.provider.clone(),
        }
    }
}

#[derive(serde::Deserialize)]
struct SearchReply {
    contexts: Vec<String>,
}

#[derive(serde::Deserialize)]
struct CompletionReply {
    response: String,
}

#[derive(serde::Deserialize)]
struct AutocompleteReply {
    suggestion: String,
}

/// Client for the service's request/response endpoints.
#[derive(Clone)]
pub struct ServiceClient {
    client: reqwest::Client,
    config: ChatConfig,
}

impl ServiceClient {
    pub fn new(config: ChatConfig) -> Result<Self, ChatError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build service client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Retrieves the `top_k` contexts most relevant to `query`.
    pub async fn search(&self, query: &str, top_k: u32) -> Result<Vec<String>, ChatError> {
        if query.trim().is_empty() {
            return Err(ChatError::Validation("query must not be empty".into()));
        }
        if top_k == 0 {
            return Err(ChatError::Validation("top_k must be greater than 0".into()));
        }
        let body = serde_json::json!({ "query": query, "top_k": top_k });
        let reply: SearchReply = self.post_json("ollama-embeddings/search", &body).await?;
        Ok(reply.contexts)
    }

    /// Sends a document for chunking and embedding.
    pub async fn ingest(
        &self,
        source: IngestSource,
        chunking: ChunkingParams,
    ) -> Result<IngestReport, ChatError> {
        chunking.validate()?;
        match source {
            IngestSource::Text { title, content } => {
                if content.trim().is_empty() {
                    return Err(ChatError::Validation("document content must not be empty".into()));
                }
                let body = serde_json::json!({
                    "title": title,
                    "content": content,
                    "chunk_size": chunking.chunk_size,
                    "overlap": chunking.overlap,
                });
                self.post_json("documents", &body).await
            }
            IngestSource::Binary { file_name, bytes } => {
                if bytes.is_empty() {
                    return Err(ChatError::Validation("document file is empty".into()));
                }
                let url = self.config.endpoint("documents/upload-pdf");
                debug!(%url, file_name = %file_name, size = bytes.len(), "uploading document");
                let part = reqwest::multipart::Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str("application/pdf")
                    .map_err(|e| ChatError::Validation(format!("invalid upload part: {e}")))?;
                let form = reqwest::multipart::Form::new()
                    .part("file", part)
                    .text("chunk_size", chunking.chunk_size.to_string())
                    .text("overlap", chunking.overlap.to_string());
                let response = self
                    .client
                    .post(url)
                    .multipart(form)
                    .send()
                    .await
                    .map_err(|e| ChatError::service(format!("upload failed: {e}"), None))?;
                read_json(response).await
            }
        }
    }

    /// Single-turn completion without retrieval.
    pub async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, ChatError> {
        if prompt.trim().is_empty() {
            return Err(ChatError::Validation("prompt must not be empty".into()));
        }
        let mut body = serde_json::json!({ "prompt": prompt });
        if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
            body["system_prompt"] = serde_json::Value::String(system.to_string());
        }
        if let Some(model) = &self.config.model {
            body["model"] = serde_json::Value::String(model.clone());
        }
        if let Some(provider) = &self.config.provider {
            body["provider"] = serde_json::Value::String(provider.clone());
        }
        let reply: CompletionReply = self.post_json("chat", &body).await?;
        Ok(reply.response)
    }

    /// Retrieval-augmented answer delivered in one response.
    pub async fn document_chat(&self, messages: &[Message]) -> Result<DocumentChatReply, ChatError> {
        if messages.is_empty() {
            return Err(ChatError::Validation("at least one message is required".into()));
        }
        let mut body = serde_json::json!({
            "messages": messages,
            "top_k": self.config.top_k,
        });
        if let Some(model) = &self.config.model {
            body["model"] = serde_json::Value::String(model.clone());
        }
        if let Some(provider) = &self.config.provider {
            body["provider"] = serde_json::Value::String(provider.clone());
        }
        self.post_json("document-chat", &body).await
    }

    /// Suggests a continuation for a partially typed prompt.
    pub async fn autocomplete(
        &self,
        partial_prompt: &str,
        max_tokens: Option<u32>,
    ) -> Result<String, ChatError> {
        let mut body = serde_json::json!({ "partial_prompt": partial_prompt });
        if let Some(max_tokens) = max_tokens {
            body["max_tokens"] = max_tokens.into();
        }
        let reply: AutocompleteReply = self.post_json("autocomplete", &body).await?;
        Ok(reply.suggestion)
    }

    pub async fn list_documents(&self) -> Result<Vec<StoredDocument>, ChatError> {
        let url = self.config.endpoint("documents/");
        debug!(%url, "listing documents");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ChatError::service(format!("request failed: {e}"), None))?;
        read_json(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ChatError> {
        let url = self.config.endpoint(path);
        debug!(%url, "service request");
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ChatError::service(format!("request failed: {e}"), None))?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ChatError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ChatError::service(format!("failed to read response: {e}"), Some(status.as_u16())))?;
    if !status.is_success() {
        return Err(ChatError::service(
            format!("request failed with status {status}: {text}"),
            Some(status.as_u16()),
        ));
    }
    serde_json::from_str(&text)
        .map_err(|e| ChatError::Protocol(format!("unexpected response shape: {e}")))
}
