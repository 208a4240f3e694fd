//! Chat types shared by the orchestrator and the HTTP surface.

use chrono::{DateTime, Utc};
use ragchat_core::{ChatError, ChatErrorKind};
use ragchat_resolve::RetrievedDocument;
use serde::{Deserialize, Serialize};

/// LLM provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LlmProvider {
    OpenAI,
    OpenRouter,
    OpenWebUI,
    Ollama,
    Perplexity,
    Groq,
    Anthropic,
}

/// Request/response shape a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `/chat/completions` with `choices[].delta.content` streaming.
    OpenAiCompatible,
    /// Messages API with `content_block_delta` streaming.
    Anthropic,
}

impl LlmProvider {
    pub fn wire_format(self) -> WireFormat {
        match self {
            Self::Anthropic => WireFormat::Anthropic,
            _ => WireFormat::OpenAiCompatible,
        }
    }

    /// Path appended to the configured base URL.
    pub fn completions_path(self) -> &'static str {
        match self {
            Self::OpenAI | Self::Ollama => "/v1/chat/completions",
            Self::OpenRouter => "/api/v1/chat/completions",
            Self::OpenWebUI => "/api/chat/completions",
            Self::Perplexity => "/chat/completions",
            Self::Groq => "/openai/v1/chat/completions",
            Self::Anthropic => "/v1/messages",
        }
    }

    /// Base URL used when a config leaves `apiUrl` empty.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAI => "https://api.openai.com",
            Self::OpenRouter => "https://openrouter.ai",
            Self::OpenWebUI => "http://localhost:3000",
            Self::Ollama => "http://localhost:11434",
            Self::Perplexity => "https://api.perplexity.ai",
            Self::Groq => "https://api.groq.com",
            Self::Anthropic => "https://api.anthropic.com",
        }
    }

    /// Local servers run without credentials.
    pub fn requires_api_key(self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::OpenAI => write!(f, "openai"),
            LlmProvider::OpenRouter => write!(f, "openrouter"),
            LlmProvider::OpenWebUI => write!(f, "openwebui"),
            LlmProvider::Ollama => write!(f, "ollama"),
            LlmProvider::Perplexity => write!(f, "perplexity"),
            LlmProvider::Groq => write!(f, "groq"),
            LlmProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Chat message in conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// Incoming chat request. Immutable once submitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(alias = "message")]
    pub question: String,
    /// Explicit LLM config selection; the default-active config is used when absent.
    #[serde(default, rename = "llmConfigId")]
    pub llm_config_id: Option<String>,
    #[serde(default, rename = "sessionId", alias = "threadId")]
    pub session_id: Option<String>,
    #[serde(default, rename = "conversationHistory")]
    pub conversation_history: Vec<ChatMessage>,
    #[serde(default = "default_use_rag", rename = "useRag", alias = "useRagSearch")]
    pub use_rag: bool,
    #[serde(default, rename = "topK", alias = "maxContextResults")]
    pub top_k: Option<usize>,
    #[serde(default, rename = "similarityThreshold")]
    pub similarity_threshold: Option<f64>,
    #[serde(default, rename = "projectId")]
    pub project_id: Option<String>,
    pub temperature: Option<f64>,
    #[serde(rename = "maxTokens")]
    pub max_tokens: Option<usize>,
}

fn default_use_rag() -> bool {
    true
}

impl ChatRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            use_rag: true,
            ..Default::default()
        }
    }

    /// Reject malformed requests before any external call is made.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.question.trim().is_empty() {
            return Err(ChatError::InvalidRequest("question must not be empty".into()));
        }
        if let Some(k) = self.top_k {
            if !(1..=50).contains(&k) {
                return Err(ChatError::InvalidRequest("topK must be within 1..=50".into()));
            }
        }
        if let Some(t) = self.similarity_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(ChatError::InvalidRequest(
                    "similarityThreshold must be within 0.0..=1.0".into(),
                ));
            }
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ChatError::InvalidRequest(
                    "temperature must be within 0.0..=2.0".into(),
                ));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(ChatError::InvalidRequest("maxTokens must be positive".into()));
        }
        if let Some(id) = &self.llm_config_id {
            if id.trim().is_empty() {
                return Err(ChatError::InvalidRequest("llmConfigId must not be blank".into()));
            }
        }
        if let Some(msg) = self
            .conversation_history
            .iter()
            .find(|m| m.role != "user" && m.role != "assistant")
        {
            return Err(ChatError::InvalidRequest(format!(
                "conversationHistory role must be user or assistant, got {:?}",
                msg.role
            )));
        }
        Ok(())
    }
}

/// Reference from an answer back to a document that was in its prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    #[serde(rename = "documentId")]
    pub document_id: String,
    pub title: String,
    pub location: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none", rename = "chunkIndex")]
    pub chunk_index: Option<i64>,
}

impl From<&RetrievedDocument> for Citation {
    fn from(doc: &RetrievedDocument) -> Self {
        Self {
            id: doc.id.clone(),
            document_id: doc.origin.document_id.clone(),
            title: doc.origin.title.clone(),
            location: doc.origin.location.clone(),
            score: doc.score,
            chunk_index: doc.origin.chunk_index,
        }
    }
}

/// Turnaround figures for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMetrics {
    #[serde(rename = "latencyMs")]
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", rename = "tokensUsed")]
    pub tokens_used: Option<usize>,
    #[serde(rename = "documentsRetrieved")]
    pub documents_retrieved: usize,
    #[serde(rename = "documentsIncluded")]
    pub documents_included: usize,
}

/// Non-streaming chat response.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub provider: LlmProvider,
    pub model: String,
    #[serde(rename = "configId")]
    pub config_id: String,
    #[serde(rename = "turnId")]
    pub turn_id: String,
    #[serde(skip_serializing_if = "Option::is_none", rename = "sessionId")]
    pub session_id: Option<String>,
    pub metrics: TurnMetrics,
    #[serde(rename = "generatedAt")]
    pub generated_at: DateTime<Utc>,
}

/// Events delivered on a chat stream, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Citation list for the prompt; sent once, before any token.
    Sources { sources: Vec<Citation> },
    Token { content: String },
    /// Terminal.
    Error { kind: ChatErrorKind, message: String },
    /// Terminal.
    Done {
        provider: LlmProvider,
        model: String,
        #[serde(rename = "turnId")]
        turn_id: String,
        metrics: TurnMetrics,
    },
}

impl StreamEvent {
    pub fn from_error(err: &ChatError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sources { .. } => "sources",
            Self::Token { .. } => "token",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Done { .. })
    }
}

/// Chat status response.
#[derive(Debug, Clone, Serialize)]
pub struct ChatStatus {
    #[serde(rename = "llmAvailable")]
    pub llm_available: bool,
    #[serde(rename = "llmProvider")]
    pub llm_provider: Option<String>,
    #[serde(rename = "defaultModel")]
    pub default_model: Option<String>,
    #[serde(rename = "configId")]
    pub config_id: Option<String>,
    #[serde(rename = "retrieverUrl")]
    pub retriever_url: String,
}
