//! Error types for ragchat.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Infrastructure failures reported by collaborators (config store, retriever, LLM client).
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Search error: {0}")]
    Search(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Classified failure of one chat turn, as seen by the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    /// Empty question or malformed parameters; rejected before any external call.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No active/default provider could be resolved.
    #[error("no LLM configuration available: {0}")]
    ConfigurationUnavailable(String),

    /// The retriever failed or timed out. Retrying the whole turn may succeed.
    #[error("retrieval failed: {0}")]
    RetrievalFailure(String),

    /// The LLM call failed before producing any output.
    #[error("generation failed: {0}")]
    GenerationFailure(String),

    /// The LLM call failed after tokens were already delivered to the caller.
    #[error("generation failed after {tokens_emitted} tokens: {reason}")]
    PartialGenerationFailure { tokens_emitted: usize, reason: String },

    /// The upstream stalled past the idle window (or the completion bound).
    #[error("timed out: {0}")]
    Timeout(String),
}

/// Wire-level classification of a [`ChatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatErrorKind {
    InvalidRequest,
    ConfigurationUnavailable,
    RetrievalFailure,
    GenerationFailure,
    PartialGenerationFailure,
    Timeout,
}

impl ChatError {
    pub fn kind(&self) -> ChatErrorKind {
        match self {
            Self::InvalidRequest(_) => ChatErrorKind::InvalidRequest,
            Self::ConfigurationUnavailable(_) => ChatErrorKind::ConfigurationUnavailable,
            Self::RetrievalFailure(_) => ChatErrorKind::RetrievalFailure,
            Self::GenerationFailure(_) => ChatErrorKind::GenerationFailure,
            Self::PartialGenerationFailure { .. } => ChatErrorKind::PartialGenerationFailure,
            Self::Timeout(_) => ChatErrorKind::Timeout,
        }
    }
}

impl std::fmt::Display for ChatErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidRequest => "invalid_request",
            Self::ConfigurationUnavailable => "configuration_unavailable",
            Self::RetrievalFailure => "retrieval_failure",
            Self::GenerationFailure => "generation_failure",
            Self::PartialGenerationFailure => "partial_generation_failure",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}
