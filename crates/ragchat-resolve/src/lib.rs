//! Retrieval: the document source consulted before every chat turn.
//!
//! `Retriever` is the seam the orchestrator depends on. `HttpRetriever` talks to
//! the rag-service similarity endpoint; `MemoryRetriever` scores a fixed document
//! set by keyword overlap and backs demos and tests.

pub mod http;
pub mod memory;
pub mod types;

pub use http::HttpRetriever;
pub use memory::{MemoryDocument, MemoryRetriever};
pub use types::*;

use async_trait::async_trait;
use ragchat_core::{CallerIdentity, Result};

/// A source of ranked supporting documents.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return documents for `query`, ordered by descending relevance.
    ///
    /// An empty corpus yields `Ok(vec![])`, never an error. `caller` scopes
    /// visibility only.
    async fn search(
        &self,
        query: &SearchQuery,
        caller: &CallerIdentity,
    ) -> Result<Vec<RetrievedDocument>>;

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}
