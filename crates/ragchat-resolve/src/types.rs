//! Retrieval types.

use serde::{Deserialize, Serialize};

/// Project id whose documents are visible from every project.
pub const COMMON_PROJECT_ID: &str = "00000000-0000-0000-0000-000000000000";

/// One retrieval call's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub top_k: usize,
    /// Minimum relevance (0.0–1.0) a document needs to be returned.
    pub similarity_threshold: f64,
    pub filters: SearchFilters,
}

/// Optional narrowing of the searched corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, rename = "projectId")]
    pub project_id: Option<String>,
}

/// Where a retrieved excerpt came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOrigin {
    #[serde(rename = "documentId")]
    pub document_id: String,
    /// File name or other locator of the source document.
    pub location: String,
    /// Display title; falls back to `location`.
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none", rename = "chunkIndex")]
    pub chunk_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// A candidate supporting document with a stable identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// Stable id for this excerpt; citations refer to it.
    pub id: String,
    /// Source content excerpt.
    pub content: String,
    /// Relevance in 0.0–1.0.
    pub score: f64,
    pub origin: DocumentOrigin,
}

/// Sort by descending score, keeping ties in their incoming order.
pub fn sort_by_relevance(docs: &mut [RetrievedDocument]) {
    docs.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Sort by descending score (stable for ties) and keep the first `top_k`.
pub fn rank_documents(mut docs: Vec<RetrievedDocument>, top_k: usize) -> Vec<RetrievedDocument> {
    sort_by_relevance(&mut docs);
    docs.truncate(top_k);
    docs
}
