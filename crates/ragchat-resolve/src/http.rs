//! HTTP client for the rag-service similarity search endpoint.

use std::time::Duration;

use async_trait::async_trait;
use ragchat_core::{CallerIdentity, Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::*;
use crate::Retriever;

const SEARCH_PATH: &str = "/api/v1/search/similar";

/// Retriever backed by `POST {base_url}/api/v1/search/similar`.
pub struct HttpRetriever {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct SimilarSearchBody<'a> {
    query_text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<&'a str>,
    similarity_threshold: f64,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SimilarSearchResponse {
    #[serde(default)]
    results: Vec<SimilarSearchHit>,
}

#[derive(Debug, Deserialize)]
struct SimilarSearchHit {
    #[serde(default)]
    embedding_id: Option<serde_json::Value>,
    document_id: serde_json::Value,
    #[serde(default)]
    file_name: Option<String>,
    chunk_text: String,
    similarity_score: f64,
    #[serde(default)]
    chunk_index: Option<i64>,
    #[serde(default)]
    chunk_metadata: Option<serde_json::Value>,
}

impl HttpRetriever {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn search(
        &self,
        query: &SearchQuery,
        caller: &CallerIdentity,
    ) -> Result<Vec<RetrievedDocument>> {
        let url = format!("{}{}", self.base_url, SEARCH_PATH);
        let body = SimilarSearchBody {
            query_text: &query.query,
            project_id: query.filters.project_id.as_deref(),
            similarity_threshold: query.similarity_threshold,
            max_results: query.top_k,
        };

        debug!("Searching {} for caller {}", url, caller);

        let response = self
            .client
            .post(&url)
            .header("X-User-Id", &caller.user_id)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Search(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Search(format!("rag-service error {}: {}", status, body)));
        }

        let parsed: SimilarSearchResponse = response
            .json()
            .await
            .map_err(|e| Error::Search(format!("Malformed search response: {}", e)))?;

        let docs: Vec<RetrievedDocument> = parsed
            .results
            .into_iter()
            .filter(|hit| hit.similarity_score >= query.similarity_threshold)
            .map(into_document)
            .collect();

        info!("Retrieved {} documents for caller {}", docs.len(), caller);
        Ok(rank_documents(docs, query.top_k))
    }

    fn name(&self) -> &str {
        "rag-service"
    }
}

fn into_document(hit: SimilarSearchHit) -> RetrievedDocument {
    let document_id = id_string(&hit.document_id);
    let id = match (&hit.embedding_id, hit.chunk_index) {
        (Some(embedding), _) if !embedding.is_null() => id_string(embedding),
        (_, Some(idx)) => format!("{}#{}", document_id, idx),
        _ => document_id.clone(),
    };
    let location = hit.file_name.clone().unwrap_or_else(|| document_id.clone());
    let title = resolve_title(hit.chunk_metadata.as_ref()).unwrap_or_else(|| location.clone());

    RetrievedDocument {
        id,
        content: hit.chunk_text,
        score: hit.similarity_score.clamp(0.0, 1.0),
        origin: DocumentOrigin {
            document_id,
            location,
            title,
            chunk_index: hit.chunk_index,
            metadata: hit.chunk_metadata,
        },
    }
}

/// Conversation-derived chunks carry their thread title in metadata.
fn resolve_title(metadata: Option<&serde_json::Value>) -> Option<String> {
    let metadata = metadata?;
    ["threadTitle", "thread_title"]
        .iter()
        .filter_map(|key| metadata.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
