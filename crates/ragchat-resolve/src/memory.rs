//! In-memory keyword retriever.

use async_trait::async_trait;
use ragchat_core::{CallerIdentity, Result};
use tracing::debug;

use crate::types::*;
use crate::Retriever;

/// A document held by [`MemoryRetriever`].
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    pub id: String,
    pub content: String,
    pub origin: DocumentOrigin,
    /// Project the document belongs to; `None` or [`COMMON_PROJECT_ID`] means shared.
    pub project_id: Option<String>,
    /// When set, only this user may retrieve the document.
    pub owner: Option<String>,
}

impl MemoryDocument {
    pub fn new(id: impl Into<String>, location: impl Into<String>, content: impl Into<String>) -> Self {
        let id = id.into();
        let location = location.into();
        Self {
            origin: DocumentOrigin {
                document_id: id.clone(),
                title: location.clone(),
                location,
                chunk_index: None,
                metadata: None,
            },
            id,
            content: content.into(),
            project_id: None,
            owner: None,
        }
    }

    pub fn in_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn owned_by(mut self, user_id: impl Into<String>) -> Self {
        self.owner = Some(user_id.into());
        self
    }

    fn visible_to(&self, caller: &CallerIdentity, filters: &SearchFilters) -> bool {
        if let Some(owner) = &self.owner {
            if owner != &caller.user_id {
                return false;
            }
        }
        match (&filters.project_id, &self.project_id) {
            (Some(wanted), Some(own)) => own == wanted || own == COMMON_PROJECT_ID,
            _ => true,
        }
    }
}

/// Scores a fixed document set by the share of query terms each document contains.
pub struct MemoryRetriever {
    documents: Vec<MemoryDocument>,
}

impl MemoryRetriever {
    pub fn new(documents: Vec<MemoryDocument>) -> Self {
        Self { documents }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn terms(text: &str) -> Vec<String> {
    let mut out: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn keyword_score(query_terms: &[String], content: &str) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let content_lower = content.to_lowercase();
    let matched = query_terms
        .iter()
        .filter(|t| content_lower.contains(t.as_str()))
        .count();
    matched as f64 / query_terms.len() as f64
}

#[async_trait]
impl Retriever for MemoryRetriever {
    async fn search(
        &self,
        query: &SearchQuery,
        caller: &CallerIdentity,
    ) -> Result<Vec<RetrievedDocument>> {
        let query_terms = terms(&query.query);

        let hits: Vec<RetrievedDocument> = self
            .documents
            .iter()
            .filter(|doc| doc.visible_to(caller, &query.filters))
            .filter_map(|doc| {
                let score = keyword_score(&query_terms, &doc.content);
                (score > 0.0 && score >= query.similarity_threshold).then(|| RetrievedDocument {
                    id: doc.id.clone(),
                    content: doc.content.clone(),
                    score,
                    origin: doc.origin.clone(),
                })
            })
            .collect();

        debug!(
            "Memory retriever matched {} of {} documents",
            hits.len(),
            self.documents.len()
        );
        Ok(rank_documents(hits, query.top_k))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
