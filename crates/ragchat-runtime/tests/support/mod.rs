//! Mock collaborators for orchestrator tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use ragchat_chat::{
    BoxedStream, ChatMessage, Completion, ConfigResolver, LlmClient, LlmConfigRecord,
    LlmProvider, MemoryConfigStore, ResolvedLlmConfig, StreamChunk,
};
use ragchat_core::{CallerIdentity, Error, Result};
use ragchat_resolve::{DocumentOrigin, RetrievedDocument, Retriever, SearchQuery};
use ragchat_runtime::{ChatOrchestrator, OrchestratorSettings};

pub fn doc(id: &str, score: f64, content: &str) -> RetrievedDocument {
    RetrievedDocument {
        id: id.into(),
        content: content.into(),
        score,
        origin: DocumentOrigin {
            document_id: id.into(),
            location: format!("{}.md", id),
            title: format!("{}.md", id),
            chunk_index: None,
            metadata: None,
        },
    }
}

pub fn default_config() -> LlmConfigRecord {
    let mut record = LlmConfigRecord::new("default", LlmProvider::OpenAI, "gpt-4o-mini");
    record.api_key = Some("sk-test".into());
    record.is_default = true;
    record
}

pub fn store_with(records: Vec<LlmConfigRecord>) -> Arc<MemoryConfigStore> {
    Arc::new(MemoryConfigStore::new(records))
}

/// Returns a fixed document list and counts calls.
pub struct StaticRetriever {
    docs: Vec<RetrievedDocument>,
    pub calls: AtomicUsize,
}

impl StaticRetriever {
    pub fn new(docs: Vec<RetrievedDocument>) -> Arc<Self> {
        Arc::new(Self {
            docs,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn search(&self, query: &SearchQuery, _caller: &CallerIdentity) -> Result<Vec<RetrievedDocument>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.docs.iter().take(query.top_k).cloned().collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

pub struct FailingRetriever;

#[async_trait]
impl Retriever for FailingRetriever {
    async fn search(&self, _query: &SearchQuery, _caller: &CallerIdentity) -> Result<Vec<RetrievedDocument>> {
        Err(Error::Search("index offline".into()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

fn last_user_message(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

/// Answers with the question verbatim; streams it in 4-char fragments.
#[derive(Default)]
pub struct EchoLlm {
    pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl EchoLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn last_system_prompt(&self) -> String {
        self.prompts
            .lock()
            .last()
            .and_then(|p| p.first())
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for EchoLlm {
    async fn complete(&self, _config: &ResolvedLlmConfig, messages: &[ChatMessage]) -> Result<Completion> {
        self.prompts.lock().push(messages.to_vec());
        Ok(Completion {
            content: last_user_message(messages),
            tokens_used: Some(7),
        })
    }

    fn stream_complete(&self, _config: &ResolvedLlmConfig, messages: Vec<ChatMessage>) -> BoxedStream {
        let answer: Vec<char> = last_user_message(&messages).chars().collect();
        self.prompts.lock().push(messages);
        let mut chunks: Vec<StreamChunk> = answer
            .chunks(4)
            .map(|c| StreamChunk::Token(c.iter().collect()))
            .collect();
        chunks.push(StreamChunk::Done {
            tokens_used: Some(7),
        });
        Box::pin(stream::iter(chunks))
    }
}

/// Streams the given fragments, then fails. `complete` fails outright.
pub struct ScriptedLlm {
    fragments: Vec<String>,
    failure: String,
}

impl ScriptedLlm {
    pub fn new(fragments: &[&str], failure: &str) -> Arc<Self> {
        Arc::new(Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            failure: failure.into(),
        })
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _config: &ResolvedLlmConfig, _messages: &[ChatMessage]) -> Result<Completion> {
        Err(Error::Provider(self.failure.clone()))
    }

    fn stream_complete(&self, _config: &ResolvedLlmConfig, _messages: Vec<ChatMessage>) -> BoxedStream {
        let mut chunks: Vec<StreamChunk> = self
            .fragments
            .iter()
            .cloned()
            .map(StreamChunk::Token)
            .collect();
        chunks.push(StreamChunk::Error(self.failure.clone()));
        Box::pin(stream::iter(chunks))
    }
}

/// Sets a flag when dropped; stands in for an upstream HTTP connection.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Emits `fragments`, then never produces anything again. Records stream drops.
pub struct StallingLlm {
    fragments: Vec<String>,
    pub released: Arc<AtomicBool>,
}

impl StallingLlm {
    pub fn new(fragments: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn was_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for StallingLlm {
    async fn complete(&self, _config: &ResolvedLlmConfig, _messages: &[ChatMessage]) -> Result<Completion> {
        let _guard = DropFlag(self.released.clone());
        futures::future::pending().await
    }

    fn stream_complete(&self, _config: &ResolvedLlmConfig, _messages: Vec<ChatMessage>) -> BoxedStream {
        let guard = DropFlag(self.released.clone());
        let head = stream::iter(self.fragments.clone().into_iter().map(StreamChunk::Token));
        Box::pin(head.chain(stream::pending::<StreamChunk>()).map(move |chunk| {
            let _held = &guard;
            chunk
        }))
    }
}

/// Never answers a search; records when the pending call is dropped.
pub struct StallingRetriever {
    pub released: Arc<AtomicBool>,
}

impl StallingRetriever {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn was_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for StallingRetriever {
    async fn search(&self, _query: &SearchQuery, _caller: &CallerIdentity) -> Result<Vec<RetrievedDocument>> {
        let _guard = DropFlag(self.released.clone());
        futures::future::pending().await
    }

    fn name(&self) -> &str {
        "stalling"
    }
}

/// Config store whose lookups never complete; records when a pending lookup is dropped.
pub struct StallingConfigStore {
    pub released: Arc<AtomicBool>,
}

impl StallingConfigStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn was_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    async fn stall<T>(&self) -> Result<T> {
        let _guard = DropFlag(self.released.clone());
        futures::future::pending().await
    }
}

#[async_trait]
impl ConfigResolver for StallingConfigStore {
    async fn default_configs(&self) -> Result<Vec<LlmConfigRecord>> {
        self.stall().await
    }

    async fn config_by_id(&self, _id: &str) -> Result<Option<LlmConfigRecord>> {
        self.stall().await
    }

    async fn has_active_config(&self) -> Result<bool> {
        self.stall().await
    }
}

pub fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        similarity_threshold: 0.0,
        stream_idle_timeout: Duration::from_millis(200),
        completion_timeout: Duration::from_millis(200),
        ..OrchestratorSettings::default()
    }
}

pub fn orchestrator(
    store: Arc<MemoryConfigStore>,
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LlmClient>,
) -> ChatOrchestrator {
    ChatOrchestrator::new(store, retriever, llm, settings())
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
