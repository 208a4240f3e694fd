//! Orchestrator: resolves the LLM config, retrieves context, assembles the prompt and
//! generates, either in one shot or as a cancellable stream.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::StreamExt;
use ragchat_chat::{
    assemble_prompt, resolve_llm_config, ChatRequest, ChatResponse, ConfigResolver, LlmClient,
    ResolvedLlmConfig, StreamChunk, StreamEvent, TurnMetrics,
};
use ragchat_core::{CallerIdentity, ChatError};
use ragchat_resolve::{
    sort_by_relevance, RetrievedDocument, Retriever, SearchFilters, SearchQuery,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::machine::{transition, StreamInput, StreamState};
use crate::stream::ChatStream;
use crate::types::{OrchestratorSettings, TurnSummary};

/// Coordinates the config store, the retriever and the LLM client.
///
/// Holds no per-turn state; clones share the same collaborators.
#[derive(Clone)]
pub struct ChatOrchestrator {
    resolver: Arc<dyn ConfigResolver>,
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LlmClient>,
    settings: Arc<OrchestratorSettings>,
}

impl ChatOrchestrator {
    pub fn new(
        resolver: Arc<dyn ConfigResolver>,
        retriever: Arc<dyn Retriever>,
        llm: Arc<dyn LlmClient>,
        settings: OrchestratorSettings,
    ) -> Self {
        info!(
            "Chat orchestrator initialized: retriever={}, top_k={}, idle_timeout={:?}",
            retriever.name(),
            settings.top_k,
            settings.stream_idle_timeout
        );
        Self {
            resolver,
            retriever,
            llm,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Snapshot the config a turn with `selector` would use.
    pub async fn resolve_config(
        &self,
        selector: Option<&str>,
    ) -> Result<ResolvedLlmConfig, ChatError> {
        resolve_llm_config(self.resolver.as_ref(), selector, self.settings.context_budget).await
    }

    async fn snapshot(&self, request: &ChatRequest) -> Result<ResolvedLlmConfig, ChatError> {
        let config = self.resolve_config(request.llm_config_id.as_deref()).await?;
        Ok(config.with_overrides(request.temperature, request.max_tokens))
    }

    async fn retrieve(
        &self,
        request: &ChatRequest,
        caller: &CallerIdentity,
    ) -> Result<Vec<RetrievedDocument>, ChatError> {
        if !request.use_rag {
            debug!("Retrieval disabled for this request");
            return Ok(Vec::new());
        }
        let query = SearchQuery {
            query: request.question.clone(),
            top_k: request.top_k.unwrap_or(self.settings.top_k),
            similarity_threshold: request
                .similarity_threshold
                .unwrap_or(self.settings.similarity_threshold),
            filters: SearchFilters {
                project_id: request.project_id.clone(),
            },
        };
        let mut documents = self
            .retriever
            .search(&query, caller)
            .await
            .map_err(|e| ChatError::RetrievalFailure(e.to_string()))?;
        // Prompt trimming drops from the tail.
        sort_by_relevance(&mut documents);
        Ok(documents)
    }

    /// Answer one question with a single completion.
    pub async fn chat(
        &self,
        request: &ChatRequest,
        caller: &CallerIdentity,
    ) -> Result<ChatResponse, ChatError> {
        let turn_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        info!("Chat turn {} started for {}", turn_id, caller);

        let result = self.run_chat(request, caller, &turn_id, started).await;
        match &result {
            Ok(response) => info!(
                "Chat turn {} completed via {} in {}ms ({} citations)",
                turn_id,
                response.provider,
                response.metrics.latency_ms,
                response.citations.len()
            ),
            Err(e) => warn!("Chat turn {} failed ({}): {}", turn_id, e.kind(), e),
        }
        result
    }

    async fn run_chat(
        &self,
        request: &ChatRequest,
        caller: &CallerIdentity,
        turn_id: &str,
        started: Instant,
    ) -> Result<ChatResponse, ChatError> {
        request.validate()?;
        let config = self.snapshot(request).await?;
        let documents = self.retrieve(request, caller).await?;
        let retrieved = documents.len();

        let prompt = assemble_prompt(
            &request.question,
            &request.conversation_history,
            documents,
            config.context_budget,
        );
        if prompt.dropped > 0 {
            debug!(
                "Turn {}: dropped {} excerpts to fit {} chars",
                turn_id, prompt.dropped, config.context_budget
            );
        }

        let limit = self.settings.completion_timeout;
        let generation = self.llm.complete(&config, &prompt.messages);
        let completion = match tokio::time::timeout(limit, generation).await {
            Err(_) => {
                return Err(ChatError::Timeout(format!(
                    "no completion within {}s",
                    limit.as_secs_f64()
                )))
            }
            Ok(result) => result.map_err(|e| ChatError::GenerationFailure(e.to_string()))?,
        };

        Ok(ChatResponse {
            answer: completion.content,
            citations: prompt.citations(),
            provider: config.provider,
            model: config.model,
            config_id: config.config_id,
            turn_id: turn_id.to_string(),
            session_id: request.session_id.clone(),
            metrics: TurnMetrics {
                latency_ms: started.elapsed().as_millis() as u64,
                tokens_used: completion.tokens_used,
                documents_retrieved: retrieved,
                documents_included: prompt.included.len(),
            },
            generated_at: Utc::now(),
        })
    }

    /// Start a streaming turn. Must be called from within a tokio runtime.
    pub fn chat_stream(&self, request: ChatRequest, caller: CallerIdentity) -> ChatStream {
        let turn_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));

        let this = self.clone();
        let id = turn_id.clone();
        tokio::spawn(async move {
            info!("Stream turn {} started for {}", id, caller);
            let mut turn = StreamTurn {
                state: StreamState::Resolving,
                tx,
            };
            this.drive_stream(&mut turn, request, &caller, &id).await;
            match turn.state {
                StreamState::Completed => info!("Stream turn {} completed", id),
                StreamState::Cancelled => info!("Stream turn {} cancelled by caller", id),
                state => warn!("Stream turn {} ended in {:?}", id, state),
            }
        });

        ChatStream::new(turn_id, rx)
    }

    async fn drive_stream(
        &self,
        turn: &mut StreamTurn,
        request: ChatRequest,
        caller: &CallerIdentity,
        turn_id: &str,
    ) {
        let started = Instant::now();
        if let Err(err) = request.validate() {
            turn.apply(StreamInput::Failed(err)).await;
            return;
        }

        // RESOLVING
        let config = match turn.unless_closed(self.snapshot(&request)).await {
            None => return,
            Some(Err(err)) => {
                turn.apply(StreamInput::Failed(err)).await;
                return;
            }
            Some(Ok(config)) => config,
        };
        if !turn.apply(StreamInput::Resolved).await {
            return;
        }

        // RETRIEVING
        let documents = match turn.unless_closed(self.retrieve(&request, caller)).await {
            None => return,
            Some(Err(err)) => {
                turn.apply(StreamInput::Failed(err)).await;
                return;
            }
            Some(Ok(documents)) => documents,
        };
        let retrieved = documents.len();
        let prompt = assemble_prompt(
            &request.question,
            &request.conversation_history,
            documents,
            config.context_budget,
        );
        let included = prompt.included.len();
        if !turn.apply(StreamInput::Retrieved(prompt.citations())).await {
            return;
        }

        // STREAMING
        let idle = self.settings.stream_idle_timeout;
        let mut upstream = self.llm.stream_complete(&config, prompt.messages);
        let summary = |tokens_used: Option<usize>| TurnSummary {
            provider: config.provider,
            model: config.model.clone(),
            turn_id: turn_id.to_string(),
            metrics: TurnMetrics {
                latency_ms: started.elapsed().as_millis() as u64,
                tokens_used,
                documents_retrieved: retrieved,
                documents_included: included,
            },
        };

        loop {
            let next = match turn
                .unless_closed(tokio::time::timeout(idle, upstream.next()))
                .await
            {
                None => return,
                Some(next) => next,
            };
            let input = match next {
                Err(_) => StreamInput::IdleTimeout(idle),
                Ok(Some(StreamChunk::Token(text))) => StreamInput::Fragment(text),
                Ok(Some(StreamChunk::Error(reason))) => StreamInput::UpstreamFailed(reason),
                Ok(Some(StreamChunk::Done { tokens_used })) => {
                    StreamInput::Finished(summary(tokens_used))
                }
                Ok(None) => StreamInput::Finished(summary(None)),
            };
            if !turn.apply(input).await {
                return;
            }
        }
    }
}

/// Producer side of one streaming turn.
struct StreamTurn {
    state: StreamState,
    tx: mpsc::Sender<StreamEvent>,
}

impl StreamTurn {
    /// Feed one input through the state machine and deliver its event.
    /// Returns `false` once the turn is over.
    async fn apply(&mut self, input: StreamInput) -> bool {
        let (next, event) = transition(self.state, input);
        self.state = next;
        if let Some(event) = event {
            if self.tx.send(event).await.is_err() {
                self.state = transition(self.state, StreamInput::Closed).0;
            }
        }
        !self.state.is_terminal()
    }

    /// Await `fut` unless the consumer closes the stream first, in which case `fut` is
    /// dropped and the turn is cancelled.
    async fn unless_closed<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        let out = tokio::select! {
            biased;
            _ = self.tx.closed() => None,
            out = fut => Some(out),
        };
        if out.is_none() {
            self.state = transition(self.state, StreamInput::Closed).0;
        }
        out
    }
}
