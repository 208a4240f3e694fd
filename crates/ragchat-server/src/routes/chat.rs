//! RAG chat routes: single-shot answers, SSE streaming and provider status.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use ragchat_chat::{ChatRequest, ChatResponse, ChatStatus, StreamEvent};
use ragchat_core::{CallerIdentity, ChatError, ChatErrorKind};
use tokio_stream::StreamExt;
use tracing::{error, warn};

use crate::state::AppState;

type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// Header carrying the authenticated user, set by the gateway in front of this service.
const USER_HEADER: &str = "x-user-id";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rag/chat", post(chat))
        .route("/rag/chat/stream", post(stream_chat))
        .route("/rag/chat/status", get(get_status))
}

fn caller_from(headers: &HeaderMap) -> CallerIdentity {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(CallerIdentity::new)
        .unwrap_or_else(CallerIdentity::anonymous)
}

// ---------------------------------------------------------------
// Errors
// ---------------------------------------------------------------

/// Classified chat failure rendered as `{"error": {"kind", "message"}}`.
pub struct ApiError(ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self(err)
    }
}

pub fn status_for(kind: ChatErrorKind) -> StatusCode {
    match kind {
        ChatErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ChatErrorKind::ConfigurationUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ChatErrorKind::RetrievalFailure
        | ChatErrorKind::GenerationFailure
        | ChatErrorKind::PartialGenerationFailure => StatusCode::BAD_GATEWAY,
        ChatErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        (
            status_for(kind),
            Json(serde_json::json!({
                "error": {
                    "kind": kind,
                    "message": self.0.to_string(),
                }
            })),
        )
            .into_response()
    }
}

fn rejection_error(rejection: JsonRejection) -> ChatError {
    ChatError::InvalidRequest(rejection.body_text())
}

// ---------------------------------------------------------------
// Status
// ---------------------------------------------------------------

async fn get_status(State(state): State<Arc<AppState>>) -> Json<ChatStatus> {
    let resolved = match state.orchestrator.resolve_config(None).await {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("No usable LLM config: {}", e);
            None
        }
    };

    Json(ChatStatus {
        llm_available: resolved.is_some(),
        llm_provider: resolved.as_ref().map(|c| c.provider.to_string()),
        default_model: resolved.as_ref().map(|c| c.model.clone()),
        config_id: resolved.as_ref().map(|c| c.config_id.clone()),
        retriever_url: state.config.retriever.base_url.clone(),
    })
}

// ---------------------------------------------------------------
// Non-streaming chat
// ---------------------------------------------------------------

async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = body.map_err(rejection_error)?;
    let response = state.orchestrator.chat(&req, &caller_from(&headers)).await?;
    Ok(Json(response))
}

// ---------------------------------------------------------------
// Streaming chat (SSE)
// ---------------------------------------------------------------

fn to_sse(event: &StreamEvent) -> Event {
    Event::default()
        .event(event.name())
        .json_data(event)
        .unwrap_or_else(|e| {
            error!("Failed to encode {} event: {}", event.name(), e);
            Event::default()
                .event("error")
                .data(r#"{"type":"error","kind":"generation_failure","message":"event encoding failed"}"#)
        })
}

async fn stream_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Sse<KeepAliveStream<SseStream>> {
    let stream: SseStream = match body {
        Ok(Json(req)) => {
            let events = state.orchestrator.chat_stream(req, caller_from(&headers));
            Box::pin(events.map(|event| Ok::<_, Infallible>(to_sse(&event))))
        }
        Err(rejection) => {
            let event = StreamEvent::from_error(&rejection_error(rejection));
            Box::pin(tokio_stream::once(Ok::<_, Infallible>(to_sse(&event))))
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::build_router;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use ragchat_chat::{
        BoxedStream, ChatMessage, Completion, LlmClient, LlmConfigRecord, LlmProvider,
        MemoryConfigStore, ResolvedLlmConfig, StreamChunk,
    };
    use ragchat_core::RagChatConfig;
    use ragchat_resolve::{MemoryDocument, MemoryRetriever};
    use ragchat_runtime::{ChatOrchestrator, OrchestratorSettings};
    use tower::ServiceExt;

    /// Answers with the question, streamed word by word.
    struct EchoLlm;

    fn question_of(messages: &[ChatMessage]) -> String {
        messages.last().map(|m| m.content.clone()).unwrap_or_default()
    }

    #[async_trait]
    impl LlmClient for EchoLlm {
        async fn complete(
            &self,
            _config: &ResolvedLlmConfig,
            messages: &[ChatMessage],
        ) -> ragchat_core::Result<Completion> {
            Ok(Completion {
                content: question_of(messages),
                tokens_used: None,
            })
        }

        fn stream_complete(
            &self,
            _config: &ResolvedLlmConfig,
            messages: Vec<ChatMessage>,
        ) -> BoxedStream {
            let question = question_of(&messages);
            let mut chunks: Vec<StreamChunk> = question
                .split_inclusive(' ')
                .map(|w| StreamChunk::Token(w.to_string()))
                .collect();
            chunks.push(StreamChunk::Done { tokens_used: None });
            Box::pin(futures::stream::iter(chunks))
        }
    }

    fn app(configs: Vec<LlmConfigRecord>) -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = RagChatConfig::from_lookup(dir.path(), |_| None).unwrap();

        let retriever = MemoryRetriever::new(vec![
            MemoryDocument::new("doc-1", "guide.md", "To reset your password use the login page"),
            MemoryDocument::new("doc-2", "private.md", "Password vault notes").owned_by("bob"),
        ]);
        let settings = OrchestratorSettings {
            similarity_threshold: 0.0,
            ..OrchestratorSettings::from_defaults(&config.chat)
        };
        let orchestrator = ChatOrchestrator::new(
            Arc::new(MemoryConfigStore::new(configs)),
            Arc::new(retriever),
            Arc::new(EchoLlm),
            settings,
        );

        let state = Arc::new(AppState::new(config, orchestrator));
        (build_router(state), dir)
    }

    fn default_config() -> LlmConfigRecord {
        let mut record = LlmConfigRecord::new("cfg-1", LlmProvider::OpenWebUI, "llama3.1");
        record.api_key = Some("k".into());
        record.is_default = true;
        record
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_chat_returns_answer_and_citations() {
        let (app, _dir) = app(vec![default_config()]);
        let response = app
            .oneshot(post_json("/api/rag/chat", r#"{"question": "reset password"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["answer"], "reset password");
        assert_eq!(json["provider"], "OPENWEBUI");
        assert_eq!(json["citations"][0]["id"], "doc-1");
        assert_eq!(json["citations"].as_array().unwrap().len(), 1);
        assert!(json["turnId"].is_string());
        assert!(json["generatedAt"].is_string());
        assert!(json["metrics"]["latencyMs"].is_number());
    }

    #[tokio::test]
    async fn test_caller_header_scopes_retrieval() {
        let (app, _dir) = app(vec![default_config()]);
        let request = Request::builder()
            .method("POST")
            .uri("/api/rag/chat")
            .header("content-type", "application/json")
            .header("X-User-Id", "bob")
            .body(Body::from(r#"{"question": "password vault"}"#))
            .unwrap();
        let json = body_json(app.oneshot(request).await.unwrap()).await;

        let ids: Vec<_> = json["citations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["id"].as_str().unwrap().to_string())
            .collect();
        assert!(ids.contains(&"doc-2".to_string()));
    }

    #[tokio::test]
    async fn test_no_config_is_service_unavailable() {
        let (app, _dir) = app(Vec::new());
        let response = app
            .oneshot(post_json("/api/rag/chat", r#"{"question": "hello"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["error"]["kind"], "configuration_unavailable");
        assert!(json["error"]["message"].is_string());
    }

    #[tokio::test]
    async fn test_invalid_requests_are_bad_request() {
        let (app, _dir) = app(vec![default_config()]);
        let response = app
            .clone()
            .oneshot(post_json("/api/rag/chat", r#"{"question": "   "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["kind"], "invalid_request");

        let response = app
            .oneshot(post_json("/api/rag/chat", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["kind"], "invalid_request");
    }

    #[tokio::test]
    async fn test_stream_event_order() {
        let (app, _dir) = app(vec![default_config()]);
        let response = app
            .oneshot(post_json(
                "/api/rag/chat/stream",
                r#"{"question": "how to reset password"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        let sources = text.find("event: sources").unwrap();
        let token = text.find("event: token").unwrap();
        let done = text.find("event: done").unwrap();
        assert!(sources < token && token < done);
        assert!(!text.contains("event: error"));
        assert!(text.contains(r#""content":"reset ""#));
    }

    #[tokio::test]
    async fn test_stream_response_is_event_stream() {
        let (app, _dir) = app(vec![default_config()]);
        let response = app
            .oneshot(post_json("/api/rag/chat/stream", r#"{"question": "hello"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("text/event-stream"));
        let text = body_text(response).await;
        assert!(text.ends_with("\n\n"));
        assert!(text.contains("event: done"));
    }

    #[tokio::test]
    async fn test_stream_without_config_sends_single_error() {
        let (app, _dir) = app(Vec::new());
        let response = app
            .oneshot(post_json("/api/rag/chat/stream", r#"{"question": "hello"}"#))
            .await
            .unwrap();

        let text = body_text(response).await;
        assert_eq!(text.matches("event: ").count(), 1);
        assert!(text.contains("event: error"));
        assert!(text.contains("configuration_unavailable"));
    }

    #[tokio::test]
    async fn test_stream_malformed_body_sends_invalid_request() {
        let (app, _dir) = app(vec![default_config()]);
        let response = app
            .oneshot(post_json("/api/rag/chat/stream", r#"{"topK": 3}"#))
            .await
            .unwrap();

        let text = body_text(response).await;
        assert_eq!(text.matches("event: ").count(), 1);
        assert!(text.contains("invalid_request"));
    }

    #[tokio::test]
    async fn test_status() {
        let (app, _dir) = app(vec![default_config()]);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/rag/chat/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["llmAvailable"], true);
        assert_eq!(json["llmProvider"], "openwebui");
        assert_eq!(json["defaultModel"], "llama3.1");
        assert_eq!(json["configId"], "cfg-1");
        assert_eq!(json["retrieverUrl"], "http://localhost:8001");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ChatErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status_for(ChatErrorKind::PartialGenerationFailure),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(status_for(ChatErrorKind::RetrievalFailure), StatusCode::BAD_GATEWAY);
    }
}
