//! Streaming turn state machine.
//!
//! ```text
//! RESOLVING -> RETRIEVING -> STREAMING -> COMPLETED
//!     |            |            |
//!     +------------+------------+-> FAILED | CANCELLED
//! ```
//!
//! [`transition`] is the only place a streaming turn changes state; it also decides which
//! event, if any, the caller sees. Terminal states absorb every further input silently.

use std::time::Duration;

use ragchat_chat::{Citation, StreamEvent};
use ragchat_core::{ChatError, ChatErrorKind};

use crate::types::TurnSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Resolving,
    Retrieving,
    Streaming { tokens_emitted: usize },
    Completed,
    Failed(ChatErrorKind),
    Cancelled,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::Cancelled)
    }
}

/// Everything that can move a streaming turn forward.
#[derive(Debug, Clone)]
pub enum StreamInput {
    /// LLM config snapshot taken.
    Resolved,
    /// Retrieval finished; citations of the documents that made it into the prompt.
    Retrieved(Vec<Citation>),
    Fragment(String),
    /// Upstream reached its end marker.
    Finished(TurnSummary),
    /// Request, config or retrieval failure, already classified.
    Failed(ChatError),
    /// Upstream broke mid-sequence.
    UpstreamFailed(String),
    IdleTimeout(Duration),
    /// Consumer closed the handle.
    Closed,
}

pub fn transition(state: StreamState, input: StreamInput) -> (StreamState, Option<StreamEvent>) {
    use StreamInput as I;
    use StreamState as S;

    if state.is_terminal() {
        return (state, None);
    }

    match (state, input) {
        (_, I::Closed) => (S::Cancelled, None),
        (_, I::Failed(err)) => fail(err),

        (S::Resolving, I::Resolved) => (S::Retrieving, None),
        (S::Retrieving, I::Retrieved(sources)) => (
            S::Streaming { tokens_emitted: 0 },
            Some(StreamEvent::Sources { sources }),
        ),

        (S::Streaming { tokens_emitted }, I::Fragment(content)) => (
            S::Streaming {
                tokens_emitted: tokens_emitted + 1,
            },
            Some(StreamEvent::Token { content }),
        ),
        (S::Streaming { .. }, I::Finished(summary)) => (
            S::Completed,
            Some(StreamEvent::Done {
                provider: summary.provider,
                model: summary.model,
                turn_id: summary.turn_id,
                metrics: summary.metrics,
            }),
        ),
        (S::Streaming { tokens_emitted }, I::UpstreamFailed(reason)) => {
            if tokens_emitted > 0 {
                fail(ChatError::PartialGenerationFailure {
                    tokens_emitted,
                    reason,
                })
            } else {
                fail(ChatError::GenerationFailure(reason))
            }
        }
        (S::Streaming { .. }, I::IdleTimeout(window)) => fail(ChatError::Timeout(format!(
            "no output from the LLM for {}s",
            window.as_secs_f64()
        ))),

        (state, input) => {
            let err = ChatError::GenerationFailure(format!(
                "unexpected {} while {:?}",
                input_name(&input),
                state
            ));
            fail(err)
        }
    }
}

fn fail(err: ChatError) -> (StreamState, Option<StreamEvent>) {
    (
        StreamState::Failed(err.kind()),
        Some(StreamEvent::from_error(&err)),
    )
}

fn input_name(input: &StreamInput) -> &'static str {
    match input {
        StreamInput::Resolved => "resolved",
        StreamInput::Retrieved(_) => "retrieved",
        StreamInput::Fragment(_) => "fragment",
        StreamInput::Finished(_) => "finished",
        StreamInput::Failed(_) => "failed",
        StreamInput::UpstreamFailed(_) => "upstream failure",
        StreamInput::IdleTimeout(_) => "idle timeout",
        StreamInput::Closed => "close",
    }
}
