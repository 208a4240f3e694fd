//! Runtime types.

use std::time::Duration;

use ragchat_chat::{LlmProvider, TurnMetrics};
use ragchat_core::ChatDefaults;

/// Per-turn limits and retrieval defaults for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub top_k: usize,
    pub similarity_threshold: f64,
    /// Prompt budget (characters) for configs that do not declare one.
    pub context_budget: usize,
    /// Longest wait for the next streamed fragment.
    pub stream_idle_timeout: Duration,
    /// Upper bound on a single-shot completion.
    pub completion_timeout: Duration,
    /// Events buffered between the stream task and its consumer.
    pub channel_capacity: usize,
}

impl OrchestratorSettings {
    pub fn from_defaults(defaults: &ChatDefaults) -> Self {
        Self {
            top_k: defaults.top_k,
            similarity_threshold: defaults.similarity_threshold,
            context_budget: defaults.context_budget,
            stream_idle_timeout: defaults.stream_idle_timeout,
            completion_timeout: defaults.completion_timeout,
            channel_capacity: 32,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_defaults(&ChatDefaults::default())
    }
}

/// What a completed stream reports in its `done` event.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSummary {
    pub provider: LlmProvider,
    pub model: String,
    pub turn_id: String,
    pub metrics: TurnMetrics,
}
