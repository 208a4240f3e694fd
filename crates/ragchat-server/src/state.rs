//! Shared application state.

use ragchat_core::RagChatConfig;
use ragchat_runtime::ChatOrchestrator;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: RagChatConfig,
    pub orchestrator: ChatOrchestrator,
}

impl AppState {
    pub fn new(config: RagChatConfig, orchestrator: ChatOrchestrator) -> Self {
        Self {
            config,
            orchestrator,
        }
    }
}
