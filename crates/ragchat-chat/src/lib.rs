//! RAG chat building blocks.
//!
//! LLM configuration snapshots and the default-provider rule, provider clients
//! that complete or stream over HTTP, and deterministic prompt assembly with
//! context-budget trimming.

pub mod config;
pub mod prompt;
pub mod providers;
pub mod sse;
pub mod types;

pub use config::{
    resolve_llm_config, ConfigResolver, FileConfigStore, LlmConfigRecord, MemoryConfigStore,
    ResolvedLlmConfig,
};
pub use prompt::{assemble_prompt, AssembledPrompt};
pub use providers::{BoxedStream, Completion, HttpLlmClient, LlmClient, StreamChunk};
pub use types::*;
