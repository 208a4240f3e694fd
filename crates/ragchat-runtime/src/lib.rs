//! Chat orchestrator: coordinates config resolution, retrieval and generation.
//!
//! Provides the synchronous `chat` turn and the streaming `chat_stream` turn, whose
//! progress is an explicit state machine (see [`machine`]).

pub mod machine;
pub mod orchestrator;
pub mod stream;
pub mod types;

pub use machine::{transition, StreamInput, StreamState};
pub use orchestrator::ChatOrchestrator;
pub use stream::ChatStream;
pub use types::*;
