//! ragchat core: configuration, the chat error taxonomy and caller identity.

pub mod config;
pub mod error;
pub mod identity;

pub use config::{ChatDefaults, DataPaths, RagChatConfig, RetrieverSettings};
pub use error::{ChatError, ChatErrorKind, Error, Result};
pub use identity::CallerIdentity;
