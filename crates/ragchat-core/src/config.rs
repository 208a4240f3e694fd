//! Configuration and data directory management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Paths to the ragchat data directory and the files inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// LLM provider configurations (`data/llm-configs.json`), written by the admin tool.
    pub llm_configs_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates the root if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            llm_configs_file: root.join("llm-configs.json"),
            root,
        })
    }
}

/// Where and how to reach the retrieval service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverSettings {
    /// Base URL of the rag-service (`/api/v1/search/similar` is appended).
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Per-turn defaults applied when a request or LLM config leaves them unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDefaults {
    pub top_k: usize,
    pub similarity_threshold: f64,
    /// Prompt size limit in characters for configs that do not declare one.
    pub context_budget: usize,
    /// Longest gap tolerated between two streamed fragments.
    pub stream_idle_timeout: Duration,
    /// Upper bound on a single-shot completion.
    pub completion_timeout: Duration,
}

impl Default for ChatDefaults {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.7,
            context_budget: 12_000,
            stream_idle_timeout: Duration::from_secs(60),
            completion_timeout: Duration::from_secs(180),
        }
    }
}

/// Top-level ragchat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagChatConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    pub retriever: RetrieverSettings,
    pub chat: ChatDefaults,
}

impl RagChatConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::from_lookup(data_dir, |key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup (environment in production).
    pub fn from_lookup<F>(data_dir: impl AsRef<Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ChatDefaults::default();

        let port = parse_or(&lookup, "PORT", 3004u16)?;
        let base_url = lookup("RAGCHAT_RETRIEVER_URL")
            .unwrap_or_else(|| "http://localhost:8001".to_string())
            .trim_end_matches('/')
            .to_string();
        let retriever_timeout = parse_or(&lookup, "RAGCHAT_RETRIEVER_TIMEOUT_SECS", 30u64)?;

        let chat = ChatDefaults {
            top_k: parse_or(&lookup, "RAGCHAT_TOP_K", defaults.top_k)?,
            similarity_threshold: parse_or(
                &lookup,
                "RAGCHAT_SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            )?,
            context_budget: parse_or(&lookup, "RAGCHAT_CONTEXT_BUDGET", defaults.context_budget)?,
            stream_idle_timeout: Duration::from_secs(parse_or(
                &lookup,
                "RAGCHAT_STREAM_IDLE_TIMEOUT_SECS",
                defaults.stream_idle_timeout.as_secs(),
            )?),
            completion_timeout: Duration::from_secs(parse_or(
                &lookup,
                "RAGCHAT_COMPLETION_TIMEOUT_SECS",
                defaults.completion_timeout.as_secs(),
            )?),
        };

        let config = Self {
            port,
            data_paths: DataPaths::new(data_dir)?,
            retriever: RetrieverSettings {
                base_url,
                timeout: Duration::from_secs(retriever_timeout),
            },
            chat,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.chat.top_k == 0 {
            return Err(Error::Config("RAGCHAT_TOP_K must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.chat.similarity_threshold) {
            return Err(Error::Config(
                "RAGCHAT_SIMILARITY_THRESHOLD must be within 0.0..=1.0".into(),
            ));
        }
        if self.chat.stream_idle_timeout.is_zero() || self.chat.completion_timeout.is_zero() {
            return Err(Error::Config("timeouts must be greater than zero".into()));
        }
        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {}: {:?}", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RagChatConfig::from_lookup(dir.path(), lookup_from(&[])).unwrap();
        assert_eq!(config.port, 3004);
        assert_eq!(config.retriever.base_url, "http://localhost:8001");
        assert_eq!(config.chat.top_k, 5);
        assert_eq!(config.chat.stream_idle_timeout, Duration::from_secs(60));
        assert_eq!(
            config.data_paths.llm_configs_file,
            dir.path().join("llm-configs.json")
        );
    }

    #[test]
    fn test_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let config = RagChatConfig::from_lookup(
            dir.path(),
            lookup_from(&[
                ("PORT", "9000"),
                ("RAGCHAT_RETRIEVER_URL", "http://rag:8000/"),
                ("RAGCHAT_TOP_K", "8"),
                ("RAGCHAT_STREAM_IDLE_TIMEOUT_SECS", "5"),
            ]),
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.retriever.base_url, "http://rag:8000");
        assert_eq!(config.chat.top_k, 8);
        assert_eq!(config.chat.stream_idle_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = RagChatConfig::from_lookup(dir.path(), lookup_from(&[("PORT", "http")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = RagChatConfig::from_lookup(
            dir.path(),
            lookup_from(&[("RAGCHAT_SIMILARITY_THRESHOLD", "1.5")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
