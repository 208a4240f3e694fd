//! LLM configuration records, the stores that hold them, and per-turn snapshot resolution.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use ragchat_core::{ChatError, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::LlmProvider;

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: usize = 2000;

/// Stored LLM configuration, as written to `llm-configs.json` by the admin tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfigRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub provider: LlmProvider,
    #[serde(default, rename = "apiUrl")]
    pub api_url: String,
    #[serde(rename = "modelName")]
    pub model_name: String,
    /// Inline credential.
    #[serde(default, rename = "apiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Name of an environment variable holding the credential. Takes precedence over `apiKey`.
    #[serde(default, rename = "apiKeyEnv", skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_active", rename = "isActive")]
    pub is_active: bool,
    #[serde(default, rename = "isDefault")]
    pub is_default: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default, rename = "maxTokens")]
    pub max_tokens: Option<usize>,
    /// Prompt size limit in characters.
    #[serde(default, rename = "contextBudget")]
    pub context_budget: Option<usize>,
}

fn default_active() -> bool {
    true
}

impl LlmConfigRecord {
    pub fn new(id: impl Into<String>, provider: LlmProvider, model_name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider,
            api_url: String::new(),
            model_name: model_name.into(),
            api_key: None,
            api_key_env: None,
            is_active: true,
            is_default: false,
            temperature: None,
            max_tokens: None,
            context_budget: None,
        }
    }
}

/// Read-only snapshot of one LLM configuration, taken at the start of a turn.
#[derive(Clone, PartialEq)]
pub struct ResolvedLlmConfig {
    pub config_id: String,
    pub name: String,
    pub provider: LlmProvider,
    /// Normalised base URL; the provider's completions path is appended per call.
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: usize,
    pub context_budget: usize,
}

impl std::fmt::Debug for ResolvedLlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedLlmConfig")
            .field("config_id", &self.config_id)
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("context_budget", &self.context_budget)
            .finish()
    }
}

impl ResolvedLlmConfig {
    /// Full URL of the provider's completion endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}{}", self.endpoint, self.provider.completions_path())
    }

    /// Copy with per-request generation overrides applied.
    pub fn with_overrides(&self, temperature: Option<f64>, max_tokens: Option<usize>) -> Self {
        let mut config = self.clone();
        if let Some(t) = temperature {
            config.temperature = t;
        }
        if let Some(m) = max_tokens {
            config.max_tokens = m;
        }
        config
    }

    /// Snapshot a record, resolving its credential. Fails without partial application.
    pub fn from_record(
        record: &LlmConfigRecord,
        fallback_budget: usize,
        lookup_env: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, ChatError> {
        let api_key = match &record.api_key_env {
            Some(var) => Some(lookup_env(var).filter(|v| !v.trim().is_empty()).ok_or_else(|| {
                ChatError::ConfigurationUnavailable(format!(
                    "credential variable {} for config {} is not set",
                    var, record.id
                ))
            })?),
            None => record.api_key.clone().filter(|k| !k.trim().is_empty()),
        };
        if api_key.is_none() && record.provider.requires_api_key() {
            return Err(ChatError::ConfigurationUnavailable(format!(
                "config {} ({}) has no API key",
                record.id, record.provider
            )));
        }
        if record.model_name.trim().is_empty() {
            return Err(ChatError::ConfigurationUnavailable(format!(
                "config {} has no model name",
                record.id
            )));
        }

        let endpoint = if record.api_url.trim().is_empty() {
            record.provider.default_base_url().to_string()
        } else {
            normalize_api_url(&record.api_url, record.provider)
        };

        Ok(Self {
            config_id: record.id.clone(),
            name: record.name.clone(),
            provider: record.provider,
            endpoint,
            api_key,
            model: record.model_name.clone(),
            temperature: record.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: record.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            context_budget: record.context_budget.unwrap_or(fallback_budget),
        })
    }
}

/// Strip trailing slashes and the provider's own completions path from a configured URL.
pub fn normalize_api_url(url: &str, provider: LlmProvider) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let suffix = provider.completions_path();
    let cut = trimmed.len().checked_sub(suffix.len()).filter(|&at| {
        trimmed.is_char_boundary(at) && trimmed[at..].eq_ignore_ascii_case(suffix)
    });
    match cut {
        Some(at) => trimmed[..at].trim_end_matches('/').to_string(),
        None => trimmed.to_string(),
    }
}

/// Source of LLM configuration records. Every call is a fresh snapshot read.
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    /// Records flagged default and active, in store order. Normally zero or one.
    async fn default_configs(&self) -> Result<Vec<LlmConfigRecord>>;

    async fn config_by_id(&self, id: &str) -> Result<Option<LlmConfigRecord>>;

    async fn has_active_config(&self) -> Result<bool>;
}

/// Resolve the configuration for one turn: explicit id, else default-active, else unavailable.
pub async fn resolve_llm_config(
    resolver: &dyn ConfigResolver,
    selector: Option<&str>,
    fallback_budget: usize,
) -> std::result::Result<ResolvedLlmConfig, ChatError> {
    resolve_llm_config_with(resolver, selector, fallback_budget, |var| {
        std::env::var(var).ok()
    })
    .await
}

/// [`resolve_llm_config`] with an injectable environment lookup.
pub async fn resolve_llm_config_with(
    resolver: &dyn ConfigResolver,
    selector: Option<&str>,
    fallback_budget: usize,
    lookup_env: impl Fn(&str) -> Option<String>,
) -> std::result::Result<ResolvedLlmConfig, ChatError> {
    let unavailable = |e: Error| ChatError::ConfigurationUnavailable(e.to_string());

    let record = match selector {
        Some(id) => {
            let record = resolver
                .config_by_id(id)
                .await
                .map_err(unavailable)?
                .ok_or_else(|| {
                    ChatError::ConfigurationUnavailable(format!("LLM config {} not found", id))
                })?;
            if !record.is_active {
                return Err(ChatError::ConfigurationUnavailable(format!(
                    "LLM config {} is inactive",
                    id
                )));
            }
            record
        }
        None => {
            if !resolver.has_active_config().await.map_err(unavailable)? {
                return Err(ChatError::ConfigurationUnavailable(
                    "no active LLM config".into(),
                ));
            }
            let mut defaults = resolver.default_configs().await.map_err(unavailable)?;
            if defaults.len() > 1 {
                let ids: Vec<&str> = defaults.iter().map(|c| c.id.as_str()).collect();
                warn!(
                    "Multiple default LLM configs ({}); using the first: {}",
                    ids.join(", "),
                    ids[0]
                );
            }
            if defaults.is_empty() {
                return Err(ChatError::ConfigurationUnavailable(
                    "no default LLM config".into(),
                ));
            }
            defaults.swap_remove(0)
        }
    };

    let resolved = ResolvedLlmConfig::from_record(&record, fallback_budget, lookup_env)?;
    debug!(
        "Resolved LLM config {} ({} / {})",
        resolved.config_id, resolved.provider, resolved.model
    );
    Ok(resolved)
}

fn default_active_of(records: Vec<LlmConfigRecord>) -> Vec<LlmConfigRecord> {
    records
        .into_iter()
        .filter(|c| c.is_default && c.is_active)
        .collect()
}

/// Reads `llm-configs.json` (a JSON array of records) on every call.
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<LlmConfigRecord>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No LLM config file at {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| {
            Error::Config(format!("Malformed {}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl ConfigResolver for FileConfigStore {
    async fn default_configs(&self) -> Result<Vec<LlmConfigRecord>> {
        Ok(default_active_of(self.load().await?))
    }

    async fn config_by_id(&self, id: &str) -> Result<Option<LlmConfigRecord>> {
        Ok(self.load().await?.into_iter().find(|c| c.id == id))
    }

    async fn has_active_config(&self) -> Result<bool> {
        Ok(self.load().await?.iter().any(|c| c.is_active))
    }
}

/// In-process store; `replace` swaps the whole record set.
#[derive(Default)]
pub struct MemoryConfigStore {
    records: RwLock<Vec<LlmConfigRecord>>,
}

impl MemoryConfigStore {
    pub fn new(records: Vec<LlmConfigRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn replace(&self, records: Vec<LlmConfigRecord>) {
        *self.records.write() = records;
    }
}

#[async_trait]
impl ConfigResolver for MemoryConfigStore {
    async fn default_configs(&self) -> Result<Vec<LlmConfigRecord>> {
        Ok(default_active_of(self.records.read().clone()))
    }

    async fn config_by_id(&self, id: &str) -> Result<Option<LlmConfigRecord>> {
        Ok(self.records.read().iter().find(|c| c.id == id).cloned())
    }

    async fn has_active_config(&self) -> Result<bool> {
        Ok(self.records.read().iter().any(|c| c.is_active))
    }
}
