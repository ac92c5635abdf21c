//! Configuration schema for the paperchat service.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Root config for the paperchat service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatConfig {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

impl ChatConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> ChatConfigBuilder {
        ChatConfigBuilder::new()
    }

    /// Load the config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = ChatConfig::default();

        if let Some(value) = read_var("PAPERCHAT_RATE_LIMIT_PER_HOUR")? {
            config.limits.rate_limit_per_hour = value;
        }
        if let Some(value) = read_var("PAPERCHAT_MAX_MESSAGE_TOKENS")? {
            config.limits.max_message_tokens = value;
        }
        if let Some(value) = read_var("PAPERCHAT_MAX_CONVERSATION_MESSAGES")? {
            config.limits.max_conversation_messages = value;
        }
        if let Some(value) = read_var("PAPERCHAT_INACTIVITY_TIMEOUT_MINUTES")? {
            config.limits.inactivity_timeout_minutes = value;
        }
        if let Some(value) = read_var("PAPERCHAT_CLEANUP_INTERVAL_MINUTES")? {
            config.limits.cleanup_interval_minutes = value;
        }
        if let Some(value) = read_var::<StoreBackendKind>("PAPERCHAT_STORE_BACKEND")? {
            config.storage.backend = value;
        }
        config.storage.redis_url = env::var("REDIS_URL").ok();
        config.completion.api_key = env::var("OPENAI_API_KEY").ok();
        if let Ok(value) = env::var("OPENAI_BASE_URL") {
            config.completion.base_url = value;
        }
        if let Ok(value) = env::var("PAPERCHAT_MODEL") {
            config.completion.model = value;
        }
        if let Ok(value) = env::var("PAPERCHAT_PAPERS_JSON") {
            config.catalog.metadata_path = PathBuf::from(value);
        }
        if let Ok(value) = env::var("PAPERCHAT_PAPER_TEXT_DIR") {
            config.catalog.text_dir = PathBuf::from(value);
        }
        config.analytics.db_path = env::var("PAPERCHAT_ANALYTICS_DB").ok().map(PathBuf::from);

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.rate_limit_per_hour == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit_per_hour must be at least 1".to_string(),
            ));
        }
        if self.limits.inactivity_timeout_minutes == 0 {
            return Err(ConfigError::Invalid(
                "inactivity_timeout_minutes must be at least 1".to_string(),
            ));
        }
        if self.limits.cleanup_interval_minutes == 0 {
            // A zero period would panic the sweep timer.
            return Err(ConfigError::Invalid(
                "cleanup_interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.storage.backend == StoreBackendKind::Redis && self.storage.redis_url.is_none() {
            return Err(ConfigError::Missing("REDIS_URL"));
        }
        Ok(())
    }
}

/// Builder for assembling a `ChatConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct ChatConfigBuilder {
    config: ChatConfig,
}

impl ChatConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: ChatConfig::default(),
        }
    }

    /// Replace the limits configuration.
    pub fn limits(mut self, limits: LimitsConfig) -> Self {
        self.config.limits = limits;
        self
    }

    /// Replace the storage configuration.
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    /// Replace the completion configuration.
    pub fn completion(mut self, completion: CompletionConfig) -> Self {
        self.config.completion = completion;
        self
    }

    /// Replace the catalog configuration.
    pub fn catalog(mut self, catalog: CatalogConfig) -> Self {
        self.config.catalog = catalog;
        self
    }

    /// Replace the analytics configuration.
    pub fn analytics(mut self, analytics: AnalyticsConfig) -> Self {
        self.config.analytics = analytics;
        self
    }

    /// Finalize and return the built `ChatConfig`.
    pub fn build(self) -> ChatConfig {
        self.config
    }
}

/// Policy limits enforced per request and per conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Messages a client may send within one rolling hour.
    #[serde(default = "default_rate_limit_per_hour")]
    pub rate_limit_per_hour: u32,
    /// Approximate token ceiling for a single message.
    #[serde(default = "default_max_message_tokens")]
    pub max_message_tokens: usize,
    /// User+assistant message cap per conversation.
    #[serde(default = "default_max_conversation_messages")]
    pub max_conversation_messages: usize,
    /// Minutes of inactivity before a conversation expires.
    #[serde(default = "default_inactivity_timeout_minutes")]
    pub inactivity_timeout_minutes: u64,
    /// Minutes between cleanup sweeps (memory backend only).
    #[serde(default = "default_cleanup_interval_minutes")]
    pub cleanup_interval_minutes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_hour: default_rate_limit_per_hour(),
            max_message_tokens: default_max_message_tokens(),
            max_conversation_messages: default_max_conversation_messages(),
            inactivity_timeout_minutes: default_inactivity_timeout_minutes(),
            cleanup_interval_minutes: default_cleanup_interval_minutes(),
        }
    }
}

fn default_rate_limit_per_hour() -> u32 {
    20
}

fn default_max_message_tokens() -> usize {
    1000
}

fn default_max_conversation_messages() -> usize {
    10
}

fn default_inactivity_timeout_minutes() -> u64 {
    10
}

fn default_cleanup_interval_minutes() -> u64 {
    5
}

/// Which conversation store backend the server runs against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    /// Mutex-guarded map in server memory; single process only.
    #[default]
    Memory,
    /// Shared Redis cache; safe across multiple server processes.
    Redis,
}

impl FromStr for StoreBackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackendKind::Memory),
            "redis" => Ok(StoreBackendKind::Redis),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

/// Conversation store selection and connection target.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StoreBackendKind,
    /// Redis connection URL; required when the redis backend is selected.
    #[serde(default)]
    pub redis_url: Option<String>,
}

/// Upstream completion service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// API key; the chat endpoint reports unavailable when unset.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_completion_base_url(),
            model: default_completion_model(),
        }
    }
}

fn default_completion_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Paper catalog file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// JSON file holding paper metadata records.
    #[serde(default = "default_metadata_path")]
    pub metadata_path: PathBuf,
    /// Directory of `{paper_id}.txt` body-text files.
    #[serde(default = "default_text_dir")]
    pub text_dir: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            metadata_path: default_metadata_path(),
            text_dir: default_text_dir(),
        }
    }
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("data/papers.json")
}

fn default_text_dir() -> PathBuf {
    PathBuf::from("data/paper_text")
}

/// Analytics message log configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalyticsConfig {
    /// SQLite database path; analytics are disabled when unset.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

/// Read and parse an optional environment variable.
fn read_var<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| ConfigError::InvalidVar {
                name: name.to_string(),
                message: err.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatConfig, LimitsConfig, StorageConfig, StoreBackendKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_policy_constants() {
        let config = ChatConfig::default();
        assert_eq!(config.limits.rate_limit_per_hour, 20);
        assert_eq!(config.limits.max_message_tokens, 1000);
        assert_eq!(config.limits.max_conversation_messages, 10);
        assert_eq!(config.limits.inactivity_timeout_minutes, 10);
        assert_eq!(config.limits.cleanup_interval_minutes, 5);
        assert_eq!(config.storage.backend, StoreBackendKind::Memory);
    }

    #[test]
    fn backend_kind_parses() {
        assert_eq!("memory".parse(), Ok(StoreBackendKind::Memory));
        assert_eq!("Redis".parse(), Ok(StoreBackendKind::Redis));
        assert!("valkey".parse::<StoreBackendKind>().is_err());
    }

    #[test]
    fn redis_backend_requires_url() {
        let config = ChatConfig::builder()
            .storage(StorageConfig {
                backend: StoreBackendKind::Redis,
                redis_url: None,
            })
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_rate_limit_is_rejected() {
        let config = ChatConfig::builder()
            .limits(LimitsConfig {
                rate_limit_per_hour: 0,
                ..LimitsConfig::default()
            })
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_cleanup_interval_is_rejected() {
        let config = ChatConfig::builder()
            .limits(LimitsConfig {
                cleanup_interval_minutes: 0,
                ..LimitsConfig::default()
            })
            .build();
        assert!(config.validate().is_err());
    }
}
