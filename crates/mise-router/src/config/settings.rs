use anyhow::Result;
use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ollama: OllamaConfig,
    pub cache: CacheConfig,
    pub models: ModelsConfig,
    /// Per-topic system prompt overrides, keyed by topic name
    #[serde(default)]
    pub prompts: BTreeMap<String, String>,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// Period of the flush + eviction pass
    pub flush_interval_seconds: u64,
    /// Inactivity window before a clean session leaves memory
    pub expiry_seconds: u64,
    pub max_context_tokens: usize,
    pub chars_per_token: usize,
}

impl CacheConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_seconds.max(1))
    }

    pub fn expiry(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiry_seconds as i64)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            flush_interval_seconds: 5 * 60,
            expiry_seconds: 30 * 60,
            max_context_tokens: 2048,
            chars_per_token: 4,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelsConfig {
    pub code_model: String,
    pub large_model: String,
    pub default_model: String,
    /// Queries longer than this (in characters) go to the large model
    pub long_query_threshold: usize,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            code_model: "codellama:7b-instruct".to_string(),
            large_model: "mistral:7b-instruct".to_string(),
            default_model: "llama3.2:3b".to_string(),
            long_query_threshold: 1000,
        }
    }
}

/// Replacement keyword table. Empty means the built-in table.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub rules: Vec<KeywordRule>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KeywordRule {
    pub topic: String,
    pub keywords: Vec<String>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::with_defaults(Config::builder())?
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Built-in defaults only, ignoring files and environment
    pub fn defaults() -> Result<Self> {
        Ok(Self::with_defaults(Config::builder())?
            .build()?
            .try_deserialize()?)
    }

    fn with_defaults(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>> {
        let cache = CacheConfig::default();
        let models = ModelsConfig::default();

        Ok(builder
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3001)?
            .set_default("database.url", "sqlite://ai_contexts.db")?
            .set_default("database.pool_max_size", 5)?
            .set_default("database.pool_timeout_seconds", 5)?
            .set_default("ollama.base_url", "http://localhost:11434")?
            .set_default("ollama.timeout_seconds", 300)?
            .set_default("ollama.temperature", 0.7)?
            .set_default("ollama.top_p", 0.9)?
            .set_default("cache.flush_interval_seconds", cache.flush_interval_seconds)?
            .set_default("cache.expiry_seconds", cache.expiry_seconds)?
            .set_default("cache.max_context_tokens", cache.max_context_tokens as u64)?
            .set_default("cache.chars_per_token", cache.chars_per_token as u64)?
            .set_default("models.code_model", models.code_model)?
            .set_default("models.large_model", models.large_model)?
            .set_default("models.default_model", models.default_model)?
            .set_default("models.long_query_threshold", models.long_query_threshold as u64)?)
    }
}
