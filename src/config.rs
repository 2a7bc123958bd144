use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct NoesisConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub completion: CompletionConfig,
    pub evolution: EvolutionConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Where the vector index snapshot lives. Empty disables snapshots.
    pub index_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `local`, `hashing`, or `none`.
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    /// Output width of the `hashing` provider.
    pub dimensions: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CompletionConfig {
    /// `openai`, `mock`, or `none`.
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Notes processed between full index consolidations.
    pub threshold: usize,
    /// Neighbours requested from the index per processed note.
    pub related_k: usize,
    /// Run content analysis and connection scoring when a note is created.
    pub enrich_on_create: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    pub semantic_score_scale: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 8765,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = default_noesis_dir();
        Self {
            db_path: dir.join("notes.db").to_string_lossy().into_owned(),
            index_path: dir.join("index.snapshot").to_string_lossy().into_owned(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_noesis_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
            dimensions: 512,
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout_secs: 60,
        }
    }
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            related_k: 5,
            enrich_on_create: true,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 5,
            semantic_score_scale: 5.0,
        }
    }
}

/// Returns `~/.noesis/`
pub fn default_noesis_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".noesis")
}

/// Returns the default config file path: `~/.noesis/config.toml`
pub fn default_config_path() -> PathBuf {
    default_noesis_dir().join("config.toml")
}

impl NoesisConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            NoesisConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NOESIS_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("NOESIS_INDEX") {
            self.storage.index_path = val;
        }
        if let Ok(val) = std::env::var("NOESIS_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("DEFAULT_MODEL") {
            self.completion.model = val;
        }
        // The prefixed name wins when both are set.
        for key in ["EVOLUTION_THRESHOLD", "NOESIS_EVOLUTION_THRESHOLD"] {
            if let Ok(val) = std::env::var(key) {
                match val.trim().parse::<usize>() {
                    Ok(threshold) => self.evolution.threshold = threshold,
                    Err(_) => warn!(key, value = %val, "ignoring non-integer evolution threshold"),
                }
            }
        }
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// `None` when snapshots are disabled.
    pub fn resolved_index_path(&self) -> Option<PathBuf> {
        if self.storage.index_path.trim().is_empty() {
            None
        } else {
            Some(expand_tilde(&self.storage.index_path))
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
