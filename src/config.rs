use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::fusion::{DedupeStrategy, OutputFormat};
use crate::router::RouterWeights;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CtxmemConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub encryption: EncryptionConfig,
    pub router: RouterConfig,
    pub fusion: FusionConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Operate over every project instead of the current one.
    pub global: bool,
    /// Explicit project id; derived from the working directory when unset.
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `auto`, `local`, `openai` or `none`.
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    pub api_base_url: String,
    pub api_model: String,
    /// Vector size of `api_model`; required for models outside the OpenAI lineup.
    pub api_dimensions: Option<usize>,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EncryptionConfig {
    pub enabled: bool,
    /// Environment variable holding the password. Never read from this file.
    pub password_env: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RouterConfig {
    pub recency: f64,
    pub tag_match: f64,
    pub type_priority: f64,
    pub keyword_density: f64,
    pub semantic: f64,
    pub default_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FusionConfig {
    pub max_tokens: usize,
    pub dedupe: DedupeStrategy,
    pub format: OutputFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_ctxmem_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            global: false,
            project_id: None,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_ctxmem_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "auto".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
            api_base_url: crate::embedding::hosted::DEFAULT_BASE_URL.into(),
            api_model: "text-embedding-3-small".into(),
            api_dimensions: None,
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_secs: 30,
            batch_size: crate::memory::embeddings::EMBED_BATCH_SIZE,
        }
    }
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            password_env: "CTXMEM_PASSWORD".into(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        let w = RouterWeights::default();
        Self {
            recency: w.recency,
            tag_match: w.tag_match,
            type_priority: w.type_priority,
            keyword_density: w.keyword_density,
            semantic: w.semantic,
            default_limit: 5,
        }
    }
}

impl RouterConfig {
    pub fn weights(&self) -> RouterWeights {
        RouterWeights {
            recency: self.recency,
            tag_match: self.tag_match,
            type_priority: self.type_priority,
            keyword_density: self.keyword_density,
            semantic: self.semantic,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            max_tokens: crate::fusion::DEFAULT_MAX_TOKENS,
            dedupe: DedupeStrategy::Exact,
            format: OutputFormat::Text,
        }
    }
}

/// Returns `~/.ctxmem/`, or `./.ctxmem/` when no home directory is known.
pub fn default_ctxmem_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ctxmem")
}

/// Returns the default config file path: `~/.ctxmem/config.toml`
pub fn default_config_path() -> PathBuf {
    default_ctxmem_dir().join("config.toml")
}

impl CtxmemConfig {
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
            CtxmemConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (CTXMEM_DB, CTXMEM_PROJECT, CTXMEM_GLOBAL, CTXMEM_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CTXMEM_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("CTXMEM_PROJECT") {
            self.storage.project_id = Some(val);
        }
        if let Ok(val) = std::env::var("CTXMEM_GLOBAL") {
            self.storage.global = matches!(val.as_str(), "1" | "true" | "yes");
        }
        if let Ok(val) = std::env::var("CTXMEM_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// The encryption password, if encryption is enabled.
    pub fn encryption_password(&self) -> Result<Option<String>> {
        if !self.encryption.enabled {
            return Ok(None);
        }
        let password = std::env::var(&self.encryption.password_env).with_context(|| {
            format!(
                "encryption is enabled but ${} is not set",
                self.encryption.password_env
            )
        })?;
        anyhow::ensure!(
            !password.is_empty(),
            "${} must not be empty",
            self.encryption.password_env
        );
        Ok(Some(password))
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
