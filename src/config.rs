//! Configuration module for querydoc.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `QD_` and use double underscores
//! to separate nested levels:
//! - `QD_RETRIEVAL__K_SECTIONS=5` sets `retrieval.k_sections`
//! - `QD_INDEXING__TIMEOUT_SECS=300` sets `indexing.timeout_secs`
//! - `QD_LLM__MODEL=gpt-4o` sets `llm.model`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::answer::{DEFAULT_SYSTEM_PROMPT, LlmConfig};
use crate::documents::ChunkingConfig;
use crate::indexing::{AggregationPolicy, EmbeddingFailurePolicy};
use crate::retrieve::RetrievalConfig;

const CONFIG_DIR: &str = ".querydoc";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "QD_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Root of the per-document index cache
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub prompt: PromptConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SemanticSearchConfig {
    /// Model to use for embeddings
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding model instances kept for parallel batches
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// How chunk vectors combine into a section vector
    #[serde(default)]
    pub aggregation: AggregationPolicy,

    /// Model download cache (defaults to the user cache directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IndexingConfig {
    /// Deadline for building one document's index
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Number of parallel threads for embedding
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,

    /// What a single failed chunk embedding does to the build
    #[serde(default)]
    pub embedding_failure: EmbeddingFailurePolicy,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PromptConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address the `serve` command listens on
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// Log levels: a default plus per-target overrides.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Target name to level, e.g. `pipeline = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

// Default value functions
fn default_version() -> u32 { 1 }
fn default_index_path() -> PathBuf { PathBuf::from(".querydoc/index") }
fn default_embedding_model() -> String { "AllMiniLML6V2".to_string() }
fn default_pool_size() -> usize { 1 }
fn default_timeout_secs() -> u64 { 120 }
fn default_parallel_threads() -> usize { num_cpus::get() }
fn default_system_prompt() -> String { DEFAULT_SYSTEM_PROMPT.to_string() }
fn default_bind() -> String { "127.0.0.1:8000".to_string() }
fn default_log_level() -> String { "warn".to_string() }

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            chunking: ChunkingConfig::default(),
            semantic_search: SemanticSearchConfig::default(),
            indexing: IndexingConfig::default(),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
            prompt: PromptConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            pool_size: default_pool_size(),
            aggregation: AggregationPolicy::default(),
            cache_dir: None,
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            parallel_threads: default_parallel_threads(),
            embedding_failure: EmbeddingFailurePolicy::default(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honouring `QD_` variables
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nesting levels; single underscores stay.
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find `.querydoc/settings.toml` in the current directory or an ancestor
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Check that every section holds usable values
    pub fn validate(&self) -> Result<(), String> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        if self.semantic_search.pool_size == 0 {
            return Err("semantic_search.pool_size must be at least 1".to_string());
        }
        if self.indexing.timeout_secs == 0 {
            return Err("indexing.timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        Self::init_config_file_in(Path::new("."), force)
    }

    pub fn init_config_file_in(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::TocPolicy;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.index_path, PathBuf::from(".querydoc/index"));
        assert_eq!(settings.chunking.max_chunk_chars, 500);
        assert_eq!(settings.indexing.timeout_secs, 120);
        assert_eq!(settings.retrieval.k_sections, 3);
        assert_eq!(settings.retrieval.k_chunks, 5);
        assert!(settings.retrieval.use_coarse_stage);
        assert_eq!(settings.server.bind, "127.0.0.1:8000");
        assert_eq!(settings.logging.default, "warn");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
index_path = "/tmp/qd"

[chunking]
max_chunk_chars = 800
toc_policy = "strict"

[semantic_search]
aggregation = "length_weighted"

[indexing]
embedding_failure = "abort"

[retrieval]
k_sections = 2
use_coarse_stage = false

[server]
bind = "0.0.0.0:9000"

[logging.modules]
pipeline = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.index_path, PathBuf::from("/tmp/qd"));
        assert_eq!(settings.chunking.max_chunk_chars, 800);
        assert_eq!(settings.chunking.toc_policy, TocPolicy::Strict);
        assert_eq!(settings.semantic_search.aggregation, AggregationPolicy::LengthWeighted);
        assert_eq!(settings.indexing.embedding_failure, EmbeddingFailurePolicy::Abort);
        assert_eq!(settings.retrieval.k_sections, 2);
        assert!(!settings.retrieval.use_coarse_stage);
        // Unspecified values keep their defaults
        assert_eq!(settings.retrieval.k_chunks, 5);
        assert_eq!(settings.server.bind, "0.0.0.0:9000");
        assert_eq!(settings.logging.modules["pipeline"], "debug");
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.retrieval.k_chunks = 9;
        settings.llm.model = "local-model".into();

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.retrieval.k_chunks, 9);
        assert_eq!(loaded.llm.model, "local-model");
        assert_eq!(loaded.prompt.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_init_config_file_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = Settings::init_config_file_in(temp_dir.path(), false).unwrap();
        assert!(path.exists());
        assert!(Settings::init_config_file_in(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file_in(temp_dir.path(), true).is_ok());
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[llm]\nmax_tokens = 64\n").unwrap();

        unsafe {
            std::env::set_var("QD_LLM__MAX_TOKENS", "1234");
        }
        let settings = Settings::load_from(&config_path).unwrap();
        unsafe {
            std::env::remove_var("QD_LLM__MAX_TOKENS");
        }

        assert_eq!(settings.llm.max_tokens, 1234);
    }

    #[test]
    fn test_validate_rejects_zero_bounds() {
        let mut settings = Settings::default();
        settings.retrieval.k_sections = 0;
        assert!(settings.validate().is_err());
    }
}
