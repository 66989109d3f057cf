//! Configuration parsing and validation.
//!
//! Code Harness is configured with a TOML file (default:
//! `config/chx.toml`). Every section except `[db]` may be omitted; missing
//! keys fall back to the defaults below.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/corpus.sqlite"
//!
//! [retrieval]
//! rrf_k = 60
//! max_hits = 5
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [generation]
//! provider = "openai"
//! model = "gpt-4o"
//!
//! [citations]
//! url_template = "https://codes.example.org/viewer?page={page}"
//! ```
//!
//! # Validation
//!
//! [`load_config`] rejects a zero `rrf_k`, `max_hits`, `context_top_n` or
//! `dims`, unknown provider names, and a citation template without a
//! `{page}` placeholder.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use code_harness_core::search::SearchParams;
use code_harness_core::workflow::WorkflowSettings;

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub citations: CitationsConfig,
}

/// Location of the corpus database. Opened read-only.
#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Retrieval and fusion tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// RRF smoothing constant.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
    /// Default number of hits for `search` and `query`.
    #[serde(default = "default_max_hits")]
    pub max_hits: usize,
    #[serde(default = "default_candidate_k_vector")]
    pub candidate_k_vector: usize,
    #[serde(default = "default_candidate_k_keyword")]
    pub candidate_k_keyword: usize,
    /// Hits expanded with context and references.
    #[serde(default = "default_context_top_n")]
    pub context_top_n: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            max_hits: default_max_hits(),
            candidate_k_vector: default_candidate_k_vector(),
            candidate_k_keyword: default_candidate_k_keyword(),
            context_top_n: default_context_top_n(),
        }
    }
}

fn default_rrf_k() -> u32 {
    60
}
fn default_max_hits() -> usize {
    5
}
fn default_candidate_k_vector() -> usize {
    20
}
fn default_candidate_k_keyword() -> usize {
    40
}
fn default_context_top_n() -> usize {
    5
}

/// Embedding provider settings.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"disabled"`, `"openai"` or `"ollama"`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Vector dimensionality; also used by the deterministic fallback.
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Use the deterministic hash embedding when no provider is usable.
    #[serde(default = "default_true")]
    pub allow_fallback: bool,
    /// Base URL for the Ollama API.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_embedding_model(),
            dims: default_dims(),
            allow_fallback: true,
            url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_max_retries() -> u32 {
    3
}

/// Answer generation settings.
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `"disabled"` or `"openai"`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_generation_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_generation_model() -> String {
    "gpt-4o".to_string()
}
fn default_temperature() -> f32 {
    0.1
}

/// Citation link settings.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CitationsConfig {
    /// URL with a `{page}` placeholder. Citations carry no URL when unset.
    #[serde(default)]
    pub url_template: Option<String>,
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Search tuning for the core retrieval functions.
    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            rrf_k: self.retrieval.rrf_k,
            candidate_k_vector: self.retrieval.candidate_k_vector,
            candidate_k_keyword: self.retrieval.candidate_k_keyword,
        }
    }

    /// Settings for the query workflow.
    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            search: self.search_params(),
            context_top_n: self.retrieval.context_top_n,
            generation_timeout: Duration::from_secs(self.generation.timeout_secs),
            citation_url_template: self.citations.url_template.clone(),
        }
    }
}

/// Read, parse and validate the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate retrieval
    if config.retrieval.rrf_k == 0 {
        anyhow::bail!("retrieval.rrf_k must be > 0");
    }
    if config.retrieval.max_hits < 1 {
        anyhow::bail!("retrieval.max_hits must be >= 1");
    }
    if config.retrieval.context_top_n < 1 {
        anyhow::bail!("retrieval.context_top_n must be >= 1");
    }

    // Validate embedding
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if let Some(template) = &config.citations.url_template {
        if !template.contains("{page}") {
            anyhow::bail!("citations.url_template must contain a {{page}} placeholder");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[db]\npath = \"corpus.sqlite\"\n").unwrap();
        assert_eq!(config.retrieval.rrf_k, 60);
        assert_eq!(config.retrieval.max_hits, 5);
        assert_eq!(config.retrieval.candidate_k_vector, 20);
        assert_eq!(config.retrieval.candidate_k_keyword, 40);
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.embedding.dims, 1536);
        assert!(config.embedding.allow_fallback);
        assert_eq!(config.generation.model, "gpt-4o");
        assert!(config.citations.url_template.is_none());
    }

    #[test]
    fn test_workflow_settings_follow_config() {
        let config = parse_config(
            r#"
            [db]
            path = "corpus.sqlite"

            [retrieval]
            rrf_k = 10
            context_top_n = 3

            [generation]
            timeout_secs = 5

            [citations]
            url_template = "https://example.org/p/{page}"
            "#,
        )
        .unwrap();
        let settings = config.workflow_settings();
        assert_eq!(settings.search.rrf_k, 10);
        assert_eq!(settings.context_top_n, 3);
        assert_eq!(settings.generation_timeout, Duration::from_secs(5));
        assert_eq!(
            settings.citation_url_template.as_deref(),
            Some("https://example.org/p/{page}")
        );
    }

    #[test]
    fn test_rejects_invalid_values() {
        let cases = [
            "[db]\npath = \"x\"\n[retrieval]\nrrf_k = 0\n",
            "[db]\npath = \"x\"\n[retrieval]\nmax_hits = 0\n",
            "[db]\npath = \"x\"\n[embedding]\ndims = 0\n",
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"local\"\n",
            "[db]\npath = \"x\"\n[generation]\nprovider = \"anthropic\"\n",
            "[db]\npath = \"x\"\n[citations]\nurl_template = \"https://example.org\"\n",
        ];
        for case in cases {
            assert!(parse_config(case).is_err(), "accepted: {}", case);
        }
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = parse_config(include_str!("../config/chx.example.toml")).unwrap();
        assert_eq!(config.db.path, PathBuf::from("./data/corpus.sqlite"));
        assert!(!config.embedding.is_enabled());
        assert!(!config.generation.is_enabled());
    }

    #[test]
    fn test_missing_db_section_is_error() {
        assert!(parse_config("[retrieval]\nrrf_k = 60\n").is_err());
    }
}
