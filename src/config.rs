//! TOML configuration.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration. Secrets (the LLM and OpenAI keys) are never stored in the
//! file; they are read from the environment variables named here.
//!
//! ```toml
//! [corpus]
//! raw_dir = "./shared/codefiles"
//! processed_dir = "./shared/processed_codefiles"
//!
//! [index]
//! dir = "./shared/embeddings"
//!
//! [embedding]
//! provider = "local"
//! model = "snowflake-arctic-embed-m"
//! dims = 768
//!
//! [llm]
//! api_url = "https://api.deepseek.com/v1/chat/completions"
//! model = "deepseek-coder"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub corpus: CorpusConfig,
    pub extract: ExtractConfig,
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CorpusConfig {
    /// Flattened, unprocessed code files.
    pub raw_dir: PathBuf,
    /// Normalized code files; the content store reads from here.
    pub processed_dir: PathBuf,
    /// Extra roots tried (in order) when resolving a corpus path to content.
    pub fallback_roots: Vec<PathBuf>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("./shared/codefiles"),
            processed_dir: PathBuf::from("./shared/processed_codefiles"),
            fallback_roots: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExtractConfig {
    /// Directory holding one sub-directory per repository.
    pub repos_dir: PathBuf,
    /// Repository directory names to flatten. Empty means every sub-directory.
    pub repos: Vec<String>,
    /// File extensions to keep, compared case-insensitively.
    pub extensions: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            repos_dir: PathBuf::from("./repos"),
            repos: Vec::new(),
            extensions: default_extensions(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    [".py", ".java", ".c", ".cc", ".cpp", ".h", ".js", ".xml", ".html"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding `file_paths.json`, `embeddings.f32` and `index.json`.
    pub dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./shared/embeddings"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `local`, `openai`, `ollama` or `disabled`.
    pub provider: String,
    pub model: Option<String>,
    pub dims: usize,
    pub batch_size: usize,
    /// Token budget per input; longer inputs are truncated.
    pub max_length: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
    /// Base URL for HTTP providers (Ollama, OpenAI-compatible gateways).
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: None,
            dims: 768,
            batch_size: 8,
            max_length: 512,
            max_retries: 3,
            timeout_secs: 120,
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible chat-completions endpoint.
    pub api_url: String,
    pub model: String,
    /// Name of the environment variable holding the bearer key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.deepseek.com/v1/chat/completions".to_string(),
            model: "deepseek-coder".to_string(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            temperature: 0.1,
            max_tokens: 100,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    /// The bearer key, if the configured environment variable is set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Read, parse and validate the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

fn validate(config: &Config) -> Result<()> {
    if config.search.top_k == 0 {
        anyhow::bail!("search.top_k must be >= 1");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.max_length == 0 {
        anyhow::bail!("embedding.max_length must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    if matches!(config.embedding.provider.as_str(), "openai" | "ollama")
        && config.embedding.model.is_none()
    {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }
    if config.llm.max_tokens == 0 {
        anyhow::bail!("llm.max_tokens must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.search.top_k, 3);
        assert_eq!(config.embedding.dims, 768);
        assert_eq!(config.embedding.max_length, 512);
        assert_eq!(config.embedding.batch_size, 8);
        assert_eq!(config.llm.model, "deepseek-coder");
        assert!((config.llm.temperature - 0.1).abs() < 1e-6);
        assert_eq!(config.llm.max_tokens, 100);
        assert!(config.extract.extensions.contains(&".py".to_string()));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = parse_config(
            r#"
[search]
top_k = 5

[embedding]
provider = "disabled"
"#,
        )
        .unwrap();
        assert_eq!(config.search.top_k, 5);
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.embedding.dims, 768);
    }

    #[test]
    fn rejects_zero_top_k() {
        let err = parse_config("[search]\ntop_k = 0\n").unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = parse_config("[embedding]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn http_provider_requires_model() {
        let err = parse_config("[embedding]\nprovider = \"ollama\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn example_config_parses() {
        let config = parse_config(include_str!("../config/copyscan.example.toml")).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.extract.extensions.len(), 9);
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        assert!(parse_config("[llm]\ntemperature = 3.5\n").is_err());
    }
}
