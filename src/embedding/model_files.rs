//! Model artifacts for the in-process encoders.
//!
//! Both local backends load the same Hugging Face files: the ONNX graph plus
//! the tokenizer set. Files are fetched once into `~/.cache/copyscan/models`.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

use crate::config::EmbeddingConfig;

pub const DEFAULT_MODEL: &str = "snowflake-arctic-embed-m";

pub const ONNX_FILE: &str = "onnx/model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const CONFIG_FILE: &str = "config.json";
pub const SPECIAL_TOKENS_FILE: &str = "special_tokens_map.json";
pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelFiles {
    pub repo: &'static str,
    pub dims: usize,
}

pub fn model_manifest(model_name: &str) -> Result<ModelFiles> {
    match model_name {
        "snowflake-arctic-embed-m" => Ok(ModelFiles {
            repo: "Snowflake/snowflake-arctic-embed-m",
            dims: 768,
        }),
        "all-minilm-l6-v2" => Ok(ModelFiles {
            repo: "sentence-transformers/all-MiniLM-L6-v2",
            dims: 384,
        }),
        _ => bail!(
            "Local embeddings support snowflake-arctic-embed-m and all-minilm-l6-v2. Requested: '{}'",
            model_name
        ),
    }
}

/// Resolve the configured local model and check its width against `embedding.dims`.
///
/// Runs before any download, so a misconfigured width fails at startup.
pub fn resolve(config: &EmbeddingConfig) -> Result<(String, ModelFiles)> {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let files = model_manifest(&model_name)?;
    if files.dims != config.dims {
        bail!(
            "Model '{}' produces {} dimensions but embedding.dims = {}",
            model_name,
            files.dims,
            config.dims
        );
    }
    Ok((model_name, files))
}

pub fn cache_dir() -> Result<PathBuf> {
    let base = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let dir = PathBuf::from(base)
        .join(".cache")
        .join("copyscan")
        .join("models");
    std::fs::create_dir_all(&dir).map_err(|e| anyhow::anyhow!("Create cache dir: {}", e))?;
    Ok(dir)
}

/// Fetch `repo/path` into `cache_path` unless it is already there.
pub fn download_to_cache(repo: &str, path: &str, cache_path: &Path) -> Result<()> {
    if cache_path.exists() {
        return Ok(());
    }
    let url = format!("https://huggingface.co/{}/resolve/main/{}", repo, path);
    tracing::info!(%url, "downloading model file");

    // The blocking client owns a runtime; keep it off any tokio worker.
    let fetch_url = url.clone();
    let bytes = std::thread::spawn(move || {
        reqwest::blocking::get(&fetch_url)
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes())
    })
    .join()
    .map_err(|_| anyhow::anyhow!("Download thread panicked: {}", url))?
    .map_err(|e| anyhow::anyhow!("Download {}: {}", url, e))?;

    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow::anyhow!("Create cache parent: {}", e))?;
    }
    std::fs::write(cache_path, &bytes).map_err(|e| anyhow::anyhow!("Write cache: {}", e))?;
    Ok(())
}

/// Download `files` of `model_name` and return the local directory.
pub fn fetch(model_name: &str, model: &ModelFiles, files: &[&str]) -> Result<PathBuf> {
    let model_dir = cache_dir()?.join(model_name);
    for file in files {
        download_to_cache(model.repo, file, &model_dir.join(file))?;
    }
    Ok(model_dir)
}
