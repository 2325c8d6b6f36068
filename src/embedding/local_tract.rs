//! Tract-based local embedding pipeline (fallback for musl and Intel Mac).
//!
//! Pure-Rust path: loads the ONNX model with tract-onnx, tokenizes with the
//! tokenizers crate, runs inference in spawn_blocking. No ONNX Runtime or
//! system deps. The model and tokenizer are loaded once per provider.
#![cfg_attr(
    all(feature = "local-embeddings-fastembed", feature = "local-embeddings-tract"),
    allow(dead_code)
)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tract_onnx::prelude::*;

use super::model_files::{self, ONNX_FILE, TOKENIZER_FILE};
use super::{mean_pool, Embedder};
use crate::config::EmbeddingConfig;
use crate::error::CheckError;

type RunFn = Box<dyn Fn(TVec<TValue>) -> TractResult<TVec<TValue>> + Send + Sync>;

/// In-process encoder: tokenize, truncate, run, mean-pool.
pub struct TractProvider {
    model_name: String,
    dims: usize,
    inner: Arc<Loaded>,
}

struct Loaded {
    run: RunFn,
    input_count: usize,
    tokenizer: tokenizers::Tokenizer,
    max_length: usize,
    batch_size: usize,
    dims: usize,
}

impl TractProvider {
    /// Download (if needed) and load the configured model.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, files) = model_files::resolve(config)?;
        let model_dir = model_files::fetch(&model_name, &files, &[ONNX_FILE, TOKENIZER_FILE])?;
        let onnx_path = model_dir.join(ONNX_FILE);
        let tokenizer_path = model_dir.join(TOKENIZER_FILE);

        let mut tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Load tokenizer: {}", e))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: config.max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Configure truncation: {}", e))?;

        let plan = tract_onnx::onnx()
            .model_for_path(&onnx_path)
            .map_err(|e| anyhow::anyhow!("Load ONNX: {}", e))?
            .into_optimized()
            .map_err(|e| anyhow::anyhow!("Optimize: {}", e))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("Build tract runnable: {}", e))?;

        let input_count = plan.model().inputs.len();
        tracing::info!(model = %model_name, dims = files.dims, input_count, "local model loaded");

        Ok(Self {
            model_name,
            dims: files.dims,
            inner: Arc::new(Loaded {
                run: Box::new(move |inputs| plan.run(inputs)),
                input_count,
                tokenizer,
                max_length: config.max_length,
                batch_size: config.batch_size.max(1),
                dims: files.dims,
            }),
        })
    }
}

#[async_trait]
impl Embedder for TractProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CheckError> {
        let inner = self.inner.clone();
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || inner.embed(&texts))
            .await
            .map_err(|e| CheckError::Internal(e.into()))?
            .map_err(|e| CheckError::unavailable("local embedding model", e))
    }
}

impl Loaded {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());
        let wants_type_ids = self.input_count > 2;

        for chunk in texts.chunks(self.batch_size) {
            let encodings = chunk
                .iter()
                .map(|s| {
                    self.tokenizer
                        .encode(s.as_str(), true)
                        .map_err(|e| anyhow::anyhow!("Tokenize: {}", e))
                })
                .collect::<Result<Vec<_>>>()?;

            let max_len = encodings
                .iter()
                .map(|e| e.get_ids().len())
                .max()
                .unwrap_or(1)
                .clamp(1, self.max_length);

            let rows = encodings.len();
            let mut input_ids = vec![0i64; rows * max_len];
            let mut attention_mask = vec![0i64; rows * max_len];
            let mut type_ids = vec![0i64; rows * max_len];

            for (i, enc) in encodings.iter().enumerate() {
                let ids = enc.get_ids();
                let types = enc.get_type_ids();
                for j in 0..ids.len().min(max_len) {
                    input_ids[i * max_len + j] = ids[j] as i64;
                    attention_mask[i * max_len + j] = 1;
                    type_ids[i * max_len + j] = types.get(j).copied().unwrap_or(0) as i64;
                }
            }

            let shape = (rows, max_len);
            let mut inputs: TVec<TValue> = tvec!(
                Tensor::from(ndarray::Array2::from_shape_vec(shape, input_ids)?).into(),
                Tensor::from(ndarray::Array2::from_shape_vec(shape, attention_mask.clone())?)
                    .into()
            );
            if wants_type_ids {
                inputs.push(Tensor::from(ndarray::Array2::from_shape_vec(shape, type_ids)?).into());
            }

            let output = (self.run)(inputs)?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("No output tensor"))?;
            let view = output
                .to_array_view::<f32>()
                .map_err(|e| anyhow::anyhow!("Output to array: {}", e))?;

            // [batch, seq_len, dims] is the last hidden state; [batch, dims] is already pooled.
            match view.shape() {
                [_, dims] if *dims == self.dims => {
                    for i in 0..rows {
                        let row = view.slice(ndarray::s![i, ..]);
                        all_embeddings.push(row.iter().copied().collect());
                    }
                }
                [_, seq_len, dims] if *dims == self.dims => {
                    let seq_len = *seq_len;
                    for i in 0..rows {
                        let hidden: Vec<f32> =
                            view.slice(ndarray::s![i, .., ..]).iter().copied().collect();
                        let mask = &attention_mask[i * max_len..(i + 1) * max_len];
                        all_embeddings.push(mean_pool(&hidden, mask, seq_len.min(max_len), self.dims));
                    }
                }
                other => bail!("Unexpected output shape: {:?}", other),
            }
        }

        Ok(all_embeddings)
    }
}
