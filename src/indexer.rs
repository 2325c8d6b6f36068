//! Batch index build over the processed corpus.
//!
//! Files are embedded by their normalized text. A failed embedding batch
//! does not abort the build: every file in it gets a zero vector and the
//! failure is logged. Zero rows stay searchable, they just sit at the origin.
//! A build in which nothing was embedded still writes the index but is
//! flagged by [`BuildStats::all_zero`] and a warning.

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::path::Path;

use crate::corpus::load_code_files;
use crate::embedding::{embed_batch, Embedder};
use crate::index::{CorpusIndex, IndexManifest};
use crate::progress::{BuildProgressEvent, BuildProgressReporter};

#[derive(Debug, Clone)]
pub struct BuildStats {
    pub files: usize,
    pub embedded: usize,
    pub zero_filled: usize,
    pub failed_batches: usize,
    pub manifest: IndexManifest,
}

impl BuildStats {
    /// No file got a real embedding; every row is the zero vector.
    pub fn all_zero(&self) -> bool {
        self.files > 0 && self.embedded == 0
    }
}

/// Embed every file under `processed_dir` and save the index into `index_dir`.
pub async fn build_corpus_index(
    processed_dir: &Path,
    index_dir: &Path,
    embedder: &dyn Embedder,
    batch_size: usize,
    progress: &dyn BuildProgressReporter,
) -> Result<BuildStats> {
    let files = load_code_files(processed_dir)?;
    if files.is_empty() {
        bail!(
            "No code files found in {}. Run `copyscan process` first.",
            processed_dir.display()
        );
    }

    let total = files.len();
    progress.report(BuildProgressEvent::Loaded {
        files: total as u64,
    });

    let dims = embedder.dims();
    let batch_size = batch_size.max(1);
    let mut paths = Vec::with_capacity(total);
    let mut embeddings = Vec::with_capacity(total);
    let mut zero_filled = 0;
    let mut failed_batches = 0;

    for batch in files.chunks(batch_size) {
        let snippets: BTreeMap<String, String> = batch
            .iter()
            .map(|f| (f.path.clone(), f.normalized.clone()))
            .collect();

        let mut vectors = match embed_batch(embedder, &snippets, batch_size).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    first = %batch[0].path,
                    size = batch.len(),
                    error = %e,
                    "embedding batch failed, using zero vectors"
                );
                failed_batches += 1;
                BTreeMap::new()
            }
        };

        for file in batch {
            let vector = vectors.remove(&file.path).unwrap_or_else(|| {
                zero_filled += 1;
                vec![0.0; dims]
            });
            paths.push(file.path.clone());
            embeddings.push(vector);
        }

        progress.report(BuildProgressEvent::Embedding {
            n: paths.len() as u64,
            total: total as u64,
        });
    }

    let index = CorpusIndex::build(paths, embeddings)?;
    let manifest = index.save(index_dir, embedder.model_name())?;
    progress.report(BuildProgressEvent::Saved {
        rows: index.len() as u64,
    });

    tracing::info!(
        rows = index.len(),
        zero_filled,
        dir = %index_dir.display(),
        "index saved"
    );

    let stats = BuildStats {
        files: total,
        embedded: total - zero_filled,
        zero_filled,
        failed_batches,
        manifest,
    };
    if stats.all_zero() {
        tracing::warn!(
            files = total,
            failed_batches,
            "no file was embedded; the index holds only zero vectors"
        );
    }
    Ok(stats)
}
