//! Similarity search: normalize, embed, query the index, score.

use std::sync::Arc;

use crate::embedding::{embed, Embedder};
use crate::error::CheckError;
use crate::index::CorpusIndex;
use crate::models::{SearchOutcome, SimilarityResult};
use crate::normalize::normalize;

/// Convert a squared L2 distance into a similarity in `(0, 1]`.
pub fn distance_to_score(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

/// Shared, read-only search handle. Cheap to clone.
#[derive(Clone)]
pub struct SimilaritySearcher {
    index: Arc<CorpusIndex>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl SimilaritySearcher {
    pub fn new(index: Arc<CorpusIndex>, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            index,
            embedder,
            top_k,
        }
    }

    pub fn index(&self) -> &CorpusIndex {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Find the corpus files closest to `raw_code`.
    ///
    /// Results are sorted by descending score; equal scores keep the index's
    /// order. Returns [`CheckError::EmptyAfterNormalization`] when nothing is
    /// left to embed.
    pub async fn search(&self, raw_code: &str) -> Result<SearchOutcome, CheckError> {
        let processed_code = normalize(raw_code);
        if processed_code.trim().is_empty() {
            return Err(CheckError::EmptyAfterNormalization);
        }

        let vector = embed(self.embedder.as_ref(), &processed_code).await?;
        let neighbours = self.index.query(&vector, self.top_k)?;

        let mut similar_files: Vec<SimilarityResult> = neighbours
            .into_iter()
            .map(|(file_path, distance)| SimilarityResult {
                file_path,
                similarity_score: distance_to_score(distance),
            })
            .collect();
        similar_files.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));

        tracing::debug!(hits = similar_files.len(), "similarity search done");

        Ok(SearchOutcome {
            similar_files,
            processed_code,
        })
    }
}
