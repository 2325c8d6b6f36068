//! End-to-end plagiarism check: search, fetch reference content, ask the LLM.

use std::sync::Arc;

use crate::config::Config;
use crate::corpus::ContentStore;
use crate::embedding::create_provider;
use crate::error::CheckError;
use crate::index::CorpusIndex;
use crate::llm::ChatCompletionsClient;
use crate::models::{CandidateFile, CheckReport};
use crate::search::SimilaritySearcher;
use crate::verdict::VerdictRequester;

#[derive(Clone)]
pub struct PlagiarismChecker {
    searcher: SimilaritySearcher,
    verdicts: VerdictRequester,
    contents: ContentStore,
}

impl PlagiarismChecker {
    pub fn new(
        searcher: SimilaritySearcher,
        verdicts: VerdictRequester,
        contents: ContentStore,
    ) -> Self {
        Self {
            searcher,
            verdicts,
            contents,
        }
    }

    /// Load the saved index, the embedding model and the LLM client.
    ///
    /// Fails if any index artifact is missing or inconsistent, or if the
    /// index dimension differs from the provider's.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let (index, manifest) = CorpusIndex::load(&config.index.dir)?;
        let embedder = create_provider(&config.embedding)?;

        if !index.is_empty() && manifest.dims != embedder.dims() {
            anyhow::bail!(
                "Index was built with {} dimensions but the embedding provider produces {}",
                manifest.dims,
                embedder.dims()
            );
        }
        if manifest.model != embedder.model_name() {
            tracing::warn!(
                index_model = %manifest.model,
                provider_model = %embedder.model_name(),
                "index was built with a different embedding model"
            );
        }

        let searcher = SimilaritySearcher::new(Arc::new(index), embedder, config.search.top_k);
        let verdicts = VerdictRequester::new(Arc::new(ChatCompletionsClient::new(&config.llm)?));
        let contents =
            ContentStore::for_corpus(&config.corpus.processed_dir, &config.corpus.fallback_roots);

        Ok(Self::new(searcher, verdicts, contents))
    }

    pub fn searcher(&self) -> &SimilaritySearcher {
        &self.searcher
    }

    pub fn verdicts(&self) -> &VerdictRequester {
        &self.verdicts
    }

    /// Check one submission. Never fails: any error becomes a
    /// `plagiarism: false` report whose response starts with `Error: `.
    pub async fn check_text(&self, raw_code: &str) -> CheckReport {
        match self.try_check(raw_code).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "plagiarism check failed");
                CheckReport::failed(e)
            }
        }
    }

    async fn try_check(&self, raw_code: &str) -> Result<CheckReport, CheckError> {
        let outcome = self.searcher.search(raw_code).await?;
        if outcome.similar_files.is_empty() {
            return Ok(CheckReport::no_matches());
        }

        let candidates: Vec<CandidateFile> = outcome
            .similar_files
            .iter()
            .map(|hit| CandidateFile {
                file_path: hit.file_path.clone(),
                similarity_score: hit.similarity_score,
                content: self.contents.read(&hit.file_path),
            })
            .collect();

        let verdict = self
            .verdicts
            .check(&outcome.processed_code, &candidates)
            .await?;

        Ok(CheckReport {
            plagiarism: verdict.is_plagiarized,
            llm_response: verdict.llm_response,
            similar_files: outcome.similar_files,
        })
    }
}
