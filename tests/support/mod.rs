//! Fakes shared by the library-level integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use copyscan::checker::PlagiarismChecker;
use copyscan::corpus::ContentStore;
use copyscan::embedding::Embedder;
use copyscan::error::CheckError;
use copyscan::index::CorpusIndex;
use copyscan::llm::ChatBackend;
use copyscan::progress::NoProgress;
use copyscan::search::SimilaritySearcher;
use copyscan::verdict::VerdictRequester;

pub const DIMS: usize = 8;

/// Byte histogram folded into `DIMS` buckets. Equal texts embed equally.
/// Any text containing `FAIL` makes the whole call fail.
#[derive(Default)]
pub struct HistogramEmbedder {
    pub calls: AtomicUsize,
}

impl HistogramEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; DIMS];
        for b in text.bytes() {
            v[b as usize % DIMS] += 1.0;
        }
        v
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for HistogramEmbedder {
    fn model_name(&self) -> &str {
        "histogram"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CheckError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if texts.iter().any(|t| t.contains("FAIL")) {
            return Err(CheckError::unavailable("embedding backend", "refused"));
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Replies with a fixed answer (or error status) and records prompts.
pub struct ScriptedChat {
    pub answer: Result<String, u16>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedChat {
    pub fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(answer.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(status),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    fn model_name(&self) -> &str {
        "scripted"
    }
    async fn complete(&self, prompt: &str) -> Result<String, CheckError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.answer {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(CheckError::Upstream {
                service: "LLM API".to_string(),
                status: *status,
                body: "boom".to_string(),
            }),
        }
    }
}

/// Write `files` into `processed_dir`, build the index into `index_dir`,
/// and load it back.
pub async fn build_index(
    processed_dir: &Path,
    index_dir: &Path,
    files: &[(&str, &str)],
    embedder: &HistogramEmbedder,
) -> CorpusIndex {
    std::fs::create_dir_all(processed_dir).unwrap();
    for (name, content) in files {
        std::fs::write(processed_dir.join(name), content).unwrap();
    }
    copyscan::indexer::build_corpus_index(processed_dir, index_dir, embedder, 2, &NoProgress)
        .await
        .unwrap();
    CorpusIndex::load(index_dir).unwrap().0
}

pub fn checker(
    index: CorpusIndex,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatBackend>,
    processed_dir: &Path,
) -> PlagiarismChecker {
    PlagiarismChecker::new(
        SimilaritySearcher::new(Arc::new(index), embedder, 3),
        VerdictRequester::new(chat),
        ContentStore::for_corpus(processed_dir, &[]),
    )
}
