//! Core data models used throughout copyscan.
//!
//! These types represent the code files, search hits, candidates and verdicts
//! that flow through the indexing and checking pipeline. The serde
//! representations double as the HTTP wire format.

use serde::{Deserialize, Serialize};

/// A corpus file: relative path plus raw and normalized content.
#[derive(Debug, Clone)]
pub struct CodeFile {
    /// Relative path with forward slashes; unique within a corpus.
    pub path: String,
    pub content: String,
    /// Output of [`crate::normalize::normalize`]; may be empty.
    pub normalized: String,
}

impl CodeFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let normalized = crate::normalize::normalize(&content);
        Self {
            path: path.into(),
            content,
            normalized,
        }
    }
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub file_path: String,
    /// `1 / (1 + squared_l2_distance)`, in `(0, 1]`.
    pub similarity_score: f32,
}

/// A search hit with the reference file's content attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateFile {
    pub file_path: String,
    #[serde(default)]
    pub similarity_score: f32,
    #[serde(default)]
    pub content: String,
}

/// Result of [`crate::search::SimilaritySearcher::search`].
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub similar_files: Vec<SimilarityResult>,
    pub processed_code: String,
}

/// The LLM's answer and the boolean read from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlagiarismVerdict {
    pub is_plagiarized: bool,
    pub llm_response: String,
}

/// Top-level answer for one submission. Errors are folded into
/// `plagiarism: false` with an `"Error: ..."` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    pub plagiarism: bool,
    pub llm_response: String,
    pub similar_files: Vec<SimilarityResult>,
}

impl CheckReport {
    pub fn no_matches() -> Self {
        Self {
            plagiarism: false,
            llm_response: "No similar files found".to_string(),
            similar_files: Vec::new(),
        }
    }

    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self {
            plagiarism: false,
            llm_response: format!("Error: {}", err),
            similar_files: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_file_derives_normalized_text() {
        let file = CodeFile::new("a.py", "import os\n# c\nprint(1)\n");
        assert_eq!(file.normalized, "print(1)");
        assert_eq!(file.content, "import os\n# c\nprint(1)\n");
    }

    #[test]
    fn failed_report_shape() {
        let report = CheckReport::failed("boom");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "plagiarism": false,
                "llm_response": "Error: boom",
                "similar_files": []
            })
        );
    }

    #[test]
    fn candidate_content_defaults_to_empty() {
        let c: CandidateFile = serde_json::from_str(r#"{"file_path": "x.py"}"#).unwrap();
        assert_eq!(c.content, "");
        assert_eq!(c.similarity_score, 0.0);
    }
}
