//! Accuracy evaluation over labelled sample directories.
//!
//! Every file in the `plagiarized` directory is expected to be flagged and
//! every file in the `original` directory is expected to pass.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::checker::PlagiarismChecker;
use crate::corpus::walk_files;
use crate::models::SimilarityResult;

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRecord {
    pub file: String,
    pub expected: bool,
    pub predicted: bool,
    pub llm_response: String,
    pub similar_files: Vec<SimilarityResult>,
}

impl EvaluationRecord {
    pub fn is_correct(&self) -> bool {
        self.expected == self.predicted
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSummary {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub records: Vec<EvaluationRecord>,
}

impl EvaluationSummary {
    pub fn from_records(records: Vec<EvaluationRecord>) -> Self {
        let total = records.len();
        let correct = records.iter().filter(|r| r.is_correct()).count();
        let false_positives = records
            .iter()
            .filter(|r| !r.expected && r.predicted)
            .count();
        let false_negatives = records
            .iter()
            .filter(|r| r.expected && !r.predicted)
            .count();
        let accuracy = if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        };

        Self {
            total,
            correct,
            accuracy,
            false_positives,
            false_negatives,
            records,
        }
    }
}

/// Run the checker over both directories. Plagiarized files come first.
pub async fn evaluate(
    checker: &PlagiarismChecker,
    original_dir: &Path,
    plagiarized_dir: &Path,
) -> Result<EvaluationSummary> {
    for dir in [original_dir, plagiarized_dir] {
        if !dir.is_dir() {
            bail!("Directory not found: {}", dir.display());
        }
    }

    let mut records = Vec::new();
    for (dir, expected) in [(plagiarized_dir, true), (original_dir, false)] {
        for (path, relative) in walk_files(dir)? {
            let code = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            tracing::info!(file = %relative, expected, "evaluating");

            let report = checker.check_text(&code).await;
            records.push(EvaluationRecord {
                file: relative,
                expected,
                predicted: report.plagiarism,
                llm_response: report.llm_response,
                similar_files: report.similar_files,
            });
        }
    }

    Ok(EvaluationSummary::from_records(records))
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

/// Print the summary and per-file detail to stdout.
pub fn print_summary(summary: &EvaluationSummary) {
    println!("evaluate");
    println!("  total: {}", summary.total);
    println!(
        "  correct: {} ({:.1}%)",
        summary.correct,
        summary.accuracy * 100.0
    );
    println!("  false positives: {}", summary.false_positives);
    println!("  false negatives: {}", summary.false_negatives);

    for record in &summary.records {
        println!();
        println!("{}", record.file);
        println!(
            "  expected: {}, result: {}",
            yes_no(record.expected),
            yes_no(record.predicted)
        );
        println!("  llm response: {}", record.llm_response);
        for hit in &record.similar_files {
            println!("    - {} (score: {:.3})", hit.file_path, hit.similarity_score);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expected: bool, predicted: bool) -> EvaluationRecord {
        EvaluationRecord {
            file: "f.py".to_string(),
            expected,
            predicted,
            llm_response: String::new(),
            similar_files: Vec::new(),
        }
    }

    #[test]
    fn summary_counts() {
        let summary = EvaluationSummary::from_records(vec![
            record(true, true),
            record(true, false),
            record(false, true),
            record(false, false),
        ]);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.correct, 2);
        assert_eq!(summary.false_positives, 1);
        assert_eq!(summary.false_negatives, 1);
        assert!((summary.accuracy - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_summary_has_zero_accuracy() {
        let summary = EvaluationSummary::from_records(Vec::new());
        assert_eq!(summary.accuracy, 0.0);
    }
}
