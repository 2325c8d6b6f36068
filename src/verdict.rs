//! Prompt construction and yes/no verdict parsing.

use std::sync::Arc;

use crate::error::CheckError;
use crate::llm::ChatBackend;
use crate::models::{CandidateFile, PlagiarismVerdict};

/// Build the plagiarism prompt for `user_code` against `candidates`.
///
/// Reference files are numbered from 1 in the order given.
pub fn build_prompt(user_code: &str, candidates: &[CandidateFile]) -> String {
    let mut prompt = String::from(
        "You are a code plagiarism detection system. Decide whether the submitted code \
         was plagiarized from any of the reference files below.\n\n",
    );

    prompt.push_str("Submitted code:\n```\n");
    prompt.push_str(user_code);
    prompt.push_str("\n```\n\n");

    for (i, candidate) in candidates.iter().enumerate() {
        prompt.push_str(&format!(
            "Reference File {} ({}):\n```\n{}\n```\n\n",
            i + 1,
            candidate.file_path,
            candidate.content
        ));
    }

    prompt.push_str(
        "Indicators of plagiarism:\n\
         1. Nearly identical structure or algorithm\n\
         2. The same variable and function names\n\
         3. Similar distinctive comments\n\
         4. Identical sections with only minor changes such as renamed identifiers\n\
         5. The same unusual code patterns\n\n\
         Code counts as plagiarized if it was copied from a reference file, \
         with or without minor modifications.\n\n\
         Reply with ONLY \"Yes\" if the submitted code is plagiarized, \
         or \"No\" if it is not.\n\
         Your response:",
    );

    prompt
}

/// `true` when the answer contains `yes` anywhere, case-insensitively.
///
/// This is a substring test: `"No, but yes-like"` and `"eyes"` both read as
/// plagiarized.
pub fn parse_verdict(response: &str) -> bool {
    response.to_lowercase().contains("yes")
}

/// Asks a [`ChatBackend`] whether a submission copies one of its candidates.
#[derive(Clone)]
pub struct VerdictRequester {
    backend: Arc<dyn ChatBackend>,
}

impl VerdictRequester {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub async fn check(
        &self,
        user_code: &str,
        candidates: &[CandidateFile],
    ) -> Result<PlagiarismVerdict, CheckError> {
        if user_code.trim().is_empty() {
            return Err(CheckError::invalid("User code cannot be empty"));
        }
        if !candidates.iter().any(|c| !c.content.trim().is_empty()) {
            return Err(CheckError::invalid(
                "At least one similar file with content is required",
            ));
        }

        let prompt = build_prompt(user_code, candidates);
        let llm_response = self.backend.complete(&prompt).await?;
        let is_plagiarized = parse_verdict(&llm_response);

        tracing::info!(
            candidates = candidates.len(),
            is_plagiarized,
            "verdict received"
        );

        Ok(PlagiarismVerdict {
            is_plagiarized,
            llm_response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        answer: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatBackend for Canned {
        fn model_name(&self) -> &str {
            "canned"
        }
        async fn complete(&self, prompt: &str) -> Result<String, CheckError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.answer.clone())
        }
    }

    fn canned(answer: &str) -> Arc<Canned> {
        Arc::new(Canned {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn candidate(path: &str, content: &str) -> CandidateFile {
        CandidateFile {
            file_path: path.to_string(),
            similarity_score: 0.9,
            content: content.to_string(),
        }
    }

    #[test]
    fn verdict_is_substring_match() {
        assert!(parse_verdict("Yes"));
        assert!(parse_verdict("YES."));
        assert!(!parse_verdict("No"));
        assert!(!parse_verdict(""));
        // Known false positives of the substring test.
        assert!(parse_verdict("No, definitely not, but yes some similarities"));
        assert!(parse_verdict("The eyes have it"));
    }

    #[test]
    fn prompt_numbers_references_in_order() {
        let prompt = build_prompt(
            "print(1)",
            &[candidate("a.py", "A_BODY"), candidate("b.py", "B_BODY")],
        );
        let first = prompt.find("Reference File 1 (a.py)").unwrap();
        let second = prompt.find("Reference File 2 (b.py)").unwrap();
        assert!(first < second);
        assert!(prompt.contains("A_BODY"));
        assert!(prompt.contains("```\nprint(1)\n```"));
        assert!(prompt.trim_end().ends_with("Your response:"));
    }

    #[tokio::test]
    async fn rejects_empty_user_code() {
        let backend = canned("Yes");
        let requester = VerdictRequester::new(backend.clone());
        let err = requester
            .check("  \n", &[candidate("a.py", "x")])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "User code cannot be empty");
        assert!(backend.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_candidates_without_content() {
        let requester = VerdictRequester::new(canned("Yes"));
        assert!(requester.check("x = 1", &[]).await.is_err());
        let err = requester
            .check("x = 1", &[candidate("a.py", "")])
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn returns_raw_response_and_flag() {
        let requester = VerdictRequester::new(canned("No."));
        let verdict = requester
            .check("x = 1", &[candidate("a.py", "y = 2")])
            .await
            .unwrap();
        assert!(!verdict.is_plagiarized);
        assert_eq!(verdict.llm_response, "No.");
    }
}
