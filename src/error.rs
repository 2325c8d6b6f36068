//! Request-level error taxonomy.
//!
//! Batch commands and startup code use `anyhow` directly. The request path
//! (search, verdict, check) returns [`CheckError`] so the HTTP layer can map
//! each class of failure onto a status code without inspecting messages.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckError {
    /// The caller sent something unusable (empty code, no candidates).
    #[error("{0}")]
    InvalidInput(String),

    /// The submission contained nothing but comments, imports and blank lines.
    #[error("After processing, the code is empty. Please provide valid code.")]
    EmptyAfterNormalization,

    /// A backend could not be reached or is switched off.
    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },

    /// A backend answered with a non-2xx status.
    #[error("{service} returned {status}: {body}")]
    Upstream {
        service: String,
        status: u16,
        body: String,
    },

    /// A backend answered 2xx with a body we could not decode.
    #[error("Unexpected response format from {service}: {message}")]
    MalformedResponse { service: String, message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CheckError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CheckError::InvalidInput(message.into())
    }

    pub fn unavailable(service: impl Into<String>, message: impl std::fmt::Display) -> Self {
        CheckError::Unavailable {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn malformed(service: impl Into<String>, message: impl std::fmt::Display) -> Self {
        CheckError::MalformedResponse {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// True for errors caused by the request itself rather than a backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CheckError::InvalidInput(_) | CheckError::EmptyAfterNormalization
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_message_carries_status_and_body() {
        let err = CheckError::Upstream {
            service: "LLM".to_string(),
            status: 429,
            body: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "LLM returned 429: rate limited");
        assert!(!err.is_client_error());
    }

    #[test]
    fn input_errors_are_client_errors() {
        assert!(CheckError::invalid("User code cannot be empty").is_client_error());
        assert!(CheckError::EmptyAfterNormalization.is_client_error());
        assert!(!CheckError::unavailable("embedding", "down").is_client_error());
    }
}
