//! Error taxonomy for the survey pipeline
//!
//! Every stage returns `SurveyError`; the first error aborts the remaining
//! stages and nothing is retried.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurveyError {
    /// Credential or setup missing. The pipeline cannot proceed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The topic was judged unsuitable. The user should supply new input.
    #[error("input rejected: {0}")]
    InputRejected(String),

    /// The language model service failed or answered with something unusable.
    #[error("language model request failed: {0}")]
    Upstream(String),

    /// The arXiv search request failed.
    #[error("error fetching data from arXiv: {0}")]
    Fetch(String),

    /// The search came back empty. Informational, not a fault.
    #[error("no results found")]
    NoResults,

    /// A paper could not be downloaded or saved; retrieval was aborted.
    #[error("failed to download or process: {title} ({reason})")]
    Download { title: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SurveyError {
    /// User-facing category, stable across releases (used by the web UI and `--json`)
    pub fn kind(&self) -> &'static str {
        match self {
            SurveyError::Configuration(_) => "configuration",
            SurveyError::InputRejected(_) => "input_rejected",
            SurveyError::Upstream(_) | SurveyError::Fetch(_) => "upstream",
            SurveyError::NoResults => "no_results",
            SurveyError::Download { .. } => "download",
            SurveyError::Io(_) => "internal",
        }
    }

    /// Whether this is a system fault rather than an outcome the user can act on
    pub fn is_fault(&self) -> bool {
        !matches!(self, SurveyError::InputRejected(_) | SurveyError::NoResults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_groups_upstream_failures() {
        assert_eq!(SurveyError::Upstream("x".into()).kind(), "upstream");
        assert_eq!(SurveyError::Fetch("x".into()).kind(), "upstream");
        assert_eq!(SurveyError::NoResults.kind(), "no_results");
    }

    #[test]
    fn test_no_results_is_not_a_fault() {
        assert!(!SurveyError::NoResults.is_fault());
        assert!(!SurveyError::InputRejected("too vague".into()).is_fault());
        assert!(SurveyError::Configuration("GEMINI_API_KEY not set".into()).is_fault());
    }

    #[test]
    fn test_download_message_names_title() {
        let err = SurveyError::Download {
            title: "Attention Is All You Need".into(),
            reason: "HTTP 503".into(),
        };
        assert!(err.to_string().contains("Attention Is All You Need"));
    }
}
