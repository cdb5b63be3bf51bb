//! Query synthesis
//!
//! Asks the language model to judge whether a title/description names a
//! researchable topic and, if so, to propose an arXiv search query.

use crate::ai_client::LanguageModel;
use crate::error::SurveyError;
use crate::utils::collapse_whitespace;
use serde::Serialize;
use std::fmt;

/// Fewer non-whitespace characters than this across title + description is rejected locally
pub const MIN_TOPIC_CHARS: usize = 3;

/// A sanitized arXiv search query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SearchQuery(String);

impl SearchQuery {
    /// Sanitize `raw` into a query
    pub fn new(raw: &str) -> Self {
        Self(sanitize_query(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remove parentheses and quote characters, collapse whitespace runs
pub fn sanitize_query(query: &str) -> String {
    let stripped: String = query
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '"' | '\''))
        .collect();
    collapse_whitespace(&stripped)
}

fn build_prompt(title: &str, description: &str) -> String {
    format!(
        r#"You help researchers find related work on arXiv.

Title: {title}
About the paper: {description}

First decide whether this describes a genuine academic or scientific research topic.
Greetings, gibberish, personal requests and topics with no research literature are not valid.

Answer with exactly one line:
- If valid: VALID: <a concise arXiv search query of 3-8 keywords>
- If not valid: INVALID: <one sentence explaining why>

Do not add anything else."#,
        title = title.trim(),
        description = description.trim(),
    )
}

enum Verdict {
    Valid(String),
    Invalid(String),
}

/// Read the leading VALID/INVALID marker from a model answer
fn parse_verdict(text: &str) -> Option<Verdict> {
    let line = text
        .lines()
        .map(|l| l.trim().trim_start_matches(['*', '#', '`', '-', ' ']))
        .find(|l| !l.is_empty())?;

    let upper = line.to_ascii_uppercase();
    let (is_valid, marker_len) = if upper.starts_with("INVALID") {
        (false, "INVALID".len())
    } else if upper.starts_with("VALID") {
        (true, "VALID".len())
    } else {
        return None;
    };

    let rest = line[marker_len..]
        .trim_start_matches(['*', ':', ' '])
        .trim_end_matches(['*', '`'])
        .trim()
        .to_string();

    Some(if is_valid { Verdict::Valid(rest) } else { Verdict::Invalid(rest) })
}

/// Reject a title/description that carries almost no text
pub fn validate_topic(title: &str, description: &str) -> Result<(), SurveyError> {
    let meaningful = title
        .chars()
        .chain(description.chars())
        .filter(|c| !c.is_whitespace())
        .count();
    if meaningful < MIN_TOPIC_CHARS {
        return Err(SurveyError::InputRejected(
            "Please enter a paper title or a description of the topic".to_string(),
        ));
    }
    Ok(())
}

/// Turn a title/description into a validated search query
///
/// Near-empty input is rejected before any model call.
pub fn synthesize_query(
    model: &dyn LanguageModel,
    title: &str,
    description: &str,
) -> Result<SearchQuery, SurveyError> {
    validate_topic(title, description)?;

    tracing::info!("Starting query generation");
    let answer = model.generate(&build_prompt(title, description))?;

    match parse_verdict(&answer) {
        Some(Verdict::Valid(raw)) => {
            let query = SearchQuery::new(&raw);
            if query.as_str().is_empty() {
                return Err(SurveyError::Upstream(
                    "Model marked the topic valid but proposed no query".to_string(),
                ));
            }
            tracing::info!(query = %query, "Query generated successfully");
            Ok(query)
        }
        Some(Verdict::Invalid(reason)) => {
            let reason = if reason.is_empty() {
                "The topic does not look like a research subject".to_string()
            } else {
                reason
            };
            tracing::info!(reason = %reason, "Topic rejected by model");
            Err(SurveyError::InputRejected(reason))
        }
        None => {
            tracing::error!(answer = %crate::utils::safe_truncate(&answer, 200), "Unrecognized query response");
            Err(SurveyError::Upstream(
                "Model response did not start with VALID or INVALID".to_string(),
            ))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Returns a fixed answer and records every prompt it receives
    pub(crate) struct StubModel {
        pub answers: RefCell<Vec<Result<String, String>>>,
        pub prompts: RefCell<Vec<String>>,
    }

    impl StubModel {
        pub fn answering(answers: &[&str]) -> Self {
            Self {
                answers: RefCell::new(answers.iter().rev().map(|a| Ok(a.to_string())).collect()),
                prompts: RefCell::new(Vec::new()),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                answers: RefCell::new(vec![Err(message.to_string())]),
                prompts: RefCell::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.prompts.borrow().len()
        }
    }

    impl LanguageModel for StubModel {
        fn generate(&self, prompt: &str) -> Result<String, SurveyError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.answers
                .borrow_mut()
                .pop()
                .unwrap_or_else(|| Err("no canned answer left".to_string()))
                .map_err(SurveyError::Upstream)
        }
    }

    #[test]
    fn test_sanitize_query() {
        assert_eq!(sanitize_query("(deep) \"learning\""), "deep learning");
        assert_eq!(sanitize_query("  graph   neural\n networks 'GNN' "), "graph neural networks GNN");
    }

    #[test]
    fn test_sanitize_query_idempotent() {
        for raw in ["(deep) \"learning\"", "a  (b) 'c'  d", "", "already clean"] {
            let once = sanitize_query(raw);
            assert_eq!(sanitize_query(&once), once);
        }
    }

    #[test]
    fn test_near_empty_input_rejected_without_model_call() {
        let model = StubModel::answering(&["VALID: anything"]);
        for (title, description) in [("", ""), ("  ", "\n"), ("a", " b")] {
            let err = synthesize_query(&model, title, description).unwrap_err();
            assert!(matches!(err, SurveyError::InputRejected(_)));
        }
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn test_valid_answer_is_sanitized() {
        let model = StubModel::answering(&["VALID: (transformer) \"self-attention\"   sequence models"]);
        let query = synthesize_query(&model, "Attention Is All You Need", "Transformer architecture").unwrap();
        assert_eq!(query.as_str(), "transformer self-attention sequence models");

        let prompt = &model.prompts.borrow()[0];
        assert!(prompt.contains("Attention Is All You Need"));
        assert!(prompt.contains("Transformer architecture"));
    }

    #[test]
    fn test_marker_tolerates_markdown_and_case() {
        let model = StubModel::answering(&["\n**Valid:** graph neural networks\n"]);
        let query = synthesize_query(&model, "GNNs", "").unwrap();
        assert_eq!(query.as_str(), "graph neural networks");
    }

    #[test]
    fn test_invalid_answer_carries_reason() {
        let model = StubModel::answering(&["INVALID: This is a greeting, not a research topic."]);
        let err = synthesize_query(&model, "hello there", "how are you").unwrap_err();
        match err {
            SurveyError::InputRejected(reason) => assert_eq!(reason, "This is a greeting, not a research topic."),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_marker_is_upstream_error() {
        let model = StubModel::answering(&["transformer attention"]);
        let err = synthesize_query(&model, "Transformers", "").unwrap_err();
        assert!(matches!(err, SurveyError::Upstream(_)));
    }

    #[test]
    fn test_valid_without_query_is_upstream_error() {
        let model = StubModel::answering(&["VALID: ()"]);
        let err = synthesize_query(&model, "Transformers", "").unwrap_err();
        assert!(matches!(err, SurveyError::Upstream(_)));
    }

    #[test]
    fn test_model_failure_propagates() {
        let model = StubModel::failing("Gemini error 503");
        let err = synthesize_query(&model, "Transformers", "attention").unwrap_err();
        assert!(matches!(err, SurveyError::Upstream(ref m) if m.contains("503")));
    }
}
