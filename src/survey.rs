//! Literature survey synthesis
//!
//! Embeds the corpus in a fixed instructional template and returns the model's
//! text unmodified. Corpora too small to summarize get an advisory instead of a
//! model call.

use crate::ai_client::LanguageModel;
use crate::error::SurveyError;
use crate::papers::Corpus;
use serde::Serialize;

/// Corpora with fewer words than this are not sent to the model
pub const MIN_CORPUS_WORDS: usize = 100;

const SURVEY_TEMPLATE: &str = r#"You are writing the literature survey section of an academic paper.

Write a literature survey based ONLY on the source text provided below. Do not use outside knowledge and do not invent papers, authors, results or citations.

Requirements:
- Write flowing academic prose organised in paragraphs. Do not use bullet points or numbered lists.
- Cite sources in the text using APA style (Author, Year). When an author or year is not available in the text, cite by paper title.
- For each work, discuss the research problem, the methods used and the main results, and relate the works to each other.
- Close with a short paragraph identifying open problems or gaps across the surveyed work.
- End with a section titled "References" listing every cited source in APA format."#;

/// Output of the survey stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum SurveyResult {
    /// Survey text as returned by the model
    Generated(String),
    /// Shown instead of a survey when there was not enough text to work with
    Advisory(String),
}

impl SurveyResult {
    pub fn text(&self) -> &str {
        match self {
            SurveyResult::Generated(text) | SurveyResult::Advisory(text) => text,
        }
    }

    pub fn is_advisory(&self) -> bool {
        matches!(self, SurveyResult::Advisory(_))
    }
}

fn build_prompt(corpus_text: &str, instructions: Option<&str>) -> String {
    let mut prompt = String::from(SURVEY_TEMPLATE);
    if let Some(extra) = instructions.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str("\n\nAdditional instructions from the author (the requirements above still apply):\n");
        prompt.push_str(extra);
    }
    prompt.push_str("\n\n**Text:**\n\n");
    prompt.push_str(corpus_text);
    prompt
}

/// Produce a literature survey from the corpus
pub fn synthesize_survey(
    model: &dyn LanguageModel,
    corpus: &Corpus,
    instructions: Option<&str>,
) -> Result<SurveyResult, SurveyError> {
    let words = corpus.word_count();
    if words < MIN_CORPUS_WORDS {
        tracing::info!(words, minimum = MIN_CORPUS_WORDS, "Corpus too small for a survey");
        return Ok(SurveyResult::Advisory(format!(
            "Only {} words of text could be extracted from the sources, but at least {} are needed \
             to write a meaningful literature survey. Try a broader topic, or upload PDFs that \
             contain selectable text.",
            words, MIN_CORPUS_WORDS
        )));
    }

    tracing::info!(documents = corpus.len(), words, "Starting literature survey generation");
    let survey = model.generate(&build_prompt(&corpus.render(), instructions))?;
    tracing::info!("Literature survey generated successfully");

    Ok(SurveyResult::Generated(survey))
}
