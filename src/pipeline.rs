//! Survey pipeline
//!
//! Topic requests run query → retrieval → survey; upload requests run
//! extraction → survey. Stages are strictly sequential and the first error
//! aborts the rest.

use crate::ai_client::{self, LanguageModel};
use crate::error::SurveyError;
use crate::papers::arxiv::SortOrder;
use crate::papers::{self, pdf_extractor, Corpus, HttpGet, PaperRetriever, PaperSummary, RetrievalStats};
use crate::query::{synthesize_query, validate_topic, SearchQuery};
use crate::settings::Settings;
use crate::survey::{synthesize_survey, SurveyResult};
use serde::Serialize;

/// A PDF supplied by the user
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub name: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum SurveyRequest {
    Topic { title: String, description: String },
    Uploads(Vec<UploadedDocument>),
}

impl SurveyRequest {
    /// Input checks that need no model or network; run before building clients
    pub fn validate(&self) -> Result<(), SurveyError> {
        match self {
            SurveyRequest::Topic { title, description } => validate_topic(title, description),
            SurveyRequest::Uploads(documents) if documents.is_empty() => Err(SurveyError::InputRejected(
                "Please upload at least one PDF".to_string(),
            )),
            SurveyRequest::Uploads(_) => Ok(()),
        }
    }
}

/// Per-request knobs
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_results: usize,
    pub sort_order: SortOrder,
    /// Extra survey instructions appended to the fixed template
    pub instructions: Option<String>,
}

impl RunOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_results: settings.max_results,
            sort_order: settings.sort_order,
            instructions: None,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    GeneratingQuery,
    FetchingPapers,
    ExtractingUploads,
    GeneratingSurvey,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::GeneratingQuery => "Generating query...",
            Stage::FetchingPapers => "Fetching and processing papers...",
            Stage::ExtractingUploads => "Extracting text from uploaded PDFs...",
            Stage::GeneratingSurvey => "Generating literature survey...",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    /// None for upload requests
    pub query: Option<SearchQuery>,
    pub papers: Vec<PaperSummary>,
    pub stats: Option<RetrievalStats>,
    pub survey: SurveyResult,
}

pub struct Pipeline<M: LanguageModel, H: HttpGet> {
    model: M,
    retriever: PaperRetriever<H>,
}

impl Pipeline<Box<dyn LanguageModel>, reqwest::blocking::Client> {
    /// Wire up the configured model backend and the arXiv client
    pub fn from_settings(settings: &Settings) -> Result<Self, SurveyError> {
        let model = ai_client::build_model(settings)?;
        let http = papers::http_client(settings.request_timeout_secs)?;
        let retriever = PaperRetriever::new(http, settings.arxiv_search_url.clone())
            .with_pdf_dir(settings.pdf_dir.clone());
        Ok(Self::new(model, retriever))
    }
}

impl<M: LanguageModel, H: HttpGet> Pipeline<M, H> {
    pub fn new(model: M, retriever: PaperRetriever<H>) -> Self {
        Self { model, retriever }
    }

    pub fn run(
        &self,
        request: SurveyRequest,
        options: &RunOptions,
        mut on_stage: impl FnMut(Stage),
    ) -> Result<PipelineOutput, SurveyError> {
        let (query, papers, stats, corpus) = match request {
            SurveyRequest::Topic { title, description } => {
                on_stage(Stage::GeneratingQuery);
                let query = synthesize_query(&self.model, &title, &description)?;

                on_stage(Stage::FetchingPapers);
                let retrieval = self.retriever.retrieve(&query, options.max_results, options.sort_order)?;
                (Some(query), retrieval.papers, Some(retrieval.stats), retrieval.corpus)
            }
            SurveyRequest::Uploads(documents) => {
                on_stage(Stage::ExtractingUploads);
                (None, Vec::new(), None, corpus_from_uploads(documents)?)
            }
        };

        on_stage(Stage::GeneratingSurvey);
        let survey = synthesize_survey(&self.model, &corpus, options.instructions.as_deref())?;

        Ok(PipelineOutput { query, papers, stats, survey })
    }
}

/// Extract each upload in order; unreadable documents contribute empty text
pub fn corpus_from_uploads(documents: Vec<UploadedDocument>) -> Result<Corpus, SurveyError> {
    if documents.is_empty() {
        return Err(SurveyError::InputRejected("Please upload at least one PDF".to_string()));
    }

    let mut corpus = Corpus::new();
    for (i, doc) in documents.into_iter().enumerate() {
        let text = pdf_extractor::extract_text(&doc.bytes);
        tracing::info!(index = i + 1, name = ?doc.name, words = crate::utils::word_count(&text), "Extracted upload");
        corpus.push_upload(i + 1, doc.name.as_deref(), text);
    }
    Ok(corpus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::papers::arxiv::ARXIV_SEARCH_URL;
    use crate::papers::tests::{feed, StubHttp};
    use crate::query::tests::StubModel;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// One-page PDF whose text is `body`
    fn pdf_with_text(body: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![40.into(), 800.into()]),
                Operation::new("Tj", vec![Object::string_literal(body)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn long_text(topic: &str) -> String {
        format!("{} ", topic).repeat(120)
    }

    #[test]
    fn test_topic_request_end_to_end() {
        let model = StubModel::answering(&[
            "VALID: transformer self-attention architecture",
            "The Transformer replaces recurrence with attention (Vaswani et al., 2017).\n\nReferences\nVaswani, A. et al. (2017). Attention Is All You Need.",
        ]);
        let http = StubHttp::default()
            .search(&feed(&[
                ("http://arxiv.org/abs/1706.03762v1", "Attention Is All You Need"),
                ("http://arxiv.org/abs/1706.03762v7", "Attention Is All You Need"),
            ]))
            .respond("http://arxiv.org/pdf/1706.03762v1.pdf", pdf_with_text(&long_text("attention")));
        let pipeline = Pipeline::new(&model, PaperRetriever::new(http, ARXIV_SEARCH_URL));

        let mut stages = Vec::new();
        let output = pipeline
            .run(
                SurveyRequest::Topic {
                    title: "Attention Is All You Need".into(),
                    description: "Transformer architecture".into(),
                },
                &RunOptions::default(),
                |s| stages.push(s),
            )
            .unwrap();

        assert_eq!(output.query.as_ref().map(|q| q.as_str()), Some("transformer self-attention architecture"));
        assert_eq!(output.papers.len(), 1);
        assert!(output.papers[0].words >= 100);
        assert!(!output.survey.is_advisory());
        assert!(output.survey.text().contains("References"));
        assert_eq!(
            stages,
            vec![Stage::GeneratingQuery, Stage::FetchingPapers, Stage::GeneratingSurvey]
        );

        // the survey prompt carries the extracted paper text under its heading
        let prompts = model.prompts.borrow();
        assert!(prompts[1].contains("Title: Attention Is All You Need\nLink: http://arxiv.org/abs/1706.03762v1"));
        assert!(prompts[1].contains("attention attention"));
    }

    #[test]
    fn test_rejected_input_stops_before_retrieval() {
        let model = StubModel::answering(&[]);
        let http = StubHttp::default();
        let pipeline = Pipeline::new(&model, PaperRetriever::new(http, ARXIV_SEARCH_URL));

        let mut stages = Vec::new();
        let err = pipeline
            .run(
                SurveyRequest::Topic { title: " ".into(), description: "".into() },
                &RunOptions::default(),
                |s| stages.push(s),
            )
            .unwrap_err();

        assert!(matches!(err, SurveyError::InputRejected(_)));
        assert_eq!(stages, vec![Stage::GeneratingQuery]);
        assert_eq!(model.calls(), 0);
        assert!(pipeline.retriever_requests().is_empty());
    }

    #[test]
    fn test_no_results_skips_survey() {
        let model = StubModel::answering(&["VALID: obscure topic"]);
        let http = StubHttp::default().search(&feed(&[]));
        let pipeline = Pipeline::new(&model, PaperRetriever::new(http, ARXIV_SEARCH_URL));

        let err = pipeline
            .run(
                SurveyRequest::Topic { title: "Obscure".into(), description: "topic".into() },
                &RunOptions::default(),
                |_| {},
            )
            .unwrap_err();

        assert!(matches!(err, SurveyError::NoResults));
        assert_eq!(model.calls(), 1);
    }

    #[test]
    fn test_upload_request_skips_query_and_search() {
        let model = StubModel::answering(&["Survey of uploads.\n\nReferences\n..."]);
        let pipeline = Pipeline::new(&model, PaperRetriever::new(StubHttp::default(), ARXIV_SEARCH_URL));

        let mut stages = Vec::new();
        let output = pipeline
            .run(
                SurveyRequest::Uploads(vec![
                    UploadedDocument { name: Some("first.pdf".into()), bytes: pdf_with_text(&long_text("graphs")) },
                    UploadedDocument { name: None, bytes: b"not a pdf".to_vec() },
                ]),
                &RunOptions::default(),
                |s| stages.push(s),
            )
            .unwrap();

        assert!(output.query.is_none());
        assert_eq!(stages, vec![Stage::ExtractingUploads, Stage::GeneratingSurvey]);
        let prompts = model.prompts.borrow();
        let first = prompts[0].find("Document 1: first.pdf").unwrap();
        let second = prompts[0].find("Document 2").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_validate_needs_no_model() {
        let near_empty = SurveyRequest::Topic { title: " a ".into(), description: "\n".into() };
        assert!(matches!(near_empty.validate(), Err(SurveyError::InputRejected(_))));
        assert!(matches!(SurveyRequest::Uploads(Vec::new()).validate(), Err(SurveyError::InputRejected(_))));

        let topic = SurveyRequest::Topic { title: "Graph neural networks".into(), description: String::new() };
        assert!(topic.validate().is_ok());
    }

    #[test]
    fn test_empty_upload_list_rejected() {
        let err = corpus_from_uploads(Vec::new()).unwrap_err();
        assert!(matches!(err, SurveyError::InputRejected(_)));
    }

    impl<M: LanguageModel> Pipeline<M, StubHttp> {
        fn retriever_requests(&self) -> Vec<String> {
            self.retriever.http_requests()
        }
    }
}
