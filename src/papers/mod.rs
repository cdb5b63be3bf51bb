//! Paper retrieval and corpus assembly
//!
//! One arXiv search, then for each first-version result in feed order:
//! 1. derive the PDF URL from the entry id
//! 2. download it into the work directory (any failure aborts the retrieval)
//! 3. extract text page by page (failures degrade to empty text)
//! 4. append title, link and text to the corpus

pub mod arxiv;
pub mod pdf_extractor;

use crate::error::SurveyError;
use crate::query::SearchQuery;
use crate::utils::word_count;
use arxiv::SortOrder;
use reqwest::blocking::Client;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const USER_AGENT: &str = concat!("litsurvey/", env!("CARGO_PKG_VERSION"));

/// Largest PDF accepted from arXiv (50MB)
const MAX_PDF_BYTES: usize = 50 * 1024 * 1024;

/// Blocking GET returning the response body
///
/// Transport failures and non-success statuses are both errors.
pub trait HttpGet {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, String>;
}

impl HttpGet for Client {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .get(url)
            .send()
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let bytes = response
            .bytes()
            .map_err(|e| format!("failed to read body: {}", e))?;
        Ok(bytes.to_vec())
    }
}

impl<T: HttpGet + ?Sized> HttpGet for Box<T> {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, String> {
        (**self).get_bytes(url)
    }
}

/// Blocking HTTP client used for arXiv requests
pub fn http_client(timeout_secs: u64) -> Result<Client, SurveyError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| SurveyError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// A retained search result with its extracted text
#[derive(Debug, Clone)]
pub struct PaperRecord {
    pub title: String,
    pub abstract_link: String,
    pub pdf_url: String,
    pub text: String,
}

/// What the UI shows about each paper that went into a survey
#[derive(Debug, Clone, Serialize)]
pub struct PaperSummary {
    pub title: String,
    pub link: String,
    pub pdf_url: String,
    pub words: usize,
}

impl From<&PaperRecord> for PaperSummary {
    fn from(record: &PaperRecord) -> Self {
        Self {
            title: record.title.clone(),
            link: record.abstract_link.clone(),
            pdf_url: record.pdf_url.clone(),
            words: word_count(&record.text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    pub heading: String,
    pub text: String,
}

/// Ordered source texts for one survey request
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    entries: Vec<CorpusEntry>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a paper into the corpus; the record itself is not kept
    pub fn push_paper(&mut self, record: PaperRecord) {
        self.entries.push(CorpusEntry {
            heading: format!("Title: {}\nLink: {}", record.title, record.abstract_link),
            text: record.text,
        });
    }

    /// Append an uploaded document (`index` is 1-based upload order)
    pub fn push_upload(&mut self, index: usize, name: Option<&str>, text: String) {
        let heading = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => format!("Document {}: {}", index, name),
            None => format!("Document {}", index),
        };
        self.entries.push(CorpusEntry { heading, text });
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Words of source text, headings excluded
    pub fn word_count(&self) -> usize {
        self.entries.iter().map(|e| word_count(&e.text)).sum()
    }

    /// The text handed to the model
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}\n\n{}\n\n", e.heading, e.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Counters for one retrieval
#[derive(Debug, Default, Clone, Serialize)]
pub struct RetrievalStats {
    pub entries_seen: u32,
    pub skipped_revisions: u32,
    pub downloaded: u32,
    pub empty_texts: u32,
    pub bytes_downloaded: u64,
}

impl RetrievalStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_summary(&self) {
        println!("\narXiv retrieval:");
        println!("  {:20} {:>4}", "results:", self.entries_seen);
        println!("  {:20} {:>4}", "later revisions:", self.skipped_revisions);
        println!("  {:20} {:>4}  ({:.1} MB)", "downloaded:", self.downloaded,
                 self.bytes_downloaded as f64 / 1024.0 / 1024.0);
        if self.empty_texts > 0 {
            println!("  {:20} {:>4}", "no extractable text:", self.empty_texts);
        }
    }
}

/// Outcome of a successful retrieval
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub corpus: Corpus,
    pub papers: Vec<PaperSummary>,
    pub stats: RetrievalStats,
}

/// Where PDFs are written during one retrieval
enum WorkDir {
    Scoped(TempDir),
    Fixed(PathBuf),
}

impl WorkDir {
    fn open(configured: Option<&Path>) -> Result<Self, SurveyError> {
        match configured {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                Ok(WorkDir::Fixed(dir.to_path_buf()))
            }
            None => Ok(WorkDir::Scoped(tempfile::Builder::new().prefix("litsurvey-").tempdir()?)),
        }
    }

    fn path(&self) -> &Path {
        match self {
            WorkDir::Scoped(dir) => dir.path(),
            WorkDir::Fixed(dir) => dir,
        }
    }
}

pub struct PaperRetriever<H: HttpGet> {
    http: H,
    search_url: String,
    pdf_dir: Option<PathBuf>,
}

impl<H: HttpGet> PaperRetriever<H> {
    pub fn new(http: H, search_url: impl Into<String>) -> Self {
        Self {
            http,
            search_url: search_url.into(),
            pdf_dir: None,
        }
    }

    /// Keep downloaded PDFs in `dir` instead of a temporary directory
    pub fn with_pdf_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.pdf_dir = dir;
        self
    }

    /// Search arXiv and build the corpus from first-version results
    pub fn retrieve(
        &self,
        query: &SearchQuery,
        max_results: usize,
        sort: SortOrder,
    ) -> Result<Retrieval, SurveyError> {
        let url = arxiv::build_search_url(&self.search_url, query.as_str(), max_results, sort);
        tracing::info!(query = %query, max_results, sort = %sort, "Starting arXiv search");

        let body = self.http.get_bytes(&url).map_err(|e| {
            tracing::error!(error = %e, "Error fetching data from arXiv");
            SurveyError::Fetch(e)
        })?;
        let body = String::from_utf8_lossy(&body);
        let entries = arxiv::parse_feed(&body).map_err(SurveyError::Fetch)?;

        if entries.is_empty() {
            tracing::info!("No results found on arXiv");
            return Err(SurveyError::NoResults);
        }

        let work_dir = WorkDir::open(self.pdf_dir.as_deref())?;
        let mut stats = RetrievalStats::new();
        let mut corpus = Corpus::new();
        let mut papers = Vec::new();

        for entry in entries {
            stats.entries_seen += 1;
            if !arxiv::is_first_version(&entry.id) {
                tracing::debug!(id = %entry.id, "Skipping later revision");
                stats.skipped_revisions += 1;
                continue;
            }

            let record = self.fetch_paper(&entry, work_dir.path(), &mut stats)?;
            papers.push(PaperSummary::from(&record));
            corpus.push_paper(record);
        }

        tracing::info!(
            papers = corpus.len(),
            skipped = stats.skipped_revisions,
            words = corpus.word_count(),
            "Processing completed"
        );

        if corpus.is_empty() {
            return Err(SurveyError::NoResults);
        }

        Ok(Retrieval { corpus, papers, stats })
    }

    fn fetch_paper(
        &self,
        entry: &arxiv::SearchEntry,
        dir: &Path,
        stats: &mut RetrievalStats,
    ) -> Result<PaperRecord, SurveyError> {
        let pdf_url = arxiv::pdf_url_for(&entry.id);
        let path = dir.join(format!("{}.pdf", arxiv::sanitize_filename(&entry.title)));

        let download_failed = |reason: String| {
            tracing::error!(title = %entry.title, reason = %reason, "Failed to download or process");
            SurveyError::Download {
                title: entry.title.clone(),
                reason,
            }
        };

        let bytes = self.http.get_bytes(&pdf_url).map_err(&download_failed)?;
        if bytes.len() > MAX_PDF_BYTES {
            return Err(download_failed(format!("PDF too large: {} MB", bytes.len() / 1024 / 1024)));
        }
        fs::write(&path, &bytes)
            .map_err(|e| download_failed(format!("failed to save {}: {}", path.display(), e)))?;

        stats.downloaded += 1;
        stats.bytes_downloaded += bytes.len() as u64;
        tracing::info!(path = %path.display(), "PDF downloaded");

        let text = pdf_extractor::extract_text_from_file(&path);
        if text.trim().is_empty() {
            stats.empty_texts += 1;
        }

        Ok(PaperRecord {
            title: entry.title.clone(),
            abstract_link: entry.link.clone(),
            pdf_url,
            text,
        })
    }
}
