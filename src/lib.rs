//! Literature survey generator
//!
//! Turns a paper title/description (or a set of PDFs) into an academic
//! literature survey: an LLM writes an arXiv query, the matching first-version
//! papers are downloaded and extracted, and the LLM summarizes the text.

pub mod ai_client;
pub mod error;
pub mod http_server;
pub mod papers;
pub mod pipeline;
pub mod query;
pub mod settings;
pub mod survey;
pub mod utils;

pub use error::SurveyError;
pub use pipeline::{Pipeline, PipelineOutput, RunOptions, Stage, SurveyRequest, UploadedDocument};
pub use settings::Settings;
