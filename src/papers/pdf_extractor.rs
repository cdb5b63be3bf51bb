//! PDF text extraction
//!
//! Text is pulled page by page with lopdf. A page that yields nothing (or
//! fails) contributes an empty string. When the document cannot be opened at
//! all, or no page yields text, pdf-extract gets a second attempt on the whole
//! file. Failures are logged and degrade to empty text; they never abort.

use lopdf::Document;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

/// Extract the text of each page, in page order
///
/// A panic inside lopdf (malformed font or content streams) is reported as an error.
pub fn extract_pages(pdf_bytes: &[u8]) -> Result<Vec<String>, String> {
    panic::catch_unwind(AssertUnwindSafe(|| extract_pages_unguarded(pdf_bytes)))
        .map_err(|_| "lopdf panicked while reading the PDF".to_string())?
}

fn extract_pages_unguarded(pdf_bytes: &[u8]) -> Result<Vec<String>, String> {
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| format!("Failed to open PDF: {}", e))?;

    if doc.is_encrypted() {
        return Err("PDF is encrypted".to_string());
    }

    let pages = doc
        .get_pages()
        .into_keys()
        .map(|page_num| match doc.extract_text(&[page_num]) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(page = page_num, error = %e, "No extractable text on page");
                String::new()
            }
        })
        .collect();

    Ok(pages)
}

/// Extract full text from PDF bytes, never failing
pub fn extract_text(pdf_bytes: &[u8]) -> String {
    let text = match extract_pages(pdf_bytes) {
        Ok(pages) => pages.join("\n"),
        Err(e) => {
            tracing::warn!(error = %e, "Page extraction failed, trying whole-document fallback");
            String::new()
        }
    };

    if !text.trim().is_empty() {
        return text;
    }

    match extract_whole_document(pdf_bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "Error extracting text from PDF");
            String::new()
        }
    }
}

/// Read a downloaded PDF from disk and extract its text
pub fn extract_text_from_file(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => extract_text(&bytes),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read PDF for extraction");
            String::new()
        }
    }
}

fn extract_whole_document(pdf_bytes: &[u8]) -> Result<String, String> {
    // pdf-extract panics on some malformed fonts
    panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(pdf_bytes)))
        .map_err(|_| "pdf-extract panicked".to_string())?
        .map_err(|e| format!("pdf-extract failed: {}", e))
}
