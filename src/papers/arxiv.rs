//! arXiv search API
//!
//! Builds the query URL, parses the Atom feed, and derives PDF locations from
//! entry identifiers. No API key required.

use crate::utils::{collapse_whitespace, safe_truncate};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

pub const ARXIV_SEARCH_URL: &str = "http://export.arxiv.org/api/query";

/// Longest file name stem written for a downloaded PDF
const MAX_FILENAME_BYTES: usize = 120;

/// Result ordering accepted by the `sortBy` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    Relevance,
    LastUpdatedDate,
    SubmittedDate,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Relevance => "relevance",
            SortOrder::LastUpdatedDate => "lastUpdatedDate",
            SortOrder::SubmittedDate => "submittedDate",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "relevance" => Ok(SortOrder::Relevance),
            "lastupdateddate" | "updated" => Ok(SortOrder::LastUpdatedDate),
            "submitteddate" | "submitted" => Ok(SortOrder::SubmittedDate),
            other => Err(format!("Unknown sort order '{}'", other)),
        }
    }
}

/// One `<entry>` of the Atom feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEntry {
    /// Canonical identifier, e.g. `http://arxiv.org/abs/1706.03762v1`
    pub id: String,
    pub title: String,
    /// Abstract page (`rel="alternate"` link, falling back to the id)
    pub link: String,
}

/// Build the search request URL
///
/// Spaces in the query become `+`; other reserved characters are percent-encoded.
pub fn build_search_url(base_url: &str, query: &str, max_results: usize, sort: SortOrder) -> String {
    let search_query = query
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(|t| urlencoding::encode(t).into_owned())
        .collect::<Vec<_>>()
        .join("+");
    format!(
        "{}?search_query={}&max_results={}&sortBy={}",
        base_url.trim_end_matches('?'),
        search_query,
        max_results,
        sort.as_str()
    )
}

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"v(\d+)$").expect("static regex"))
}

/// Whether the identifier is tagged as revision 1 (`...v1`, but not `...v10`)
pub fn is_first_version(id: &str) -> bool {
    version_pattern()
        .captures(id.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str() == "1")
        .unwrap_or(false)
}

/// Map an abstract-page identifier to its PDF location
///
/// `http://arxiv.org/abs/1234.5678v1` → `http://arxiv.org/pdf/1234.5678v1.pdf`
pub fn pdf_url_for(id: &str) -> String {
    format!("{}.pdf", id.trim().replacen("/abs/", "/pdf/", 1))
}

/// Turn a paper title into a filesystem-safe file name stem
pub fn sanitize_filename(title: &str) -> String {
    let joined = title.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| !matches!(c, ':' | '/' | '\\'))
        .collect();
    let stem = safe_truncate(&cleaned, MAX_FILENAME_BYTES).to_string();
    if stem.is_empty() { "paper".to_string() } else { stem }
}

#[derive(Default)]
struct EntryBuilder {
    id: String,
    title: String,
    link: Option<String>,
}

/// Parse an arXiv Atom response into entries, in feed order
pub fn parse_feed(body: &str) -> Result<Vec<SearchEntry>, String> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<EntryBuilder> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                text.clear();
                if name == "entry" {
                    current = Some(EntryBuilder::default());
                } else if name == "link" {
                    if let Some(entry) = current.as_mut() {
                        take_alternate_link(&e, entry);
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if local_name(&e) == "link" {
                    if let Some(entry) = current.as_mut() {
                        take_alternate_link(&e, entry);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let chunk = t.unescape().map_err(|e| format!("Invalid feed text: {}", e))?;
                text.push_str(&chunk);
            }
            Ok(Event::CData(t)) => {
                text.push_str(&String::from_utf8_lossy(&t));
            }
            Ok(Event::End(e)) => {
                let qname = e.name();
                let name = String::from_utf8_lossy(qname.local_name().as_ref()).to_string();
                if let Some(entry) = current.as_mut() {
                    match name.as_str() {
                        "id" => entry.id = text.trim().to_string(),
                        "title" => entry.title = collapse_whitespace(&text),
                        "entry" => {
                            let done = current.take().unwrap_or_default();
                            let link = done.link.unwrap_or_else(|| done.id.clone());
                            entries.push(SearchEntry {
                                id: done.id,
                                title: done.title,
                                link,
                            });
                        }
                        _ => {}
                    }
                }
                text.clear();
            }
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "Malformed feed at byte {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
        }
    }

    Ok(entries)
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

fn take_alternate_link(e: &BytesStart<'_>, entry: &mut EntryBuilder) {
    let mut rel = None;
    let mut href = None;
    for attr in e.attributes().flatten() {
        let value = attr
            .unescape_value()
            .map(|v| v.to_string())
            .unwrap_or_default();
        match attr.key.as_ref() {
            b"rel" => rel = Some(value),
            b"href" => href = Some(value),
            _ => {}
        }
    }
    if rel.as_deref() == Some("alternate") && entry.link.is_none() {
        entry.link = href;
    }
}
