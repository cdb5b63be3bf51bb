//! Application settings
//!
//! Stored as JSON in the platform data directory. Environment variables take
//! precedence over stored values. Settings are loaded once at startup and handed
//! to each component; there is no global instance.

use crate::error::SurveyError;
use crate::papers::arxiv::{SortOrder, ARXIV_SEARCH_URL};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which generative model service answers the prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    #[default]
    Gemini,
    Anthropic,
}

impl LlmBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmBackend::Gemini => "gemini",
            LlmBackend::Anthropic => "anthropic",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmBackend::Gemini => "gemini-1.5-flash",
            LlmBackend::Anthropic => "claude-haiku-4-5-20251001",
        }
    }

    /// Environment variable holding this backend's API key
    pub fn key_env_var(&self) -> &'static str {
        match self {
            LlmBackend::Gemini => "GEMINI_API_KEY",
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(LlmBackend::Gemini),
            "anthropic" | "claude" => Ok(LlmBackend::Anthropic),
            other => Err(format!("Unknown LLM backend '{}' (expected gemini or anthropic)", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub llm_backend: LlmBackend,
    /// Model name override (None = backend default)
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default = "default_search_url")]
    pub arxiv_search_url: String,
    /// Where downloaded PDFs are kept (None = scoped temp dir per request)
    #[serde(default)]
    pub pdf_dir: Option<PathBuf>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_bind")]
    pub bind_addr: String,
}

fn default_search_url() -> String {
    ARXIV_SEARCH_URL.to_string()
}

fn default_max_results() -> usize {
    5
}

fn default_timeout() -> u64 {
    60
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_backend: LlmBackend::Gemini,
            model: None,
            gemini_api_key: None,
            anthropic_api_key: None,
            arxiv_search_url: default_search_url(),
            pdf_dir: None,
            max_results: default_max_results(),
            sort_order: SortOrder::Relevance,
            request_timeout_secs: default_timeout(),
            bind_addr: default_bind(),
        }
    }
}

impl Settings {
    /// Default settings file: `<data dir>/litsurvey/settings.json`
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .map(|p| p.join("litsurvey"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("settings.json")
    }

    /// Load settings from disk or create default
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Settings::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable settings file");
                Settings::default()
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read settings file");
                Settings::default()
            }
        }
    }

    /// Load from `path` (or the default location) and apply environment overrides
    pub fn load_with_env(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let mut settings = Self::load(&path);
        settings.apply_overrides(|name| std::env::var(name).ok());
        settings
    }

    /// Save settings to disk
    pub fn save(&self, path: &Path) -> Result<(), SurveyError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| SurveyError::Configuration(format!("Failed to serialize settings: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;

        tracing::info!(path = %path.display(), "Settings saved");
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY") {
            self.gemini_api_key = Some(key);
        }
        if let Some(key) = non_empty("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = Some(key);
        }
        if let Some(backend) = non_empty("LITSURVEY_BACKEND") {
            match backend.parse() {
                Ok(b) => self.llm_backend = b,
                Err(e) => tracing::warn!("{}", e),
            }
        }
        if let Some(model) = non_empty("LITSURVEY_MODEL") {
            self.model = Some(model);
        }
        if let Some(dir) = non_empty("LITSURVEY_PDF_DIR") {
            self.pdf_dir = Some(PathBuf::from(dir));
        }
        if let Some(bind) = non_empty("LITSURVEY_BIND") {
            self.bind_addr = bind;
        }
    }

    /// API key for the active backend
    pub fn api_key(&self) -> Option<&str> {
        let key = match self.llm_backend {
            LlmBackend::Gemini => self.gemini_api_key.as_deref(),
            LlmBackend::Anthropic => self.anthropic_api_key.as_deref(),
        };
        key.filter(|k| !k.is_empty())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    /// API key for the active backend, or a configuration error naming the variable to set
    pub fn require_api_key(&self) -> Result<&str, SurveyError> {
        self.api_key().ok_or_else(|| {
            SurveyError::Configuration(format!("{} not set", self.llm_backend.key_env_var()))
        })
    }

    pub fn set_api_key(&mut self, backend: LlmBackend, key: String) {
        let key = if key.is_empty() { None } else { Some(key) };
        match backend {
            LlmBackend::Gemini => self.gemini_api_key = key,
            LlmBackend::Anthropic => self.anthropic_api_key = key,
        }
    }

    /// Masked API key for display (first 8 / last 4 characters)
    pub fn masked_api_key(&self) -> Option<String> {
        self.api_key().map(|key| {
            let chars: Vec<char> = key.chars().collect();
            if chars.len() > 12 {
                let head: String = chars[..8].iter().collect();
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("{}...{}", head, tail)
            } else {
                "*".repeat(chars.len())
            }
        })
    }

    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or_else(|| self.llm_backend.default_model())
    }
}
