//! Configuration surface for a translation run.
//!
//! Everything the pipeline needs is passed in at construction through
//! `PipelineConfig`; nothing is read from global state afterwards. Every field
//! has a default so partial JSON documents and sparse environments work.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::generate::{RetryPolicy, StyleOptions};
use crate::ir::types::TargetLanguage;
use crate::validate::RepairPolicy;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid number in {var}: {reason}")]
    InvalidNumber {
        var: &'static str,
        reason: &'static str,
    },

    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("unsupported target language: {0}")]
    UnsupportedLanguage(String),

    #[error("invalid format in {var}: {reason}")]
    InvalidFormat {
        var: &'static str,
        reason: &'static str,
    },

    #[error("{field} is out of range: {detail}")]
    OutOfRange {
        field: &'static str,
        detail: &'static str,
    },

    #[error("model name must not be empty")]
    EmptyModel,

    #[error("provider {0:?} requires an API key")]
    MissingApiKey(Provider),

    #[error("invalid configuration JSON: {0}")]
    Json(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

// =============================================================================
// PROVIDERS
// =============================================================================

/// Generation backends the HTTP client knows how to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "lmstudio")]
    LmStudio,
}

impl Provider {
    pub fn default_endpoint(self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1/chat/completions",
            Provider::Anthropic => "https://api.anthropic.com/v1/messages",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/models/",
            Provider::Ollama => "http://localhost:11434/api/chat",
            Provider::DeepSeek => "https://api.deepseek.com/chat/completions",
            Provider::LmStudio => "http://localhost:1234/v1/chat/completions",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o",
            Provider::Anthropic => "claude-sonnet-4-20250514",
            Provider::Gemini => "gemini-2.5-flash",
            Provider::Ollama => "qwen3:32b",
            Provider::DeepSeek => "deepseek-chat",
            Provider::LmStudio => "local-model",
        }
    }

    /// Local runtimes accept anonymous requests.
    pub fn requires_api_key(self) -> bool {
        !matches!(self, Provider::Ollama | Provider::LmStudio)
    }
}

impl std::str::FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "gemini" => Ok(Provider::Gemini),
            "ollama" => Ok(Provider::Ollama),
            "deepseek" => Ok(Provider::DeepSeek),
            "lmstudio" | "lm_studio" => Ok(Provider::LmStudio),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}

// =============================================================================
// BACKEND
// =============================================================================

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub provider: Provider,
    /// Full request URL. `None` uses the provider's public endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Per-attempt request timeout.
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            provider: Provider::default(),
            endpoint: None,
            model: Provider::default().default_model().to_string(),
            api_key: None,
            timeout_secs: 120,
            temperature: 0.0,
            max_tokens: 8192,
        }
    }
}

impl BackendConfig {
    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_endpoint())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_endpoint("endpoint", self.endpoint())?;
        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        if self.provider.requires_api_key()
            && self.api_key.as_deref().is_none_or(|k| k.trim().is_empty())
        {
            return Err(ConfigError::MissingApiKey(self.provider));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::OutOfRange {
                field: "temperature",
                detail: "expected 0.0..=2.0",
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "timeout_secs",
                detail: "expected at least 1 second",
            });
        }
        Ok(())
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

pub const MAX_TRANSLATION_DEPTH: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub backend: BackendConfig,
    pub retry: RetryPolicy,
    pub target_language: TargetLanguage,
    pub style: StyleOptions,
    pub max_concurrent_jobs: usize,
    pub repair: RepairPolicy,
    /// How many levels of called user graphs to translate with the root.
    pub translation_depth: u32,
    /// Source files sent with every request as reference material.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reference_source_files: Vec<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            backend: BackendConfig::default(),
            retry: RetryPolicy::default(),
            target_language: TargetLanguage::default(),
            style: StyleOptions::default(),
            max_concurrent_jobs: 4,
            repair: RepairPolicy::default(),
            translation_depth: 0,
            reference_source_files: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Json(e.to_string()))
    }

    /// Defaults overridden by `N2C_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env` with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut cfg = PipelineConfig::default();

        if let Some(provider) = var("N2C_PROVIDER") {
            cfg.backend.provider = provider.parse()?;
            cfg.backend.model = cfg.backend.provider.default_model().to_string();
        }
        if let Some(endpoint) = var("N2C_ENDPOINT") {
            cfg.backend.endpoint = Some(endpoint);
        }
        if let Some(model) = var("N2C_MODEL") {
            cfg.backend.model = model;
        }
        if let Some(key) = var("N2C_API_KEY") {
            cfg.backend.api_key = Some(key);
        }
        if let Some(v) = parse_var(&var, "N2C_TIMEOUT_SECS", "expected u64")? {
            cfg.backend.timeout_secs = v;
        }
        if let Some(v) = parse_var(&var, "N2C_TEMPERATURE", "expected f32")? {
            cfg.backend.temperature = v;
        }
        if let Some(v) = parse_var(&var, "N2C_MAX_TOKENS", "expected u32")? {
            cfg.backend.max_tokens = v;
        }
        if let Some(v) = parse_var(&var, "N2C_MAX_ATTEMPTS", "expected u32")? {
            cfg.retry.max_attempts = v;
        }
        if let Some(v) = parse_var(&var, "N2C_MAX_CONCURRENT_JOBS", "expected usize")? {
            cfg.max_concurrent_jobs = v;
        }
        if let Some(v) = parse_var(&var, "N2C_TRANSLATION_DEPTH", "expected u32")? {
            cfg.translation_depth = v;
        }
        if let Some(paths) = var("N2C_REFERENCE_FILES") {
            cfg.reference_source_files = std::env::split_paths(&paths).collect();
        }
        if let Some(language) = var("N2C_TARGET_LANGUAGE") {
            cfg.target_language = language
                .parse()
                .map_err(|_| ConfigError::UnsupportedLanguage(language.clone()))?;
        }

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend.validate()?;
        self.validate_limits()
    }

    /// Retry and concurrency bounds only; used when the backend is supplied
    /// by the caller rather than built from `backend`.
    pub fn validate_limits(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                field: "retry.max_attempts",
                detail: "expected at least 1",
            });
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "retry.multiplier",
                detail: "expected >= 1.0",
            });
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_concurrent_jobs",
                detail: "expected at least 1",
            });
        }
        if self.translation_depth > MAX_TRANSLATION_DEPTH {
            return Err(ConfigError::OutOfRange {
                field: "translation_depth",
                detail: "expected 0..=5",
            });
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    reason: &'static str,
) -> Result<Option<T>, ConfigError> {
    match var(name) {
        Some(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var: name, reason }),
        None => Ok(None),
    }
}

/// Endpoints must be absolute http(s) URLs.
pub fn validate_http_endpoint(var: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidFormat {
            var,
            reason: "must start with http:// or https://",
        })
    }
}
