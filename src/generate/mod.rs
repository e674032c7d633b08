//! Generation client: IR document → raw generated text.
//!
//! The client owns the request lifecycle (per-attempt timeout, cancellation,
//! bounded exponential-backoff retries) and delegates the actual round-trip
//! to a `GenerationBackend`. It keeps no per-request mutable state, so one
//! client is shared by every job in a batch.

pub mod cancel;
pub mod http;
pub mod prompt;
pub mod reference;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::ErrorKind;
use crate::ir::types::{IrDocument, TargetLanguage};
pub use cancel::CancelToken;
pub use http::HttpBackend;
pub use reference::{load_reference_files, ReferenceFile};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend rejected the request (HTTP {status}): {message}")]
    BackendRejected { status: u16, message: String },

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("Generation was cancelled")]
    Cancelled,

    #[error("Request could not be built: {0}")]
    InvalidRequest(String),
}

impl GenerationError {
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::Timeout(_) => "G001",
            GenerationError::Network(_) => "G002",
            GenerationError::BackendRejected { .. } => "G003",
            GenerationError::MalformedResponse(_) => "G004",
            GenerationError::Cancelled => "C001",
            GenerationError::InvalidRequest(_) => "G005",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::Timeout(_) => ErrorKind::Timeout,
            GenerationError::Network(_) => ErrorKind::Network,
            GenerationError::BackendRejected { .. } | GenerationError::InvalidRequest(_) => {
                ErrorKind::BackendRejected
            }
            GenerationError::MalformedResponse(_) => ErrorKind::BackendMalformedResponse,
            GenerationError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }
}

// =============================================================================
// REQUEST / RESPONSE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleOptions {
    pub include_comments: bool,
    /// Ask for the `{"graphs": [...]}` JSON envelope instead of bare code.
    pub json_envelope: bool,
}

impl Default for StyleOptions {
    fn default() -> Self {
        StyleOptions {
            include_comments: true,
            json_envelope: true,
        }
    }
}

/// Per-request overrides of the backend's model settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub target_language: TargetLanguage,
    #[serde(default)]
    pub style: StyleOptions,
    #[serde(default)]
    pub model: ModelParameters,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_files: Vec<ReferenceFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub document: IrDocument,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(document: IrDocument, options: GenerationOptions) -> Self {
        GenerationRequest { document, options }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// One successful backend round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
    pub text: String,
    pub status: u16,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResponse {
    pub raw_text: String,
    pub status: u16,
    /// Wall time across every attempt and backoff sleep.
    pub elapsed: Duration,
    pub attempts: u32,
    pub usage: Option<TokenUsage>,
}

// =============================================================================
// BACKEND SEAM
// =============================================================================

/// A remote code generator. Implementations perform exactly one attempt; the
/// client handles timeouts and retries. Dropping the returned future must
/// abort any in-flight work.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<BackendReply, GenerationError>;
}

// =============================================================================
// RETRY POLICY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 500,
            multiplier: 2.0,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Sleep after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let ms = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        let capped = ms.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn GenerationBackend>, retry: RetryPolicy, timeout: Duration) -> Self {
        GenerationClient {
            backend,
            retry,
            timeout,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Send a request, retrying transient failures. Cancellation is honoured
    /// during attempts and backoff sleeps; the in-flight attempt is dropped.
    pub async fn send(
        &self,
        request: &GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<GenerationResponse, GenerationError> {
        let started = Instant::now();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(GenerationError::Cancelled),
                result = tokio::time::timeout(self.timeout, self.backend.generate(request)) => {
                    result.unwrap_or(Err(GenerationError::Timeout(self.timeout)))
                }
            };

            match outcome {
                Ok(reply) => {
                    let elapsed = started.elapsed();
                    info!(
                        graph = %request.document.metadata.name,
                        attempts = attempt,
                        status = reply.status,
                        latency_ms = elapsed.as_millis() as u64,
                        "generation succeeded"
                    );
                    return Ok(GenerationResponse {
                        raw_text: reply.text,
                        status: reply.status,
                        elapsed,
                        attempts: attempt,
                        usage: reply.usage,
                    });
                }
                Err(GenerationError::Cancelled) => {
                    info!(graph = %request.document.metadata.name, attempt, "generation cancelled");
                    return Err(GenerationError::Cancelled);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        graph = %request.document.metadata.name,
                        attempt,
                        max_attempts,
                        error = %e,
                        backoff_ms = delay.as_millis() as u64,
                        "transient generation failure, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    error!(
                        graph = %request.document.metadata.name,
                        attempt,
                        error = %e,
                        latency_ms = started.elapsed().as_millis() as u64,
                        "generation failed"
                    );
                    return Err(e);
                }
            }
        }
    }
}
