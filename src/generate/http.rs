//! `reqwest` backend for the supported LLM providers.
//!
//! One non-streaming request per attempt. Payload shape, auth headers and
//! response extraction differ per provider:
//! - OpenAI, DeepSeek, LM Studio: chat-completions (`choices[0].message.content`)
//! - Anthropic: messages API (`content[0].text`)
//! - Gemini: `generateContent` (`candidates[0].content.parts[0].text`)
//! - Ollama: `/api/chat` (`message.content`)
//!
//! Status mapping: 408, 429 and 5xx are transient network failures; any other
//! non-2xx is a rejection. Undecodable bodies and empty content are malformed.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::prompt::{system_prompt, user_message};
use super::{BackendReply, GenerationBackend, GenerationError, GenerationRequest, TokenUsage};
use crate::config::{BackendConfig, ConfigError, Provider};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const SNIPPET_LEN: usize = 300;

/// Credentials travel in sensitive headers only, never in the URL.
pub struct HttpBackend {
    client: reqwest::Client,
    cfg: BackendConfig,
    url: String,
}

impl fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackend")
            .field("cfg", &self.cfg)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl HttpBackend {
    /// Validates the configuration and builds a client with the provider's
    /// auth headers and the configured per-request timeout.
    pub fn new(cfg: BackendConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let api_key = cfg.api_key.clone().unwrap_or_default();
        let header_value = |value: String| {
            let mut value =
                header::HeaderValue::from_str(&value).map_err(|_| ConfigError::InvalidFormat {
                    var: "api_key",
                    reason: "not a valid header value",
                })?;
            value.set_sensitive(true);
            Ok::<_, ConfigError>(value)
        };

        match cfg.provider {
            Provider::OpenAi | Provider::DeepSeek => {
                headers.insert(header::AUTHORIZATION, header_value(format!("Bearer {}", api_key))?);
            }
            Provider::Anthropic => {
                headers.insert("x-api-key", header_value(api_key.clone())?);
                headers.insert(
                    "anthropic-version",
                    header::HeaderValue::from_static(ANTHROPIC_VERSION),
                );
            }
            Provider::LmStudio | Provider::Ollama if !api_key.is_empty() => {
                headers.insert(header::AUTHORIZATION, header_value(format!("Bearer {}", api_key))?);
            }
            Provider::Gemini => {
                headers.insert("x-goog-api-key", header_value(api_key.clone())?);
            }
            Provider::LmStudio | Provider::Ollama => {}
        }

        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let url = match cfg.provider {
            Provider::Gemini => format!("{}{}:generateContent", cfg.endpoint(), cfg.model),
            _ => cfg.endpoint().to_string(),
        };

        info!(
            provider = ?cfg.provider,
            model = %cfg.model,
            endpoint = %cfg.endpoint(),
            timeout_secs = cfg.timeout_secs,
            "HttpBackend initialized"
        );

        Ok(HttpBackend { client, cfg, url })
    }

    pub fn provider(&self) -> Provider {
        self.cfg.provider
    }

    /// Provider-specific request body.
    pub fn build_payload(&self, request: &GenerationRequest) -> Result<Value, GenerationError> {
        let system = system_prompt(request.options.target_language, &request.options.style);
        let user = user_message(request).map_err(|e| GenerationError::InvalidRequest(e.to_string()))?;
        let temperature = request.options.model.temperature.unwrap_or(self.cfg.temperature);
        let max_tokens = request.options.model.max_tokens.unwrap_or(self.cfg.max_tokens);
        Ok(build_payload(
            self.cfg.provider,
            &self.cfg.model,
            &system,
            &user,
            temperature,
            max_tokens,
        ))
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<BackendReply, GenerationError> {
        let started = Instant::now();
        let body = self.build_payload(request)?;

        debug!(
            provider = ?self.cfg.provider,
            model = %self.cfg.model,
            graph = %request.document.metadata.name,
            records = request.document.nodes.len(),
            "POST generation request"
        );

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.cfg.request_timeout()))?;

        let status = resp.status();
        if !status.is_success() {
            let snippet = match resp.text().await {
                Ok(text) => make_snippet(&text),
                Err(e) => {
                    let e = e.without_url();
                    warn!(%status, error = %e, "failed to read error response body");
                    format!("<unreadable body: {}>", e)
                }
            };
            error!(
                %status,
                %snippet,
                provider = ?self.cfg.provider,
                latency_ms = started.elapsed().as_millis() as u64,
                "generation backend returned non-success status"
            );
            return Err(status_error(status.as_u16(), snippet));
        }

        let value: Value = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                transport_error(e, self.cfg.request_timeout())
            } else {
                GenerationError::MalformedResponse(format!(
                    "response is not JSON: {}",
                    e.without_url()
                ))
            }
        })?;

        let (text, usage) = extract_reply(self.cfg.provider, &value)?;

        debug!(
            provider = ?self.cfg.provider,
            latency_ms = started.elapsed().as_millis() as u64,
            chars = text.len(),
            input_tokens = usage.map(|u| u.input_tokens),
            output_tokens = usage.map(|u| u.output_tokens),
            "generation response decoded"
        );

        Ok(BackendReply {
            text,
            status: status.as_u16(),
            usage,
        })
    }
}

// -----------------------------------------------------------------------------
// Payloads
// -----------------------------------------------------------------------------

fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("o1") || model.starts_with("o3") || model.starts_with("o4")
}

pub fn build_payload(
    provider: Provider,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
    max_tokens: u32,
) -> Value {
    match provider {
        Provider::Anthropic => json!({
            "model": model,
            "system": system,
            "messages": [
                { "role": "user", "content": [ { "type": "text", "text": user } ] }
            ],
            "temperature": temperature,
            "max_tokens": max_tokens,
        }),
        Provider::Gemini => json!({
            "systemInstruction": { "role": "user", "parts": [ { "text": system } ] },
            "contents": [ { "role": "user", "parts": [ { "text": user } ] } ],
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": max_tokens,
            },
        }),
        Provider::Ollama => json!({
            "model": model,
            "stream": false,
            "messages": chat_messages(system, user),
            "temperature": temperature,
            "options": { "num_predict": max_tokens },
        }),
        Provider::OpenAi if is_reasoning_model(model) => json!({
            "model": model,
            "messages": chat_messages(system, user),
            "max_completion_tokens": max_tokens,
        }),
        Provider::LmStudio => json!({
            "model": model,
            "messages": chat_messages(system, user),
            "max_tokens": max_tokens,
        }),
        Provider::OpenAi | Provider::DeepSeek => json!({
            "model": model,
            "messages": chat_messages(system, user),
            "temperature": temperature,
            "max_tokens": max_tokens,
        }),
    }
}

fn chat_messages(system: &str, user: &str) -> Value {
    json!([
        { "role": "system", "content": system },
        { "role": "user", "content": user },
    ])
}

// -----------------------------------------------------------------------------
// Responses
// -----------------------------------------------------------------------------

/// Message text and token usage from a decoded provider response.
pub fn extract_reply(
    provider: Provider,
    value: &Value,
) -> Result<(String, Option<TokenUsage>), GenerationError> {
    let (content, usage) = match provider {
        Provider::Anthropic => (
            value.pointer("/content/0/text"),
            usage_from(value, "/usage/input_tokens", "/usage/output_tokens"),
        ),
        Provider::Gemini => (
            value.pointer("/candidates/0/content/parts/0/text"),
            usage_from(
                value,
                "/usageMetadata/promptTokenCount",
                "/usageMetadata/candidatesTokenCount",
            ),
        ),
        Provider::Ollama => (
            value.pointer("/message/content"),
            usage_from(value, "/prompt_eval_count", "/eval_count"),
        ),
        Provider::OpenAi | Provider::DeepSeek | Provider::LmStudio => (
            value.pointer("/choices/0/message/content"),
            usage_from(value, "/usage/prompt_tokens", "/usage/completion_tokens"),
        ),
    };

    let text = content
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            GenerationError::MalformedResponse(format!(
                "no message content in {:?} response",
                provider
            ))
        })?;

    Ok((text.to_string(), usage))
}

fn usage_from(value: &Value, input: &str, output: &str) -> Option<TokenUsage> {
    let read = |ptr: &str| value.pointer(ptr).and_then(Value::as_u64).map(|n| n as u32);
    match (read(input), read(output)) {
        (None, None) => None,
        (i, o) => Some(TokenUsage {
            input_tokens: i.unwrap_or(0),
            output_tokens: o.unwrap_or(0),
        }),
    }
}

pub fn status_error(status: u16, snippet: String) -> GenerationError {
    match status {
        408 | 429 | 500..=599 => GenerationError::Network(format!("HTTP {}: {}", status, snippet)),
        _ => GenerationError::BackendRejected {
            status,
            message: snippet,
        },
    }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout(timeout)
    } else {
        GenerationError::Network(e.without_url().to_string())
    }
}

fn make_snippet(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(SNIPPET_LEN) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
