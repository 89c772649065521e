//! LLM-backed translation and splitting strategies.
//!
//! The model is **untrusted**: it proposes a candidate name (or a list of
//! sub-labels) and the core pipeline normalizes and registers it. Any failure
//! (network, timeout, garbage output) surfaces as
//! [`StrategyError::Unavailable`], and the resolver falls back to
//! transliteration / no split.
//!
//! Backends are configured from the environment:
//! - `PARAMXML_LLM_BACKEND` = `ollama` | `openai` (unset: disabled)
//! - `PARAMXML_LLM_MODEL` (required when a backend is set)
//! - `OLLAMA_HOST` (default `http://127.0.0.1:11434`)
//! - `OPENAI_API_KEY` (required for `openai`), `OPENAI_BASE_URL`
//! - `PARAMXML_LLM_TIMEOUT_SECS`, `PARAMXML_LLM_MAX_ATTEMPTS`

use anyhow::{anyhow, Result};
use paramxml_core::{ParameterLabel, SplittingStrategy, StrategyError, TranslationStrategy};
use std::sync::Arc;
use std::time::Duration;

#[cfg(any(feature = "llm-ollama", feature = "llm-openai"))]
use serde::Deserialize;
#[cfg(any(feature = "llm-ollama", feature = "llm-openai"))]
use serde_json::json;

use crate::config;

pub(crate) const LLM_STRATEGY_NAME: &str = "llm";

const TRANSLATE_SYSTEM_PROMPT: &str = "You name fields of structured documents. \
Translate the given parameter name (usually Russian) into a short English identifier \
in snake_case. Reply with the identifier only, no explanation.";

const SPLIT_SYSTEM_PROMPT: &str = "You split compound parameter names of structured documents. \
If the given parameter name (usually Russian) describes several independent values, reply with \
a JSON array of the atomic parameter names in their original order and language. Otherwise \
reply with a JSON array containing the name unchanged. Reply with JSON only.";

// ============================================================================
// Backends
// ============================================================================

/// Something that answers a single-turn chat.
pub(crate) trait ChatBackend: Send + Sync {
    fn describe(&self) -> String;

    fn chat(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Debug, Clone, Default)]
pub(crate) enum LlmBackend {
    #[default]
    Disabled,
    /// Local Ollama server, native `/api/chat` endpoint.
    #[cfg(feature = "llm-ollama")]
    Ollama {
        host: String,
        model: String,
        timeout: Duration,
    },
    /// OpenAI-compatible `/v1/chat/completions` endpoint.
    #[cfg(feature = "llm-openai")]
    OpenAI {
        base_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    },
}

impl LlmBackend {
    pub(crate) fn from_env() -> Result<Self> {
        let Some(kind) = config::env_value(config::PARAMXML_LLM_BACKEND_ENV)? else {
            return Ok(Self::Disabled);
        };
        match kind.to_ascii_lowercase().as_str() {
            "none" | "disabled" => Ok(Self::Disabled),
            #[cfg(feature = "llm-ollama")]
            "ollama" => Ok(Self::Ollama {
                host: normalize_http_base_url(
                    &config::env_value(config::OLLAMA_HOST_ENV)?.unwrap_or_default(),
                    DEFAULT_OLLAMA_HOST,
                ),
                model: required_model(&kind)?,
                timeout: config::llm_timeout(None)?,
            }),
            #[cfg(feature = "llm-openai")]
            "openai" => {
                let api_key = config::env_value(config::OPENAI_API_KEY_ENV)?.ok_or_else(|| {
                    anyhow!(
                        "OpenAI backend requires {} (set it in your env; do not hardcode secrets in scripts)",
                        config::OPENAI_API_KEY_ENV
                    )
                })?;
                Ok(Self::OpenAI {
                    base_url: normalize_http_base_url(
                        &config::env_value(config::OPENAI_BASE_URL_ENV)?.unwrap_or_default(),
                        DEFAULT_OPENAI_BASE_URL,
                    ),
                    api_key,
                    model: required_model(&kind)?,
                    timeout: config::llm_timeout(None)?,
                })
            }
            other => Err(anyhow!(
                "unsupported {}={other:?} (this build supports: {})",
                config::PARAMXML_LLM_BACKEND_ENV,
                supported_backends().join(", ")
            )),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

#[cfg(any(feature = "llm-ollama", feature = "llm-openai"))]
fn required_model(kind: &str) -> Result<String> {
    config::env_value(config::PARAMXML_LLM_MODEL_ENV)?.ok_or_else(|| {
        anyhow!(
            "{}={kind} requires {}",
            config::PARAMXML_LLM_BACKEND_ENV,
            config::PARAMXML_LLM_MODEL_ENV
        )
    })
}

fn supported_backends() -> Vec<&'static str> {
    let mut out = vec!["none"];
    if cfg!(feature = "llm-ollama") {
        out.push("ollama");
    }
    if cfg!(feature = "llm-openai") {
        out.push("openai");
    }
    out
}

impl ChatBackend for LlmBackend {
    fn describe(&self) -> String {
        match self {
            Self::Disabled => "disabled".to_string(),
            #[cfg(feature = "llm-ollama")]
            Self::Ollama { host, model, .. } => format!("ollama({host}) model={model}"),
            #[cfg(feature = "llm-openai")]
            Self::OpenAI {
                base_url, model, ..
            } => format!("openai({base_url}) model={model}"),
        }
    }

    // Without an HTTP feature only the disabled arm remains.
    #[cfg_attr(
        not(any(feature = "llm-ollama", feature = "llm-openai")),
        allow(unused_variables)
    )]
    fn chat(&self, system: &str, user: &str) -> Result<String> {
        match self {
            Self::Disabled => Err(anyhow!(
                "LLM backend is disabled (set {})",
                config::PARAMXML_LLM_BACKEND_ENV
            )),
            #[cfg(feature = "llm-ollama")]
            Self::Ollama {
                host,
                model,
                timeout,
            } => ollama_chat_with_timeout(host, model, user, system, *timeout),
            #[cfg(feature = "llm-openai")]
            Self::OpenAI {
                base_url,
                api_key,
                model,
                timeout,
            } => openai_chat_with_timeout(base_url, api_key, model, user, system, *timeout),
        }
    }
}

#[cfg(feature = "llm-ollama")]
const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";
#[cfg(feature = "llm-openai")]
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

#[cfg(any(feature = "llm-ollama", feature = "llm-openai"))]
fn normalize_http_base_url(url: &str, default: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        url = default.to_string();
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        url = format!("http://{url}");
    }
    url.trim_end_matches('/').to_string()
}

#[cfg(any(feature = "llm-ollama", feature = "llm-openai"))]
fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| anyhow!("failed to build http client: {e}"))
}

#[cfg(feature = "llm-ollama")]
fn ollama_chat_with_timeout(
    host: &str,
    model: &str,
    user: &str,
    system: &str,
    timeout: Duration,
) -> Result<String> {
    let url = format!("{host}/api/chat");
    let body = json!({
        "model": model,
        "stream": false,
        "messages": [
            { "role": "system", "content": system },
            { "role": "user", "content": user }
        ],
        "options": { "temperature": 0 }
    });

    let resp = http_client(timeout)?
        .post(&url)
        .json(&body)
        .send()
        .map_err(|e| anyhow!("failed to reach ollama at {url} (is it running?) ({e})"))?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        return Err(anyhow!("ollama http error {status}: {text}"));
    }

    #[derive(Deserialize)]
    struct OllamaChatResponse {
        message: OllamaChatMessage,
    }

    #[derive(Deserialize)]
    struct OllamaChatMessage {
        content: String,
    }

    let out: OllamaChatResponse = resp
        .json()
        .map_err(|e| anyhow!("ollama returned invalid JSON: {e}"))?;
    Ok(out.message.content)
}

#[cfg(feature = "llm-openai")]
fn openai_chat_with_timeout(
    base_url: &str,
    api_key: &str,
    model: &str,
    user: &str,
    system: &str,
    timeout: Duration,
) -> Result<String> {
    let url = format!("{base_url}/v1/chat/completions");
    let body = json!({
        "model": model,
        "temperature": 0,
        "messages": [
            { "role": "system", "content": system },
            { "role": "user", "content": user }
        ]
    });

    let resp = http_client(timeout)?
        .post(&url)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .map_err(|e| anyhow!("failed to reach OpenAI at {url}: {e}"))?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        return Err(anyhow!("openai http error {status}: {text}"));
    }

    #[derive(Deserialize)]
    struct ChatCompletion {
        choices: Vec<Choice>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: ChoiceMessage,
    }

    #[derive(Deserialize)]
    struct ChoiceMessage {
        content: Option<String>,
    }

    let out: ChatCompletion = resp
        .json()
        .map_err(|e| anyhow!("OpenAI returned invalid JSON: {e}"))?;
    out.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| anyhow!("OpenAI response had no message content"))
}

// ============================================================================
// Strategies
// ============================================================================

/// Ask the backend up to `max_attempts` times; first usable answer wins.
fn ask_with_retries<T>(
    backend: &dyn ChatBackend,
    max_attempts: u32,
    system: &str,
    user: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, StrategyError> {
    let mut last_error = String::from("no attempts made");
    for attempt in 1..=max_attempts.max(1) {
        match backend.chat(system, user) {
            Ok(reply) => match parse(&reply) {
                Some(out) => return Ok(out),
                None => last_error = format!("unusable reply: {:?}", reply.trim()),
            },
            Err(err) => last_error = err.to_string(),
        }
        tracing::debug!(
            backend = %backend.describe(),
            attempt,
            error = %last_error,
            "llm attempt failed"
        );
    }
    Err(StrategyError::unavailable(LLM_STRATEGY_NAME, last_error))
}

/// First non-empty line, without surrounding quotes or code fences.
fn parse_identifier_reply(reply: &str) -> Option<String> {
    let line = reply
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("```"))?;
    let cleaned = line.trim_matches(|c: char| matches!(c, '"' | '\'' | '`')).trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// The outermost JSON array of strings in the reply; blanks dropped.
fn parse_split_reply(reply: &str) -> Option<Vec<String>> {
    let start = reply.find('[')?;
    let end = reply.rfind(']')?;
    if end < start {
        return None;
    }
    let parts: Vec<String> = serde_json::from_str(&reply[start..=end]).ok()?;
    let parts: Vec<String> = parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}

pub(crate) struct LlmTranslator {
    backend: Arc<dyn ChatBackend>,
    max_attempts: u32,
}

impl LlmTranslator {
    pub(crate) fn new(backend: Arc<dyn ChatBackend>, max_attempts: u32) -> Self {
        Self {
            backend,
            max_attempts,
        }
    }
}

impl TranslationStrategy for LlmTranslator {
    fn name(&self) -> &str {
        LLM_STRATEGY_NAME
    }

    fn resolve(&self, label: &ParameterLabel) -> Result<String, StrategyError> {
        if label.is_blank() {
            return Err(StrategyError::InvalidLabel(label.as_str().to_string()));
        }
        ask_with_retries(
            self.backend.as_ref(),
            self.max_attempts,
            TRANSLATE_SYSTEM_PROMPT,
            label.as_str().trim(),
            parse_identifier_reply,
        )
    }
}

pub(crate) struct LlmSplitter {
    backend: Arc<dyn ChatBackend>,
    max_attempts: u32,
}

impl LlmSplitter {
    pub(crate) fn new(backend: Arc<dyn ChatBackend>, max_attempts: u32) -> Self {
        Self {
            backend,
            max_attempts,
        }
    }
}

impl SplittingStrategy for LlmSplitter {
    fn name(&self) -> &str {
        LLM_STRATEGY_NAME
    }

    fn split(&self, label: &ParameterLabel) -> Result<Vec<ParameterLabel>, StrategyError> {
        let parts = ask_with_retries(
            self.backend.as_ref(),
            self.max_attempts,
            SPLIT_SYSTEM_PROMPT,
            label.as_str().trim(),
            parse_split_reply,
        )?;
        Ok(parts.into_iter().map(ParameterLabel::new).collect())
    }
}
