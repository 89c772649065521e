//! Environment-backed configuration.
//!
//! Precedence everywhere: explicit flag > environment variable > default.

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::time::Duration;

pub(crate) const PARAMXML_DB_DIR_ENV: &str = "PARAMXML_DB_DIR";
pub(crate) const PARAMXML_LLM_BACKEND_ENV: &str = "PARAMXML_LLM_BACKEND";
pub(crate) const PARAMXML_LLM_MODEL_ENV: &str = "PARAMXML_LLM_MODEL";
pub(crate) const PARAMXML_LLM_TIMEOUT_SECS_ENV: &str = "PARAMXML_LLM_TIMEOUT_SECS";
pub(crate) const PARAMXML_LLM_MAX_ATTEMPTS_ENV: &str = "PARAMXML_LLM_MAX_ATTEMPTS";
pub(crate) const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";
pub(crate) const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub(crate) const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";

const DEFAULT_DB_DIR: &str = "./paramxml-db";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;
const MAX_LLM_TIMEOUT_SECS: u64 = 600;
const DEFAULT_LLM_MAX_ATTEMPTS: u32 = 2;
// Upper bound so a misconfigured env var cannot stall a run indefinitely.
const MAX_LLM_ATTEMPTS: u32 = 5;

/// Non-empty, trimmed env var value.
pub(crate) fn env_value(name: &str) -> Result<Option<String>> {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.trim();
            Ok(if v.is_empty() { None } else { Some(v.to_string()) })
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(anyhow!("failed to read {name}: {e}")),
    }
}

/// Store directory: `--db`, then `PARAMXML_DB_DIR`, then `./paramxml-db`.
pub(crate) fn store_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    Ok(env_value(PARAMXML_DB_DIR_ENV)?
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_DIR)))
}

/// Resolve the effective LLM timeout.
///
/// Every request is bounded: `0` is rejected and values above
/// `MAX_LLM_TIMEOUT_SECS` are clamped.
pub(crate) fn llm_timeout(timeout_secs_override: Option<u64>) -> Result<Duration> {
    let secs = match timeout_secs_override {
        Some(v) => v,
        None => match env_value(PARAMXML_LLM_TIMEOUT_SECS_ENV)? {
            Some(v) => v.parse::<u64>().map_err(|_| {
                anyhow!(
                    "invalid {PARAMXML_LLM_TIMEOUT_SECS_ENV}={v:?} (expected integer seconds)"
                )
            })?,
            None => DEFAULT_LLM_TIMEOUT_SECS,
        },
    };

    if secs == 0 {
        return Err(anyhow!(
            "LLM timeout must be at least 1 second (got 0; requests are never unbounded)"
        ));
    }
    Ok(Duration::from_secs(secs.min(MAX_LLM_TIMEOUT_SECS)))
}

/// Attempts per LLM call, clamped to `1..=MAX_LLM_ATTEMPTS`.
pub(crate) fn llm_max_attempts() -> Result<u32> {
    let n = match env_value(PARAMXML_LLM_MAX_ATTEMPTS_ENV)? {
        Some(v) => v.parse::<u32>().map_err(|_| {
            anyhow!("invalid {PARAMXML_LLM_MAX_ATTEMPTS_ENV}={v:?} (expected a positive integer)")
        })?,
        None => DEFAULT_LLM_MAX_ATTEMPTS,
    };
    Ok(n.clamp(1, MAX_LLM_ATTEMPTS))
}
