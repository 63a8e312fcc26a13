//! Startup provider selection.
//!
//! `CHATLINE_PROVIDER=mock` runs the deterministic local provider;
//! `CHATLINE_PROVIDER=ollama` reads a strict JSON config file from
//! `CHATLINE_OLLAMA_CONFIG_PATH`.

use std::sync::Arc;
use std::time::Duration;

use chat_provider::TurnProvider;
use chat_provider_mock::MockProvider;
use chat_provider_ollama::{OllamaProvider, OllamaProviderConfig, OLLAMA_PROVIDER_ID};
use serde::Deserialize;

pub const DEFAULT_PROVIDER_ID: &str = "mock";
pub const PROVIDER_ENV_VAR: &str = "CHATLINE_PROVIDER";
pub const OLLAMA_CONFIG_ENV_VAR: &str = "CHATLINE_OLLAMA_CONFIG_PATH";

/// On-disk Ollama provider config. Unknown fields are rejected so typos fail
/// loudly at startup instead of silently running with defaults.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OllamaConfigFile {
    #[serde(default)]
    base_url: Option<String>,
    models: Vec<String>,
    #[serde(default)]
    timeout_sec: Option<u64>,
}

pub fn provider_from_env() -> Result<Arc<dyn TurnProvider>, String> {
    let provider_id = std::env::var(PROVIDER_ENV_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    provider_for_id(provider_id.as_deref().unwrap_or(DEFAULT_PROVIDER_ID))
}

pub fn provider_for_id(provider_id: &str) -> Result<Arc<dyn TurnProvider>, String> {
    match provider_id {
        DEFAULT_PROVIDER_ID => Ok(Arc::new(MockProvider::default())),
        OLLAMA_PROVIDER_ID => ollama_provider_from_env(),
        unknown => Err(format!(
            "Unsupported provider '{unknown}'. Available providers: {DEFAULT_PROVIDER_ID}, {OLLAMA_PROVIDER_ID}"
        )),
    }
}

fn ollama_provider_from_env() -> Result<Arc<dyn TurnProvider>, String> {
    let path = std::env::var(OLLAMA_CONFIG_ENV_VAR).map_err(|_| {
        format!("{OLLAMA_CONFIG_ENV_VAR} must point to a JSON config file for the ollama provider")
    })?;

    let raw = std::fs::read_to_string(&path)
        .map_err(|error| format!("Failed to read ollama config '{path}': {error}"))?;

    let config = parse_ollama_config(&raw)
        .map_err(|error| format!("Invalid ollama config '{path}': {error}"))?;

    OllamaProvider::new(config)
        .map(|provider| Arc::new(provider) as Arc<dyn TurnProvider>)
        .map_err(|error| error.to_string())
}

fn parse_ollama_config(raw: &str) -> Result<OllamaProviderConfig, String> {
    let file: OllamaConfigFile = serde_json::from_str(raw).map_err(|error| error.to_string())?;

    if file.models.iter().all(|model| model.trim().is_empty()) {
        return Err("'models' must include at least one non-empty model ID".to_string());
    }
    if let Some(0) = file.timeout_sec {
        return Err("'timeout_sec' must be > 0 when provided".to_string());
    }

    let mut config = OllamaProviderConfig::new(file.models);
    if let Some(base_url) = file.base_url.filter(|value| !value.trim().is_empty()) {
        config = config.with_base_url(base_url);
    }
    if let Some(timeout_sec) = file.timeout_sec {
        config = config.with_timeout(Duration::from_secs(timeout_sec));
    }

    Ok(config)
}
