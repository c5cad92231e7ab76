use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VellumError};

/// Top-level Vellum configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Global defaults for the generative API. Individual `llm_task` steps may
/// override endpoint and model per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_timeout_secs() -> u64 { 120 }
fn default_max_output_tokens() -> u32 { 8192 }
fn default_temperature() -> f32 { 0.0 }

impl LlmConfig {
    /// Apply per-step endpoint/model overrides, keeping everything else.
    pub fn with_overrides(&self, endpoint: Option<&str>, model: Option<&str>) -> LlmConfig {
        let mut config = self.clone();
        if let Some(endpoint) = endpoint {
            config.endpoint = endpoint.to_string();
        }
        if let Some(model) = model {
            config.model_id = model.to_string();
        }
        config
    }
}

/// Batch runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of concurrent in-flight requests.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}

fn default_max_workers() -> usize { 4 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| VellumError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references (API keys are typically ${GEMINI_API_KEY})
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| VellumError::Config(e.to_string()))
    }

    /// The API key, or a config error naming the expected source.
    pub fn require_api_key(&self) -> Result<&str> {
        self.llm
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty() && !key.starts_with("${"))
            .ok_or_else(|| {
                VellumError::Config(
                    "llm.api_key is not set (use api_key = \"${GEMINI_API_KEY}\")".to_string(),
                )
            })
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
