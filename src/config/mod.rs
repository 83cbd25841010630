pub mod validation;

use serde::{Deserialize, Serialize};
use std::path::Path;

use self::validation::validate_config;

/// Config file consulted when no explicit path is given.
pub const DEFAULT_CONFIG_PATH: &str = "localchat.yaml";

pub const ENV_BASE_URL: &str = "LOCALCHAT_BASE_URL";
pub const ENV_API_KEY: &str = "LOCALCHAT_API_KEY";
pub const ENV_MODEL: &str = "LOCALCHAT_MODEL";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Connection settings for the inference server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default)]
    pub http_use_env_proxy: bool,
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8000/v1".to_string()
}
fn default_timeout() -> u64 {
    600
}
fn default_connect_timeout() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: None,
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            http_use_env_proxy: false,
            proxy: None,
        }
    }
}

impl ServerConfig {
    /// Credential after validation; empty only for configs that skipped it.
    #[must_use]
    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or_default()
    }
}

/// Sampling defaults applied to chat requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
}

fn default_temperature() -> f64 {
    1.0
}
fn default_max_tokens() -> u64 {
    2048
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Interactive chat settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_chat_system_prompt")]
    pub system_prompt: String,
}

fn default_chat_system_prompt() -> String {
    "You are a helpful AI assistant. Be concise and helpful.".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_chat_system_prompt(),
        }
    }
}

/// Tool-calling flow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Overrides the prompt generated from the tool registry.
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_true")]
    pub send_tool_schemas: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            send_tool_schemas: true,
        }
    }
}

/// One benchmark prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkCase {
    pub name: String,
    pub prompt: String,
    pub max_tokens: u64,
}

impl BenchmarkCase {
    #[must_use]
    pub fn new(name: impl Into<String>, prompt: impl Into<String>, max_tokens: u64) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            max_tokens,
        }
    }
}

/// Benchmark driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_benchmark_cases")]
    pub cases: Vec<BenchmarkCase>,
}

fn default_repetitions() -> usize {
    3
}

fn default_benchmark_cases() -> Vec<BenchmarkCase> {
    vec![
        BenchmarkCase::new("Short prompt", "What is 2+2?", 50),
        BenchmarkCase::new(
            "Medium prompt",
            "Explain the concept of neural networks in simple terms.",
            150,
        ),
        BenchmarkCase::new(
            "Long generation",
            "Write a detailed explanation of how transformers work in AI.",
            300,
        ),
    ]
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            repetitions: default_repetitions(),
            temperature: default_temperature(),
            cases: default_benchmark_cases(),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "WARNING".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl AppConfig {
    /// Apply `LOCALCHAT_*` overrides. Blank values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(base_url) = non_blank(ENV_BASE_URL) {
            self.server.base_url = base_url;
        }
        if let Some(api_key) = non_blank(ENV_API_KEY) {
            self.server.api_key = Some(api_key);
        }
        if let Some(model) = non_blank(ENV_MODEL) {
            self.server.model = Some(model);
        }
    }
}

/// Parse configuration from YAML text without touching the environment.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    if contents.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}

/// Load configuration, apply environment overrides and validate it.
///
/// With `Some(path)` the file must exist. With `None`, [`DEFAULT_CONFIG_PATH`]
/// is read when present and defaults are used otherwise.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading fails, [`ConfigError::Yaml`] when
/// parsing fails, or [`ConfigError::Validation`] when the credential, model or
/// another setting is missing or invalid.
pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let contents = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            std::fs::read_to_string(DEFAULT_CONFIG_PATH)?
        }
        None => String::new(),
    };
    let mut config = parse_config(&contents)?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    validate_config(&config)?;
    Ok(config)
}
