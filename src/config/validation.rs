use super::{AppConfig, ConfigError, ENV_API_KEY, ENV_MODEL};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_generation_config(config)?;
    validate_benchmark_config(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if !server.base_url.starts_with("http://") && !server.base_url.starts_with("https://") {
        return Err(validation_err(
            "server.base_url must start with http:// or https://",
        ));
    }
    url::Url::parse(&server.base_url)
        .map_err(|err| validation_err(format!("server.base_url is not a valid URL: {err}")))?;

    if server.api_key.as_deref().is_none_or(|key| key.trim().is_empty()) {
        return Err(validation_err(format!(
            "server.api_key is required (set it in the config file or {ENV_API_KEY})"
        )));
    }
    if server.model.as_deref().is_none_or(|model| model.trim().is_empty()) {
        return Err(validation_err(format!(
            "server.model is required (set it in the config file or {ENV_MODEL})"
        )));
    }
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if server.connect_timeout == 0 {
        return Err(validation_err(
            "server.connect_timeout must be greater than 0",
        ));
    }
    if let Some(proxy) = server.proxy.as_deref() {
        validate_proxy_url(proxy)?;
    }
    Ok(())
}

fn validate_proxy_url(proxy: &str) -> Result<(), ConfigError> {
    let trimmed = proxy.trim();
    if trimmed.is_empty() {
        return Err(validation_err("server.proxy cannot be empty when set"));
    }
    let is_supported = ["http://", "https://", "socks5://", "socks5h://"]
        .iter()
        .any(|scheme| trimmed.starts_with(scheme));
    if !is_supported {
        return Err(validation_err(
            "server.proxy must start with http://, https://, socks5:// or socks5h://",
        ));
    }
    Ok(())
}

fn validate_generation_config(config: &AppConfig) -> Result<(), ConfigError> {
    let generation = &config.generation;
    if !(0.0..=2.0).contains(&generation.temperature) {
        return Err(validation_err(
            "generation.temperature must be between 0.0 and 2.0",
        ));
    }
    if generation.max_tokens == 0 {
        return Err(validation_err(
            "generation.max_tokens must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_benchmark_config(config: &AppConfig) -> Result<(), ConfigError> {
    let benchmark = &config.benchmark;
    if benchmark.repetitions == 0 {
        return Err(validation_err(
            "benchmark.repetitions must be greater than 0",
        ));
    }
    if !(0.0..=2.0).contains(&benchmark.temperature) {
        return Err(validation_err(
            "benchmark.temperature must be between 0.0 and 2.0",
        ));
    }
    for case in &benchmark.cases {
        if case.prompt.trim().is_empty() {
            return Err(validation_err(format!(
                "benchmark case '{}': prompt cannot be empty",
                case.name
            )));
        }
        if case.max_tokens == 0 {
            return Err(validation_err(format!(
                "benchmark case '{}': max_tokens must be greater than 0",
                case.name
            )));
        }
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "TRACE", "DISABLED",
];

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "Invalid log_level '{}'. Must be one of: {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}
