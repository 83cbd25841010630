use crate::config::AppConfig;
use crate::protocol::openai_chat::OpenAiModel;
use crate::transport::HttpTransport;

use super::{cancellable, AppError};

/// One table row per model; the configured model is starred.
#[must_use]
pub fn format_model_line(model: &OpenAiModel, configured: &str) -> String {
    let marker = if model.id == configured { '*' } else { ' ' };
    match model.max_model_len {
        Some(context) => format!("{marker} {} (context {context})", model.id),
        None => format!("{marker} {}", model.id),
    }
}

/// List the models the server serves.
///
/// # Errors
///
/// Returns transport errors and report encoding errors.
pub async fn run_models(config: &AppConfig, json: bool) -> Result<(), AppError> {
    let transport = HttpTransport::new(&config.server)?;
    let models = cancellable(transport.list_models()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }
    if models.is_empty() {
        println!("No models found at {}", config.server.base_url);
        return Ok(());
    }
    let configured = config.server.model();
    for model in &models {
        println!("{}", format_model_line(model, configured));
    }
    if !models.iter().any(|model| model.id == configured) {
        tracing::warn!(model = configured, "configured model is not served by this server");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_line_marks_configured_model() {
        let model = OpenAiModel {
            id: "gpt-oss-20b".into(),
            owned_by: Some("vllm".into()),
            max_model_len: Some(131_072),
        };
        assert_eq!(
            format_model_line(&model, "gpt-oss-20b"),
            "* gpt-oss-20b (context 131072)"
        );
        let other = OpenAiModel {
            max_model_len: None,
            ..model
        };
        assert_eq!(format_model_line(&other, "x"), "  gpt-oss-20b");
    }
}
