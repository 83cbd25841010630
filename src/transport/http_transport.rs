use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::ClientError;
use crate::protocol::openai_chat::{
    OpenAiChatRequest, OpenAiChatResponse, OpenAiErrorEnvelope, OpenAiModel, OpenAiModelList,
};
use crate::stream::{decoded_event_stream, EventStream};

const POOL_MAX_IDLE_PER_HOST: usize = 4;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const ERROR_BODY_PREVIEW_CHARS: usize = 512;

fn build_reqwest_client(config: &ServerConfig) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(config.timeout));

    if let Some(proxy_url) = config.proxy.as_deref().filter(|url| !url.trim().is_empty()) {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| ClientError::Config(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    } else if !config.http_use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| ClientError::Config(format!("Failed to build HTTP client: {err}")))
}

fn endpoint_url(base: &str, path: &str) -> Result<url::Url, ClientError> {
    let joined = format!("{}/{path}", base.trim_end_matches('/'));
    url::Url::parse(&joined)
        .map_err(|err| ClientError::Config(format!("Invalid endpoint URL '{joined}': {err}")))
}

/// HTTP client for one OpenAI-compatible server.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    chat_url: url::Url,
    models_url: url::Url,
    api_key: String,
}

impl HttpTransport {
    /// Build a transport from validated server settings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the base URL or proxy is unusable.
    pub fn new(config: &ServerConfig) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_reqwest_client(config)?,
            chat_url: endpoint_url(&config.base_url, "chat/completions")?,
            models_url: endpoint_url(&config.base_url, "models")?,
            api_key: config.api_key().to_string(),
        })
    }

    #[must_use]
    pub fn chat_url(&self) -> &url::Url {
        &self.chat_url
    }

    async fn post_chat(&self, request: &OpenAiChatRequest) -> Result<reqwest::Response, ClientError> {
        tracing::debug!(
            url = %self.chat_url,
            model = %request.model,
            stream = request.stream,
            messages = request.messages.len(),
            "sending chat request"
        );
        let response = self
            .client
            .post(self.chat_url.clone())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        ensure_success(response).await
    }

    /// Send a non-streaming chat completion request.
    ///
    /// # Errors
    ///
    /// Returns connection errors, non-2xx statuses as [`ClientError::Upstream`],
    /// and undecodable bodies as [`ClientError::InvalidResponse`].
    pub async fn send_chat(
        &self,
        request: &OpenAiChatRequest,
    ) -> Result<OpenAiChatResponse, ClientError> {
        let response = self.post_chat(request).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|err| ClientError::InvalidResponse(format!("chat completion body: {err}")))
    }

    /// Open a streaming chat completion and return its decoded events.
    ///
    /// The returned stream yields one event per chunk and ends after
    /// `data: [DONE]` or when the server closes the body.
    ///
    /// # Errors
    ///
    /// Fails before any event when the server is unreachable or answers with
    /// a non-2xx status.
    pub async fn open_stream(&self, request: &OpenAiChatRequest) -> Result<EventStream, ClientError> {
        let response = self.post_chat(request).await?;
        Ok(decoded_event_stream(response.bytes_stream()))
    }

    /// List the models the server exposes.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`HttpTransport::send_chat`].
    pub async fn list_models(&self) -> Result<Vec<OpenAiModel>, ClientError> {
        let response = self
            .client
            .get(self.models_url.clone())
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body = response.bytes().await?;
        let list: OpenAiModelList = serde_json::from_slice(&body)
            .map_err(|err| ClientError::InvalidResponse(format!("model list body: {err}")))?;
        Ok(list.data)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Upstream {
        status: status.as_u16(),
        message: upstream_message(&body),
    })
}

/// Prefer the server's `error.message`, else a bounded preview of the body.
fn upstream_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<OpenAiErrorEnvelope>(body) {
        return envelope.error.message;
    }
    let trimmed = body.trim();
    match trimmed.char_indices().nth(ERROR_BODY_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
