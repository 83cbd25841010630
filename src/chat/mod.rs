mod conversation;

pub use conversation::Conversation;

use std::time::Instant;

use futures_util::StreamExt;

use crate::config::AppConfig;
use crate::error::ClientError;
use crate::observability::log_request_usage;
use crate::protocol::canonical::{ChatMessage, TokenUsage};
use crate::protocol::openai_chat::encoder::{encode_chat_request, SamplingParams};
use crate::protocol::openai_chat::stream::{DecodedEvent, Fragment, TextChannel};
use crate::protocol::openai_chat::OpenAiTool;
use crate::transport::HttpTransport;

/// Everything one streamed turn produced, split by channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnTranscript {
    /// All fragment text in arrival order.
    pub text: String,
    pub reasoning: String,
    pub content: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
    pub event_count: usize,
    pub fragment_count: usize,
}

impl TurnTranscript {
    pub fn absorb(&mut self, event: &DecodedEvent) {
        self.event_count += 1;
        if let Some(fragment) = &event.fragment {
            self.fragment_count += 1;
            self.text.push_str(&fragment.text);
            match fragment.channel {
                TextChannel::Reasoning => self.reasoning.push_str(&fragment.text),
                TextChannel::Content => self.content.push_str(&fragment.text),
            }
        }
        if event.usage.is_some() {
            self.usage = event.usage;
        }
        if event.finish_reason.is_some() {
            self.finish_reason.clone_from(&event.finish_reason);
        }
    }

    /// Text recorded as the assistant's reply in a tool-calling exchange:
    /// content when the model produced any, reasoning otherwise.
    #[must_use]
    pub fn assistant_text(&self) -> &str {
        if self.content.is_empty() {
            &self.reasoning
        } else {
            &self.content
        }
    }

    /// Text scanned for tool calls: reasoning, or content when no reasoning
    /// arrived.
    #[must_use]
    pub fn recovery_text(&self) -> &str {
        if self.reasoning.is_empty() {
            &self.content
        } else {
            &self.reasoning
        }
    }
}

/// Issues streaming chat turns for one model.
#[derive(Debug, Clone)]
pub struct ChatSession {
    transport: HttpTransport,
    model: String,
    params: SamplingParams,
}

impl ChatSession {
    #[must_use]
    pub fn new(transport: HttpTransport, model: impl Into<String>, params: SamplingParams) -> Self {
        Self {
            transport,
            model: model.into(),
            params,
        }
    }

    /// Build a session from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ClientError> {
        Ok(Self::new(
            HttpTransport::new(&config.server)?,
            config.server.model(),
            SamplingParams {
                temperature: config.generation.temperature,
                max_tokens: config.generation.max_tokens,
            },
        ))
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// Stream one turn over `messages`, reporting every fragment as it
    /// arrives.
    ///
    /// # Errors
    ///
    /// Fails on connection loss, non-2xx responses and in-band stream
    /// errors. Text received before the failure is discarded.
    pub async fn stream_turn<F>(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[OpenAiTool]>,
        mut on_fragment: F,
    ) -> Result<TurnTranscript, ClientError>
    where
        F: FnMut(&Fragment),
    {
        let request = encode_chat_request(&self.model, messages, self.params, true, tools);
        let started = Instant::now();
        let mut events = self.transport.open_stream(&request).await?;
        let mut transcript = TurnTranscript::default();

        while let Some(event) = events.next().await {
            let event = event?;
            if let Some(fragment) = &event.fragment {
                on_fragment(fragment);
            }
            transcript.absorb(&event);
        }

        if let Some(usage) = &transcript.usage {
            log_request_usage(&self.model, usage, started.elapsed());
        }
        Ok(transcript)
    }
}
