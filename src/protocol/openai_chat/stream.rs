use crate::protocol::canonical::TokenUsage;

use super::OpenAiStreamChunk;

/// Which delta field a fragment was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextChannel {
    /// Non-standard `reasoning_content`.
    Reasoning,
    /// Standard `content`.
    Content,
}

/// A piece of generated text and the channel it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub channel: TextChannel,
    pub text: String,
}

/// One decoded stream chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedEvent {
    pub fragment: Option<Fragment>,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

impl DecodedEvent {
    #[must_use]
    pub fn fragment_text(&self) -> Option<&str> {
        self.fragment.as_ref().map(|fragment| fragment.text.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragment.is_none() && self.usage.is_none() && self.finish_reason.is_none()
    }
}

/// Pick the fragment for one delta.
///
/// `reasoning_content` wins whenever it is non-empty; `content` is used only
/// otherwise. Empty strings count as absent.
#[must_use]
pub fn select_fragment(reasoning: Option<String>, content: Option<String>) -> Option<Fragment> {
    if let Some(text) = reasoning.filter(|text| !text.is_empty()) {
        return Some(Fragment {
            channel: TextChannel::Reasoning,
            text,
        });
    }
    content.filter(|text| !text.is_empty()).map(|text| Fragment {
        channel: TextChannel::Content,
        text,
    })
}

/// Decode a stream chunk into exactly one [`DecodedEvent`].
///
/// Only the first choice is inspected. Chunks without choices (keep-alive or
/// usage-only) produce an event without a fragment; usage is attached
/// independently of the fragment.
#[must_use]
pub fn decode_stream_chunk(chunk: OpenAiStreamChunk) -> DecodedEvent {
    let mut event = DecodedEvent {
        usage: chunk.usage,
        ..DecodedEvent::default()
    };

    if let Some(choice) = chunk.choices.into_iter().next() {
        event.fragment = select_fragment(choice.delta.reasoning_content, choice.delta.content);
        event.finish_reason = choice.finish_reason;
    }

    event
}

/// Parse the `data` payload of one SSE event into a chunk.
///
/// # Errors
///
/// Returns the JSON error for payloads that are not chunk-shaped.
pub fn parse_stream_chunk(data: &str) -> Result<OpenAiStreamChunk, serde_json::Error> {
    serde_json::from_str(data)
}
