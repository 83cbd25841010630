use crate::error::ClientError;
use crate::protocol::canonical::TokenUsage;

use super::stream::{select_fragment, Fragment};
use super::OpenAiChatResponse;

/// Text and usage of a non-streaming completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCompletion {
    pub fragment: Option<Fragment>,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

impl DecodedCompletion {
    #[must_use]
    pub fn text(&self) -> &str {
        self.fragment
            .as_ref()
            .map_or("", |fragment| fragment.text.as_str())
    }
}

/// Decode the first choice of a non-streaming response, applying the same
/// channel precedence as the stream decoder.
///
/// # Errors
///
/// Returns [`ClientError::InvalidResponse`] when the response has no choices.
pub fn decode_chat_response(response: OpenAiChatResponse) -> Result<DecodedCompletion, ClientError> {
    let usage = response.usage;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::InvalidResponse("response contained no choices".into()))?;

    Ok(DecodedCompletion {
        fragment: select_fragment(choice.message.reasoning_content, choice.message.content),
        usage,
        finish_reason: choice.finish_reason,
    })
}
