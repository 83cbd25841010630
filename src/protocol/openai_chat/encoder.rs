use crate::protocol::canonical::ChatMessage;

use super::{OpenAiChatRequest, OpenAiStreamOptions, OpenAiTool};

/// Sampling parameters for one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f64,
    pub max_tokens: u64,
}

/// Build a chat-completions request.
///
/// Streaming requests always ask for `include_usage` so the terminal chunk
/// carries the authoritative completion token count.
#[must_use]
pub fn encode_chat_request(
    model: &str,
    messages: &[ChatMessage],
    params: SamplingParams,
    stream: bool,
    tools: Option<&[OpenAiTool]>,
) -> OpenAiChatRequest {
    OpenAiChatRequest {
        model: model.to_string(),
        messages: messages.to_vec(),
        tools: tools.filter(|tools| !tools.is_empty()).map(<[_]>::to_vec),
        stream,
        stream_options: stream.then_some(OpenAiStreamOptions {
            include_usage: Some(true),
        }),
        temperature: Some(params.temperature),
        max_tokens: Some(params.max_tokens),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::openai_chat::OpenAiToolFunction;

    const PARAMS: SamplingParams = SamplingParams {
        temperature: 1.0,
        max_tokens: 50,
    };

    #[test]
    fn test_streaming_request_asks_for_usage() {
        let req = encode_chat_request("m", &[ChatMessage::user("hi")], PARAMS, true, None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["stream_options"]["include_usage"], true);
        assert_eq!(json["max_tokens"], 50);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_non_streaming_request_omits_stream_options() {
        let req = encode_chat_request("m", &[ChatMessage::user("hi")], PARAMS, false, None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["stream"], false);
        assert!(json.get("stream_options").is_none());
    }

    #[test]
    fn test_empty_tool_list_is_not_sent() {
        let tools = vec![OpenAiTool {
            type_: "function".to_string(),
            function: OpenAiToolFunction {
                name: "calculate".to_string(),
                description: None,
                parameters: None,
            },
        }];
        let req = encode_chat_request("m", &[], PARAMS, true, Some(&[]));
        assert!(req.tools.is_none());
        let req = encode_chat_request("m", &[], PARAMS, true, Some(&tools));
        assert_eq!(req.tools.as_deref(), Some(tools.as_slice()));
    }
}
