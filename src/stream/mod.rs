pub mod sse;

pub use sse::{is_done_event, sse_frame_stream, SseParser};

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{future, Stream, StreamExt};
use pin_project_lite::pin_project;

use crate::error::ClientError;
use crate::protocol::openai_chat::stream::{decode_stream_chunk, parse_stream_chunk, DecodedEvent};
use crate::protocol::openai_chat::{OpenAiErrorEnvelope, OpenAiStreamChunk};

/// A parsed SSE frame from the server.
#[derive(Debug, Clone, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// What one SSE `data` payload turned out to be.
#[derive(Debug)]
pub enum ChunkPayload {
    Chunk(OpenAiStreamChunk),
    Done,
    Error(ClientError),
    /// Not a chunk; skipped.
    Malformed,
}

/// Classify the `data` payload of one SSE event.
#[must_use]
pub fn classify_payload(data: &str) -> ChunkPayload {
    let trimmed = data.trim();
    if trimmed == "[DONE]" {
        return ChunkPayload::Done;
    }
    match parse_stream_chunk(trimmed) {
        Ok(chunk) if chunk.choices.is_empty() && chunk.usage.is_none() => {
            match serde_json::from_str::<OpenAiErrorEnvelope>(trimmed) {
                Ok(envelope) => ChunkPayload::Error(upstream_error(envelope)),
                Err(_) => ChunkPayload::Chunk(chunk),
            }
        }
        Ok(chunk) => ChunkPayload::Chunk(chunk),
        Err(parse_err) => {
            tracing::debug!(error = %parse_err, payload = trimmed, "skipping malformed stream chunk");
            ChunkPayload::Malformed
        }
    }
}

fn upstream_error(envelope: OpenAiErrorEnvelope) -> ClientError {
    let status = envelope
        .error
        .code
        .as_ref()
        .and_then(serde_json::Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .unwrap_or(500);
    ClientError::Upstream {
        status,
        message: envelope.error.message,
    }
}

/// Turn an HTTP body into the ordered sequence of response chunks.
///
/// The sequence ends at `data: [DONE]` or when the body ends. Malformed
/// payloads are skipped; body errors and in-band error payloads are yielded
/// as `Err` items.
pub fn chunk_stream<S, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<OpenAiStreamChunk, ClientError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    sse_frame_stream(byte_stream)
        .map(|item| match item {
            Ok(event) if is_done_event(&event) => ChunkPayload::Done,
            Ok(event) => classify_payload(&event.data),
            Err(err) => ChunkPayload::Error(err.into()),
        })
        .take_while(|payload| future::ready(!matches!(payload, ChunkPayload::Done)))
        .filter_map(|payload| {
            future::ready(match payload {
                ChunkPayload::Chunk(chunk) => Some(Ok(chunk)),
                ChunkPayload::Error(err) => Some(Err(err)),
                ChunkPayload::Done | ChunkPayload::Malformed => None,
            })
        })
}

pin_project! {
    /// Lazily decodes a chunk stream into [`DecodedEvent`]s, one per chunk.
    ///
    /// Single pass: a live stream cannot be replayed.
    pub struct DecodedStream<S> {
        #[pin]
        inner: S,
    }
}

impl<S> DecodedStream<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S> Stream for DecodedStream<S>
where
    S: Stream<Item = Result<OpenAiStreamChunk, ClientError>>,
{
    type Item = Result<DecodedEvent, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project()
            .inner
            .poll_next(cx)
            .map(|item| item.map(|chunk| chunk.map(decode_stream_chunk)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Boxed decoded-event stream handed out by the transport.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<DecodedEvent, ClientError>> + Send>>;

/// Decode an HTTP body straight into [`DecodedEvent`]s.
pub fn decoded_event_stream<S, E>(byte_stream: S) -> EventStream
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    Box::pin(DecodedStream::new(chunk_stream(byte_stream)))
}
