use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};

use crate::protocol::openai_chat::response_decoder::DecodedCompletion;
use crate::protocol::openai_chat::stream::DecodedEvent;

/// Time to first token of one streaming repetition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttft {
    Measured(Duration),
    /// The stream ended without a single fragment.
    NoFragment,
}

impl Ttft {
    #[must_use]
    pub fn measured(self) -> Option<Duration> {
        match self {
            Ttft::Measured(elapsed) => Some(elapsed),
            Ttft::NoFragment => None,
        }
    }

    #[must_use]
    pub fn is_valid(self) -> bool {
        matches!(self, Ttft::Measured(_))
    }
}

impl Serialize for Ttft {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.measured()
            .map(|elapsed| elapsed.as_secs_f64())
            .serialize(serializer)
    }
}

pub(crate) fn serialize_secs<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Measurements of one repetition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkSample {
    /// `None` for non-streaming requests, which have no first token.
    pub ttft: Option<Ttft>,
    #[serde(serialize_with = "serialize_secs")]
    pub total_time: Duration,
    pub generated_tokens: u64,
    pub tokens_per_second: f64,
    pub prompt_tokens: Option<u64>,
    pub response_chars: usize,
    pub chunk_count: usize,
    pub content_events: usize,
}

/// Throughput over an elapsed interval; zero unless both sides are positive.
#[must_use]
pub fn tokens_per_second(tokens: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if tokens == 0 || secs <= 0.0 {
        return 0.0;
    }
    tokens as f64 / secs
}

/// Sample for a blocking request that took `total_time`.
#[must_use]
pub fn completion_sample(completion: &DecodedCompletion, total_time: Duration) -> BenchmarkSample {
    let generated_tokens = completion.usage.map_or(0, |usage| usage.completion_tokens);
    BenchmarkSample {
        ttft: None,
        total_time,
        generated_tokens,
        tokens_per_second: tokens_per_second(generated_tokens, total_time),
        prompt_tokens: completion.usage.map(|usage| usage.prompt_tokens),
        response_chars: completion.text().chars().count(),
        chunk_count: 0,
        content_events: 0,
    }
}

/// Incremental timing of one streamed response.
///
/// Timestamps are passed in so the arithmetic can be driven without a
/// server.
#[derive(Debug, Clone)]
pub struct StreamMeasurement {
    start: Instant,
    first_fragment: Option<Instant>,
    completion_tokens: u64,
    prompt_tokens: Option<u64>,
    response_chars: usize,
    chunk_count: usize,
    content_events: usize,
}

impl StreamMeasurement {
    /// `start` is taken immediately before the request is issued.
    #[must_use]
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            first_fragment: None,
            completion_tokens: 0,
            prompt_tokens: None,
            response_chars: 0,
            chunk_count: 0,
            content_events: 0,
        }
    }

    pub fn observe(&mut self, event: &DecodedEvent, now: Instant) {
        self.chunk_count += 1;
        if let Some(fragment) = &event.fragment {
            self.first_fragment.get_or_insert(now);
            self.response_chars += fragment.text.chars().count();
            self.content_events += 1;
        }
        // last write wins; the terminal usage is authoritative
        if let Some(usage) = event.usage {
            self.completion_tokens = usage.completion_tokens;
            self.prompt_tokens = Some(usage.prompt_tokens);
        }
    }

    #[must_use]
    pub fn finish(self, end: Instant) -> BenchmarkSample {
        let total_time = end.saturating_duration_since(self.start);
        let ttft = match self.first_fragment {
            Some(first) => Ttft::Measured(first.saturating_duration_since(self.start)),
            None => Ttft::NoFragment,
        };
        BenchmarkSample {
            ttft: Some(ttft),
            total_time,
            generated_tokens: self.completion_tokens,
            tokens_per_second: tokens_per_second(self.completion_tokens, total_time),
            prompt_tokens: self.prompt_tokens,
            response_chars: self.response_chars,
            chunk_count: self.chunk_count,
            content_events: self.content_events,
        }
    }
}
