//! Latency and throughput measurement against the chat endpoint.

mod sample;
mod summary;

pub use sample::{completion_sample, tokens_per_second, BenchmarkSample, StreamMeasurement, Ttft};
pub use summary::BenchmarkSummary;

use std::time::Instant;

use futures_util::StreamExt;
use serde::Serialize;

use crate::config::{AppConfig, BenchmarkCase};
use crate::error::ClientError;
use crate::protocol::canonical::ChatMessage;
use crate::protocol::openai_chat::encoder::{encode_chat_request, SamplingParams};
use crate::protocol::openai_chat::response_decoder::decode_chat_response;
use crate::transport::HttpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkMode {
    NonStreaming,
    Streaming,
}

impl BenchmarkMode {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            BenchmarkMode::NonStreaming => "NON-STREAMING",
            BenchmarkMode::Streaming => "STREAMING",
        }
    }
}

/// Result of one repetition. Failed repetitions are not retried.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(BenchmarkSample),
    Failed(ClientError),
}

impl RunOutcome {
    #[must_use]
    pub fn sample(&self) -> Option<&BenchmarkSample> {
        match self {
            RunOutcome::Completed(sample) => Some(sample),
            RunOutcome::Failed(_) => None,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum OutcomeView<'a> {
    Completed { sample: &'a BenchmarkSample },
    Failed { error: String },
}

impl Serialize for RunOutcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RunOutcome::Completed(sample) => OutcomeView::Completed { sample },
            RunOutcome::Failed(err) => OutcomeView::Failed {
                error: err.to_string(),
            },
        }
        .serialize(serializer)
    }
}

/// Per-repetition outcomes of one case plus their aggregate.
#[derive(Debug, Serialize)]
pub struct BenchmarkReport {
    pub case: BenchmarkCase,
    pub mode: BenchmarkMode,
    pub outcomes: Vec<RunOutcome>,
    pub summary: BenchmarkSummary,
}

/// Runs benchmark cases one request at a time.
#[derive(Debug, Clone)]
pub struct LatencyProfiler {
    transport: HttpTransport,
    model: String,
    temperature: f64,
}

impl LatencyProfiler {
    #[must_use]
    pub fn new(transport: HttpTransport, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            transport,
            model: model.into(),
            temperature,
        }
    }

    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ClientError> {
        Ok(Self::new(
            HttpTransport::new(&config.server)?,
            config.server.model(),
            config.benchmark.temperature,
        ))
    }

    /// Run `repetitions` sequential measurements of `case`.
    ///
    /// `on_outcome` sees each repetition (zero-based index) as it finishes.
    pub async fn run<F>(
        &self,
        case: &BenchmarkCase,
        mode: BenchmarkMode,
        repetitions: usize,
        mut on_outcome: F,
    ) -> BenchmarkReport
    where
        F: FnMut(usize, &RunOutcome),
    {
        let mut outcomes = Vec::with_capacity(repetitions);
        for index in 0..repetitions {
            let outcome = match self.measure(case, mode).await {
                Ok(sample) => RunOutcome::Completed(sample),
                Err(err) => {
                    tracing::warn!(case = %case.name, run = index + 1, error = %err, "benchmark repetition failed");
                    RunOutcome::Failed(err)
                }
            };
            on_outcome(index, &outcome);
            outcomes.push(outcome);
        }

        let summary = BenchmarkSummary::from_outcomes(&outcomes);
        BenchmarkReport {
            case: case.clone(),
            mode,
            outcomes,
            summary,
        }
    }

    /// One request-and-consume cycle.
    ///
    /// # Errors
    ///
    /// Propagates transport and stream errors; the repetition is then void.
    pub async fn measure(
        &self,
        case: &BenchmarkCase,
        mode: BenchmarkMode,
    ) -> Result<BenchmarkSample, ClientError> {
        let messages = [ChatMessage::user(case.prompt.as_str())];
        let params = SamplingParams {
            temperature: self.temperature,
            max_tokens: case.max_tokens,
        };
        let stream = mode == BenchmarkMode::Streaming;
        let request = encode_chat_request(&self.model, &messages, params, stream, None);

        if !stream {
            let start = Instant::now();
            let response = self.transport.send_chat(&request).await?;
            let total_time = start.elapsed();
            let completion = decode_chat_response(response)?;
            if completion.usage.is_none() {
                tracing::warn!(case = %case.name, "response carried no usage; counting 0 tokens");
            }
            return Ok(completion_sample(&completion, total_time));
        }

        let mut measurement = StreamMeasurement::new(Instant::now());
        let mut events = self.transport.open_stream(&request).await?;
        while let Some(event) = events.next().await {
            measurement.observe(&event?, Instant::now());
        }
        let sample = measurement.finish(Instant::now());
        if sample.ttft == Some(Ttft::NoFragment) {
            tracing::warn!(
                case = %case.name,
                chunks = sample.chunk_count,
                "stream produced no text; TTFT is invalid for this run"
            );
        }
        Ok(sample)
    }
}
