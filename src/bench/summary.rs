use std::time::Duration;

use serde::Serialize;

use super::sample::{serialize_secs, BenchmarkSample};
use super::RunOutcome;

/// Aggregate over the completed repetitions of one case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkSummary {
    pub completed: usize,
    pub failed: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub mean_total_time: Duration,
    pub mean_tokens_per_second: f64,
    pub mean_generated_tokens: f64,
    /// Mean over valid measurements only; zero when `ttft_valid` is zero.
    #[serde(serialize_with = "serialize_secs")]
    pub mean_ttft: Duration,
    /// Repetitions that observed a first fragment.
    pub ttft_valid: usize,
    /// Repetitions that measured TTFT at all (streaming ones).
    pub ttft_measured: usize,
}

impl BenchmarkSummary {
    #[must_use]
    pub fn from_outcomes(outcomes: &[RunOutcome]) -> Self {
        let samples: Vec<&BenchmarkSample> = outcomes.iter().filter_map(RunOutcome::sample).collect();
        let mut summary = Self::from_samples(samples.iter().copied());
        summary.failed = outcomes.len() - samples.len();
        summary
    }

    #[must_use]
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a BenchmarkSample>) -> Self {
        let mut completed = 0usize;
        let mut total_secs = 0.0;
        let mut tps_sum = 0.0;
        let mut tokens_sum = 0.0;
        let mut ttft_secs = 0.0;
        let mut ttft_valid = 0usize;
        let mut ttft_measured = 0usize;

        for sample in samples {
            completed += 1;
            total_secs += sample.total_time.as_secs_f64();
            tps_sum += sample.tokens_per_second;
            tokens_sum += sample.generated_tokens as f64;
            if let Some(ttft) = sample.ttft {
                ttft_measured += 1;
                if let Some(elapsed) = ttft.measured() {
                    ttft_valid += 1;
                    ttft_secs += elapsed.as_secs_f64();
                }
            }
        }

        Self {
            completed,
            failed: 0,
            mean_total_time: Duration::from_secs_f64(mean(total_secs, completed)),
            mean_tokens_per_second: mean(tps_sum, completed),
            mean_generated_tokens: mean(tokens_sum, completed),
            mean_ttft: Duration::from_secs_f64(mean(ttft_secs, ttft_valid)),
            ttft_valid,
            ttft_measured,
        }
    }

    #[must_use]
    pub fn has_valid_ttft(&self) -> bool {
        self.ttft_valid > 0
    }
}

fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::Ttft;
    use crate::error::ClientError;

    fn sample(ttft: Option<Ttft>, total_ms: u64, tokens: u64, tps: f64) -> BenchmarkSample {
        BenchmarkSample {
            ttft,
            total_time: Duration::from_millis(total_ms),
            generated_tokens: tokens,
            tokens_per_second: tps,
            prompt_tokens: Some(10),
            response_chars: 0,
            chunk_count: 0,
            content_events: 0,
        }
    }

    fn approx(left: f64, right: f64) -> bool {
        (left - right).abs() < 1e-6
    }

    #[test]
    fn test_ttft_mean_ignores_invalid_measurements() {
        let outcomes = vec![
            RunOutcome::Completed(sample(Some(Ttft::Measured(Duration::from_millis(200))), 1000, 10, 10.0)),
            RunOutcome::Completed(sample(Some(Ttft::NoFragment), 1000, 0, 0.0)),
            RunOutcome::Completed(sample(Some(Ttft::Measured(Duration::from_millis(400))), 2000, 20, 10.0)),
        ];
        let summary = BenchmarkSummary::from_outcomes(&outcomes);
        assert_eq!(summary.ttft_valid, 2);
        assert_eq!(summary.ttft_measured, 3);
        assert!(approx(summary.mean_ttft.as_secs_f64(), 0.3));
        assert!(approx(summary.mean_total_time.as_secs_f64(), 4.0 / 3.0));
        assert!(approx(summary.mean_generated_tokens, 10.0));
        assert!(approx(summary.mean_tokens_per_second, 20.0 / 3.0));
    }

    #[test]
    fn test_no_valid_ttft_reports_zero_with_indicator() {
        let outcomes = vec![
            RunOutcome::Completed(sample(Some(Ttft::NoFragment), 500, 0, 0.0)),
            RunOutcome::Completed(sample(Some(Ttft::NoFragment), 700, 0, 0.0)),
        ];
        let summary = BenchmarkSummary::from_outcomes(&outcomes);
        assert!(!summary.has_valid_ttft());
        assert_eq!(summary.mean_ttft, Duration::ZERO);
    }

    #[test]
    fn test_failed_repetitions_are_counted_not_averaged() {
        let outcomes = vec![
            RunOutcome::Completed(sample(None, 2000, 50, 25.0)),
            RunOutcome::Failed(ClientError::Connection("refused".into())),
        ];
        let summary = BenchmarkSummary::from_outcomes(&outcomes);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert!(approx(summary.mean_tokens_per_second, 25.0));
        assert_eq!(summary.ttft_measured, 0);
    }

    #[test]
    fn test_all_failed_yields_zero_means() {
        let outcomes = vec![RunOutcome::Failed(ClientError::Cancelled)];
        let summary = BenchmarkSummary::from_outcomes(&outcomes);
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.mean_total_time, Duration::ZERO);
        assert_eq!(summary.mean_tokens_per_second, 0.0);
    }
}
