use std::fmt::Write as _;

use crate::bench::{BenchmarkMode, BenchmarkReport, LatencyProfiler, RunOutcome, Ttft};
use crate::config::{AppConfig, BenchmarkCase};
use crate::error::ClientError;

use super::{cancellable, print_banner, AppError};

const CUSTOM_CASE_NAME: &str = "Custom prompt";

/// Command-line overrides for a benchmark run.
#[derive(Debug, Clone, Default)]
pub struct BenchOptions {
    /// `None` runs both modes, non-streaming first.
    pub mode: Option<BenchmarkMode>,
    pub prompt: Option<String>,
    pub max_tokens: Option<u64>,
    pub repetitions: Option<usize>,
    pub json: bool,
}

impl BenchOptions {
    fn modes(&self) -> Vec<BenchmarkMode> {
        match self.mode {
            Some(mode) => vec![mode],
            None => vec![BenchmarkMode::NonStreaming, BenchmarkMode::Streaming],
        }
    }

    fn cases(&self, config: &AppConfig) -> Vec<BenchmarkCase> {
        if let Some(prompt) = &self.prompt {
            let max_tokens = self.max_tokens.unwrap_or(config.generation.max_tokens);
            return vec![BenchmarkCase::new(CUSTOM_CASE_NAME, prompt.as_str(), max_tokens)];
        }
        config
            .benchmark
            .cases
            .iter()
            .cloned()
            .map(|mut case| {
                if let Some(max_tokens) = self.max_tokens {
                    case.max_tokens = max_tokens;
                }
                case
            })
            .collect()
    }
}

/// One progress line for a finished repetition.
#[must_use]
pub fn format_run_line(index: usize, repetitions: usize, outcome: &RunOutcome) -> String {
    let prefix = format!("  Run {}/{repetitions}...", index + 1);
    let sample = match outcome {
        RunOutcome::Completed(sample) => sample,
        RunOutcome::Failed(err) => return format!("{prefix} failed: {err}"),
    };
    match sample.ttft {
        None => format!("{prefix} {:.1} tok/s", sample.tokens_per_second),
        Some(Ttft::Measured(ttft)) => format!(
            "{prefix} TTFT: {:.3}s, {:.1} tok/s",
            ttft.as_secs_f64(),
            sample.tokens_per_second
        ),
        Some(Ttft::NoFragment) => format!(
            "{prefix} TTFT: n/a ⚠️, {:.1} tok/s ({} chunks, no text received)",
            sample.tokens_per_second, sample.chunk_count
        ),
    }
}

/// The "Average" block printed after each case.
#[must_use]
pub fn format_summary(report: &BenchmarkReport) -> String {
    let summary = &report.summary;
    let mut out = String::from("\n  Average:");
    if summary.completed == 0 {
        let _ = write!(out, "\n    No completed runs ({} failed)", summary.failed);
        return out;
    }

    if report.mode == BenchmarkMode::Streaming {
        let ttft = summary.mean_ttft.as_secs_f64();
        if !summary.has_valid_ttft() {
            let _ = write!(
                out,
                "\n    Time to first token (TTFT): n/a (0/{} valid measurements)",
                summary.ttft_measured
            );
        } else if summary.ttft_valid < summary.ttft_measured {
            let _ = write!(
                out,
                "\n    Time to first token (TTFT): {ttft:.3}s ({}/{} valid measurements)",
                summary.ttft_valid, summary.ttft_measured
            );
        } else {
            let _ = write!(out, "\n    Time to first token (TTFT): {ttft:.3}s");
        }
    }
    let _ = write!(
        out,
        "\n    Total time: {:.3}s\n    Generated tokens: {:.1}\n    Throughput: {:.1} tokens/second",
        summary.mean_total_time.as_secs_f64(),
        summary.mean_generated_tokens,
        summary.mean_tokens_per_second
    );
    if summary.failed > 0 {
        let _ = write!(
            out,
            "\n    Failed runs: {}/{}",
            summary.failed,
            summary.failed + summary.completed
        );
    }
    out
}

/// Run the benchmark suite and print progress, or a JSON report.
///
/// # Errors
///
/// Returns configuration errors, [`ClientError::Cancelled`] on Ctrl-C, and
/// report encoding errors. Failed repetitions are reported, not raised.
pub async fn run_bench(config: &AppConfig, options: &BenchOptions) -> Result<(), AppError> {
    let repetitions = options.repetitions.unwrap_or(config.benchmark.repetitions);
    if repetitions == 0 {
        return Err(ClientError::Config("repetitions must be > 0".into()).into());
    }
    let cases = options.cases(config);
    let profiler = LatencyProfiler::from_config(config)?;
    let verbose = !options.json;

    if verbose {
        print_banner(&format!("{} Latency Benchmark", config.server.model()));
        println!("\nRunning benchmarks...");
    }

    let mut reports = Vec::new();
    for mode in options.modes() {
        if verbose {
            println!();
            print_banner(&format!("{} BENCHMARKS", mode.label()));
        }
        for case in &cases {
            if verbose {
                println!("\nTest: {} ({} max tokens)", case.name, case.max_tokens);
                println!("{}", "-".repeat(40));
            }
            let run = profiler.run(case, mode, repetitions, |index, outcome| {
                if verbose {
                    println!("{}", format_run_line(index, repetitions, outcome));
                }
            });
            let report = cancellable(async { Ok::<_, ClientError>(run.await) }).await?;
            if verbose {
                println!("{}", format_summary(&report));
            }
            reports.push(report);
        }
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!();
        print_banner("Benchmark complete!");
    }
    Ok(())
}
