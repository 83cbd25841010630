use clap::{Parser, Subcommand, ValueEnum};
use localchat_rs::app::bench::{run_bench, BenchOptions};
use localchat_rs::app::chat::run_chat;
use localchat_rs::app::models::run_models;
use localchat_rs::app::tools::run_tools;
use localchat_rs::app::AppError;
use localchat_rs::bench::BenchmarkMode;
use localchat_rs::config::{load_config, AppConfig, DEFAULT_CONFIG_PATH};
use localchat_rs::error::ClientError;
use localchat_rs::observability::init_tracing;

#[derive(Parser)]
#[command(name = "localchat")]
#[command(about = "Chat, benchmark and tool-calling client for a local OpenAI-compatible LLM server")]
#[command(version)]
struct Cli {
    /// Configuration file (default: localchat.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Override features.log_level (DEBUG, INFO, WARNING, ERROR, CRITICAL, DISABLED)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive streaming chat
    Chat,
    /// Interactive tool calling with the built-in tools
    Tools,
    /// Measure latency and throughput
    Bench {
        /// Which request mode to measure
        #[arg(long, value_enum, default_value = "both")]
        mode: ModeArg,
        /// Benchmark a single prompt instead of the configured suite
        #[arg(long)]
        prompt: Option<String>,
        /// Token budget per request
        #[arg(long)]
        max_tokens: Option<u64>,
        /// Repetitions per prompt
        #[arg(short = 'n', long)]
        repetitions: Option<usize>,
        /// Print reports as JSON instead of progress text
        #[arg(long)]
        json: bool,
    },
    /// List models served by the endpoint
    Models {
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Both,
    NonStreaming,
    Streaming,
}

impl ModeArg {
    fn mode(self) -> Option<BenchmarkMode> {
        match self {
            ModeArg::Both => None,
            ModeArg::NonStreaming => Some(BenchmarkMode::NonStreaming),
            ModeArg::Streaming => Some(BenchmarkMode::Streaming),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!(
            "Copy 'config.example.yaml' to '{DEFAULT_CONFIG_PATH}' or set LOCALCHAT_API_KEY and LOCALCHAT_MODEL."
        );
        std::process::exit(1);
    });

    let log_level = cli.log_level.as_deref().unwrap_or(&config.features.log_level);
    init_tracing(log_level);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        });

    if let Err(err) = runtime.block_on(run(cli.command, &config)) {
        match &err {
            AppError::Client(ClientError::Cancelled) => eprintln!("\nInterrupted."),
            AppError::Client(ClientError::Connection(_)) => {
                eprintln!("✗ {err}");
                eprintln!("\nMake sure the server is running at {}", config.server.base_url);
            }
            _ => eprintln!("✗ {err}"),
        }
        std::process::exit(1);
    }
}

async fn run(command: Command, config: &AppConfig) -> Result<(), AppError> {
    tracing::info!(
        base_url = %config.server.base_url,
        model = config.server.model(),
        "localchat starting"
    );
    match command {
        Command::Chat => run_chat(config).await,
        Command::Tools => run_tools(config).await,
        Command::Bench {
            mode,
            prompt,
            max_tokens,
            repetitions,
            json,
        } => {
            let options = BenchOptions {
                mode: mode.mode(),
                prompt,
                max_tokens,
                repetitions,
                json,
            };
            run_bench(config, &options).await
        }
        Command::Models { json } => run_models(config, json).await,
    }
}
