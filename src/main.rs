// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use tokio::sync::watch;

use doctrans::app_config::{Config, LogLevel, ProviderKind};
use doctrans::jobs::{JobState, Orchestrator};

/// CLI wrapper for ProviderKind to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliProvider {
    Ollama,
    OpenAI,
    Anthropic,
    Mock,
}

impl From<CliProvider> for ProviderKind {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Ollama => ProviderKind::Ollama,
            CliProvider::OpenAI => ProviderKind::OpenAI,
            CliProvider::Anthropic => ProviderKind::Anthropic,
            CliProvider::Mock => ProviderKind::Mock,
        }
    }
}

/// CLI wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli: CliLogLevel) -> Self {
        match cli {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run worker processes that pull and translate queued jobs
    Worker {
        /// Number of concurrent worker loops
        #[arg(short = 'n', long, default_value_t = 1)]
        workers: usize,
    },

    /// Submit a document for translation and print the job id
    Submit {
        /// Input document file
        #[arg(value_name = "INPUT_FILE")]
        input: PathBuf,

        /// Source language code (e.g., 'en', 'ja')
        #[arg(short, long)]
        source_language: String,

        /// Target language code (e.g., 'en', 'ja')
        #[arg(short, long)]
        target_language: String,

        /// Translation provider to use
        #[arg(short, long, value_enum)]
        provider: Option<CliProvider>,

        /// Model name to use for translation
        #[arg(short, long)]
        model: Option<String>,

        /// Watch progress events until the job reaches a terminal state
        #[arg(short, long)]
        wait: bool,
    },

    /// Show the authoritative record of a job
    Status {
        /// Job id
        job_id: String,
    },

    /// List jobs, optionally filtered by state
    List {
        /// Only show jobs in this state
        #[arg(short, long)]
        state: Option<String>,
    },

    /// Request cancellation of a pending or processing job
    Cancel {
        /// Job id
        job_id: String,
    },

    /// Delete a terminal job and its artifacts
    Delete {
        /// Job id
        job_id: String,
    },

    /// Write the translated document of a completed job to a file
    Fetch {
        /// Job id
        job_id: String,

        /// Output path
        #[arg(short, long, value_name = "OUTPUT_FILE")]
        output: PathBuf,
    },
}

/// doctrans - layout-preserving document translation
///
/// Translates paginated documents between languages while preserving the
/// original layout. Submissions are tracked as durable jobs processed by
/// worker loops.
#[derive(Parser, Debug)]
#[command(name = "doctrans")]
#[command(version = "0.3.0")]
#[command(about = "Layout-preserving document translation with durable jobs")]
#[command(long_about = "doctrans translates paginated documents while keeping their layout.

EXAMPLES:
    doctrans worker -n 4                             # Run four worker loops
    doctrans submit paper.json -s en -t ja --wait    # Submit and watch
    doctrans submit paper.json -s en -t ja -p openai -m gpt-4o-mini
    doctrans status 3f2a...                          # Authoritative record
    doctrans fetch 3f2a... -o paper.ja.json          # Download the result

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a
    different config file with --config. If the config file doesn't exist,
    a default one will be created automatically.

SUPPORTED PROVIDERS:
    ollama    - Local Ollama server
    openai    - OpenAI API (requires API key)
    anthropic - Anthropic Claude API (requires API key)
    mock      - In-process echo backend for dry runs")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger { level }))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S%.3f");
            let color = match record.level() {
                Level::Error => "\x1B[1;31m",
                Level::Warn => "\x1B[1;33m",
                Level::Info => "\x1B[1;32m",
                _ => "\x1B[0;37m",
            };
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "{}{} {}\x1B[0m", color, now, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let options = CommandLineOptions::parse();

    let config = Config::load_or_create(&options.config_path)?;

    let log_level = options
        .log_level
        .map(LogLevel::from)
        .unwrap_or(config.log_level);
    CustomLogger::init(log_level.to_level_filter())
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

    let orchestrator = Orchestrator::from_config(config)?;

    match options.command {
        Commands::Worker { workers } => run_workers(orchestrator, workers).await,
        Commands::Submit {
            input,
            source_language,
            target_language,
            provider,
            model,
            wait,
        } => {
            submit(
                orchestrator,
                input,
                &source_language,
                &target_language,
                provider.map(ProviderKind::from),
                model,
                wait,
            )
            .await
        }
        Commands::Status { job_id } => {
            let job = orchestrator
                .get_status(&job_id)
                .await?
                .ok_or_else(|| anyhow!("unknown job: {}", job_id))?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(())
        }
        Commands::List { state } => {
            let state = state.map(|s| s.parse::<JobState>()).transpose()?;
            for job in orchestrator.list_jobs(state).await? {
                println!(
                    "{}  {:10}  {} -> {}  attempts {}/{}",
                    job.id,
                    job.state.to_string(),
                    job.source_lang,
                    job.target_lang,
                    job.attempt_count,
                    job.max_attempts
                );
            }
            Ok(())
        }
        Commands::Cancel { job_id } => {
            if orchestrator.cancel(&job_id).await? {
                println!("cancellation requested for {}", job_id);
            } else {
                println!("job {} is unknown or already terminal", job_id);
            }
            Ok(())
        }
        Commands::Delete { job_id } => {
            if orchestrator.delete(&job_id).await? {
                println!("deleted {}", job_id);
            } else {
                println!("unknown job: {}", job_id);
            }
            Ok(())
        }
        Commands::Fetch { job_id, output } => {
            let bytes = orchestrator.fetch_output(&job_id).await?;
            std::fs::write(&output, &bytes)
                .with_context(|| format!("Failed to write output: {:?}", output))?;
            println!("wrote {} bytes to {:?}", bytes.len(), output);
            Ok(())
        }
    }
}

/// Run worker loops plus the lease sweeper until ctrl-c
async fn run_workers(orchestrator: Orchestrator, workers: usize) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::new();
    for _ in 0..workers.max(1) {
        let orchestrator = orchestrator.clone();
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(
            async move { orchestrator.run_worker(shutdown).await },
        ));
    }
    {
        let orchestrator = orchestrator.clone();
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            orchestrator.run_sweeper(shutdown).await
        }));
    }

    let failures = orchestrator.registry().check_all().await;
    for (kind, err) in failures {
        log::warn!("provider {} connectivity check failed: {}", kind, err);
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

/// Submit a document and optionally watch it to completion
async fn submit(
    orchestrator: Orchestrator,
    input: PathBuf,
    source_language: &str,
    target_language: &str,
    provider: Option<ProviderKind>,
    model: Option<String>,
    wait: bool,
) -> Result<()> {
    let bytes = std::fs::read(&input)
        .with_context(|| format!("Failed to read input file: {:?}", input))?;
    let provider = provider.unwrap_or(ProviderKind::Ollama);

    let job_id = orchestrator
        .submit(
            bytes.into(),
            source_language,
            target_language,
            provider,
            model,
        )
        .await?;
    println!("{}", job_id);

    if wait {
        let mut events = orchestrator.subscribe_job(&job_id);
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message("pending");

        loop {
            // Events are best-effort; the record is the truth we fall back
            // to between ticks.
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv()).await;
            let state = match event {
                Ok(Some(event)) => {
                    bar.set_message(event.state.to_string());
                    event.state
                }
                Ok(None) => break,
                Err(_) => match orchestrator.get_status(&job_id).await? {
                    Some(job) => {
                        bar.set_message(job.state.to_string());
                        job.state
                    }
                    None => break,
                },
            };
            if state.is_terminal() {
                let job = orchestrator
                    .get_status(&job_id)
                    .await?
                    .ok_or_else(|| anyhow!("job vanished: {}", job_id))?;
                bar.finish_with_message(format!(
                    "{}{}",
                    job.state,
                    job.error_detail
                        .map(|d| format!(": {}", d))
                        .unwrap_or_default()
                ));
                break;
            }
        }
    }

    Ok(())
}
