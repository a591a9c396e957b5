//! Command-line entry point for iterative answer refinement.
//!
//! Seeds a dialogue with a system prompt and a task, then repeatedly asks
//! the model to improve its previous answer. The dialogue is kept inside a
//! context budget by evicting the oldest exchanges, so the loop can run for
//! hundreds of rounds without outgrowing the model. Completed exchanges
//! stream into `<log-dir>/conversation.jsonl`; warnings and errors land in
//! `<log-dir>/error.log`.
//!
//! Requires the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Refine the default task for five rounds
//! whet --rounds 5
//!
//! # Custom task and refinement instruction
//! whet --task "Write a haiku about spring." \
//!   --instruction "Thank you, but make it better." \
//!   --rounds 20
//!
//! # Tight budget with a word-based size metric, keeping the final answer
//! whet --max-context 2000 --reserve-output 500 --metric words \
//!   --save-final answer.md
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use whet_rs::DEFAULT_MODEL;
use whet_rs::agent::config::{DEFAULT_INSTRUCTION, DEFAULT_SYSTEM_PROMPT, DEFAULT_TASK};
use whet_rs::prelude::*;

/// Iteratively refine a model's answer to a task within a context budget.
#[derive(Parser)]
#[command(name = "whet")]
struct Cli {
    // ── Prompts ──────────────────────────────────────────────────
    /// Task posed to the model in the opening user turn
    #[arg(long, default_value = DEFAULT_TASK)]
    task: String,

    /// Refinement instruction repeated every round
    #[arg(long, default_value = DEFAULT_INSTRUCTION)]
    instruction: String,

    /// System prompt that opens the dialogue
    #[arg(long, default_value = DEFAULT_SYSTEM_PROMPT)]
    system_prompt: String,

    // ── Model and sampling ───────────────────────────────────────
    /// Model identifier to request completions from
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    // ── Rounds and budget ────────────────────────────────────────
    /// Number of refinement rounds to run
    #[arg(long, default_value_t = 100)]
    rounds: u32,

    /// Total context window the model accepts, in metric units
    #[arg(long, default_value_t = 128_000)]
    max_context: usize,

    /// Share of the window reserved for the generated reply
    #[arg(long, default_value_t = 16_000)]
    reserve_output: usize,

    /// Extra input allowance held back to absorb estimation error
    #[arg(long, default_value_t = 1_000)]
    safety_margin: usize,

    /// Size metric used for budget enforcement
    #[arg(long, value_enum, default_value = "tokens")]
    metric: Metric,

    // ── Retry policy ─────────────────────────────────────────────
    /// Attempts per request before the run gives up
    #[arg(long, default_value_t = 3)]
    attempts: u32,

    /// Delay between retries, in milliseconds
    #[arg(long, default_value_t = 1_000)]
    backoff_ms: u64,

    // ── Output ───────────────────────────────────────────────────
    /// Directory for the conversation transcript and error log
    #[arg(long, default_value = "log")]
    log_dir: PathBuf,

    /// Write the final answer to this file when the run ends
    #[arg(long)]
    save_final: Option<PathBuf>,

    /// Suppress the progress bar
    #[arg(long)]
    no_progress: bool,
}

/// How dialogue size is measured against the budget.
#[derive(Clone, Copy, clap::ValueEnum)]
enum Metric {
    /// Heuristic token estimate derived from character count
    Tokens,
    /// Whitespace-separated word count
    Words,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let api_key = match std::env::var("OPENROUTER_KEY") {
        Ok(key) => key,
        Err(_) => {
            eprintln!("Error: OPENROUTER_KEY environment variable is not set");
            std::process::exit(1);
        }
    };

    let file_log = match FileLogLayer::new(&cli.log_dir) {
        Ok(layer) => layer,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    tracing_subscriber::registry().with(file_log).init();

    let client = match OpenRouterClient::new(api_key) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: failed to create API client: {e}");
            std::process::exit(1);
        }
    };

    let transcript = match TranscriptWriter::new(&cli.log_dir) {
        Ok(writer) => writer,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let config = RefinerConfig {
        model: cli.model,
        rounds: cli.rounds,
        temperature: cli.temperature,
        instruction: cli.instruction,
        budget: BudgetPolicy::new(cli.max_context, cli.reserve_output)
            .with_safety_margin(cli.safety_margin),
        retry: RetryConfig::with_attempts(cli.attempts)
            .with_backoff(Duration::from_millis(cli.backoff_ms)),
    };

    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(transcript)
        .with_opt((!cli.no_progress).then(|| ProgressHandler::new(cli.rounds)));
    let analyzer = DeltaAnalyzer;

    let refiner = Refiner::new(&client, config)
        .with_event_handler(&handler)
        .with_analyzer(&analyzer);
    let refiner = match cli.metric {
        Metric::Tokens => refiner,
        Metric::Words => refiner.with_size_metric(WordCount),
    };

    let history = DialogueHistory::new(&cli.system_prompt, &cli.task);
    let summary = refiner.run(history).await;

    if let Some(answer) = summary.final_answer.as_deref() {
        println!("{answer}");
        if let Some(path) = &cli.save_final {
            match std::fs::write(path, answer) {
                Ok(()) => eprintln!("Final answer saved to {}", path.display()),
                Err(e) => eprintln!("Error: failed to write {}: {e}", path.display()),
            }
        }
    }

    if let Some(failure) = &summary.failure {
        eprintln!(
            "Run stopped after {} of {} rounds: {failure}",
            summary.rounds_completed, summary.rounds_requested
        );
        std::process::exit(1);
    }
}
