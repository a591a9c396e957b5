//! Minimal refinement example: a short run from zero to a final answer.
//!
//! Seeds a dialogue, drives three improvement rounds against OpenRouter,
//! and prints the final answer along with the token total.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... cargo run --example basic_run
//! ```

use whet_rs::prelude::*;

#[tokio::main]
async fn main() -> Result<(), String> {
    // 1. Create the OpenRouter client.
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "Set OPENROUTER_KEY env var to your OpenRouter API key")?;
    let client = OpenRouterClient::new(api_key)?;

    // 2. Configure the run: model, refinement instruction, and round count.
    let config =
        RefinerConfig::new("openai/gpt-4o-mini", "Thank you, but make it better.").with_rounds(3);

    // 3. Seed the dialogue and drive the refinement loop.
    let history = DialogueHistory::new(
        "You are a helpful AI assistant.",
        "Write a limerick about borrow checking.",
    );

    let summary = Refiner::new(&client, config)
        .with_event_handler(&LoggingHandler)
        .run(history)
        .await;

    // 4. Print results.
    if let Some(answer) = summary.final_answer.as_deref() {
        println!("\n{answer}");
    }
    println!(
        "\n--- {}/{} rounds | {} tokens ---",
        summary.rounds_completed, summary.rounds_requested, summary.total_cost
    );

    if let Some(failure) = &summary.failure {
        return Err(format!("run stopped early: {failure}"));
    }
    Ok(())
}
