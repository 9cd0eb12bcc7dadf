use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use intake_assist::config::IntakeConfig;
use intake_assist::intake::{
    InMemoryStateStore, IntakeDeps, IntakeService, TurnOutcome, default_registry,
    load_registry_from_dir,
};
use intake_assist::llm::create_provider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = IntakeConfig::from_env().context("loading configuration")?;

    let registry = match &config.prompts_dir {
        Some(dir) => load_registry_from_dir(dir)
            .with_context(|| format!("loading stage prompts from {}", dir.display()))?,
        None => default_registry().context("building built-in stage registry")?,
    };

    eprintln!("Intake Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   Stages: {}", registry.len());
    eprintln!("   Type your answer and press Enter. q to quit.\n");

    let llm = create_provider(&config.llm_config())?;
    let deps = Arc::new(IntakeDeps::new(Arc::new(registry), llm, &config));
    let service = IntakeService::new(deps, Arc::new(InMemoryStateStore::new()));

    let session_id = service.create_session().await?;
    let opening = service.start_conversation(session_id).await?;
    if print_outcome(&opening) {
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text.eq_ignore_ascii_case("q") {
            break;
        }

        match service.advance_turn(session_id, text).await {
            Ok(outcome) => {
                if print_outcome(&outcome) {
                    break;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Turn failed, try again");
            }
        }
    }

    let status = service.session_status(session_id).await?;
    tracing::info!(
        turns = status.turns,
        input_tokens = status.usage.input_tokens,
        output_tokens = status.usage.output_tokens,
        cost = %status.estimated_cost,
        "Session closed"
    );
    Ok(())
}

/// Print replies (and a closing summary). Returns whether the session ended.
fn print_outcome(outcome: &TurnOutcome) -> bool {
    for result in &outcome.results {
        if !result.reply_text.is_empty() {
            println!("{}\n", result.reply_text);
        }
    }
    if let Some(summary) = &outcome.summary {
        println!("--- Summary ---\n{summary}\n");
    }
    if let Some(reason) = &outcome.summary_error {
        eprintln!("Summary unavailable: {reason}");
    }
    outcome.terminal
}
