//! CLI tool for running batch scripts against a spawned command.

use anyhow::Context;
use clap::{Parser, Subcommand};
use expectkit::script::BatchScript;
use expectkit::{BatchResult, RetentionPolicy, SessionBuilder};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "expectkit")]
#[command(author, version, about = "Drive interactive programs with batch scripts", long_about = None)]
struct Cli {
    /// Log engine activity (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Spawn COMMAND and run SCRIPT against it as one batch
    Run {
        /// Batch script file
        script: PathBuf,

        /// Default timeout in milliseconds
        #[arg(long, value_name = "MS")]
        timeout: Option<u64>,

        /// Strip ANSI escape sequences from the output
        #[arg(long)]
        strip_ansi: bool,

        /// Start each match after the previous one
        #[arg(long)]
        consume: bool,

        /// Command to spawn, after --
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Parse SCRIPT and list its entries without running anything
    Check {
        /// Batch script file
        script: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            script,
            timeout,
            strip_ansi,
            consume,
            command,
        } => run(script, timeout, strip_ansi, consume, command).await,
        Commands::Check { script } => check(script),
    }
}

async fn run(
    script: PathBuf,
    timeout: Option<u64>,
    strip_ansi: bool,
    consume: bool,
    command: Vec<String>,
) -> anyhow::Result<()> {
    let batch = BatchScript::from_file(&script)
        .with_context(|| format!("loading {}", script.display()))?;

    let mut builder = SessionBuilder::from_env().strip_ansi(strip_ansi);
    if let Some(ms) = timeout {
        builder = builder.timeout(Duration::from_millis(ms));
    }
    if consume {
        builder = builder.retention(RetentionPolicy::ConsumeMatched);
    }

    let session = builder
        .spawn_args(command.clone())
        .await
        .with_context(|| format!("spawning {}", command.join(" ")))?;

    let outcome = batch.run(&session).await;
    let results = match &outcome {
        Ok(results) => results.as_slice(),
        Err(failure) => failure.results.as_slice(),
    };
    for result in results {
        report(&batch, result);
    }

    session.close().await.context("closing session")?;

    match outcome {
        Ok(results) => {
            println!("ok: {} steps", results.len());
            Ok(())
        }
        Err(failure) => {
            if !failure.results.is_empty() {
                eprintln!("--- output ---\n{}", session.output());
            }
            Err(failure).context("script failed")
        }
    }
}

fn report(batch: &BatchScript, result: &BatchResult) {
    let kind = batch
        .entries()
        .get(result.index)
        .map(|entry| entry.kind())
        .unwrap_or("?");
    match &result.error {
        None if result.matched.is_empty() => println!("[{}] {}", result.index, kind),
        None => println!("[{}] {} matched {:?}", result.index, kind, result.matched),
        Some(err) => println!("[{}] {} FAILED: {}", result.index, kind, err),
    }
}

fn check(script: PathBuf) -> anyhow::Result<()> {
    let batch = BatchScript::from_file(&script)
        .with_context(|| format!("loading {}", script.display()))?;
    for (index, entry) in batch.entries().iter().enumerate() {
        println!("[{}] {:?}", index, entry);
    }
    Ok(())
}
