//! # docrag
//!
//! Ask questions about your own documents.
//!
//! Usage:
//!   docrag index handbook.pdf notes.md   # Index up to MAX_DOCUMENTS files
//!   docrag query "What is the refund policy?"
//!   docrag --entities query "Who signed the contract?" --json
//!   docrag console                       # Interactive session

mod console;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docrag::{QueryEngine, ResetReport, Settings, Status};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docrag", version, about = "Question answering over your documents")]
struct Cli {
    /// Attach named entities from the query and retrieved chunks to answers
    #[arg(long, global = true)]
    entities: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index PDF, text, markdown or HTML files
    Index {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Answer a question from the indexed documents
    Query {
        text: String,

        /// Number of chunks to retrieve (defaults to TOP_K)
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
    /// Remove every indexed document
    Reset,
    /// Show the number of stored chunks
    Stats,
    /// Interactive question-and-answer session
    Console,
}

fn init_tracing(verbose: bool) {
    let filter =
        if verbose { "docrag=debug,docrag_cli=debug" } else { "docrag=info,docrag_cli=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::load().context("failed to load settings")?;
    let engine = QueryEngine::from_settings(&settings, cli.entities)
        .await
        .context("failed to start query engine")?;

    match cli.command {
        Command::Index { files } => index(&engine, &files, settings.max_documents).await?,
        Command::Query { text, top_k, json } => {
            let response = engine.query(&text, top_k.unwrap_or(settings.rag.top_k)).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print!("{}", render::response(&response));
            }
        }
        Command::Reset => println!("{}", reset_message(engine.reset_index().await)?),
        Command::Stats => {
            let stats = engine.stats().await?;
            println!("{}", render::stats(&stats));
        }
        Command::Console => console::run(&engine, &settings).await?,
    }

    Ok(())
}

async fn index(engine: &QueryEngine, files: &[PathBuf], max_documents: usize) -> Result<()> {
    if files.len() > max_documents {
        warn!(
            requested = files.len(),
            max_documents,
            "too many files, only the first {max_documents} will be indexed"
        );
    }

    for file in files.iter().take(max_documents) {
        let report = engine.index_document(file, None).await;
        println!("{}", render::index_report(&report));
    }

    let stats = engine.stats().await?;
    println!("Total documents in store: {}", stats.count);
    Ok(())
}

/// The message of a successful reset; a failed one becomes the command's error.
fn reset_message(report: ResetReport) -> Result<String> {
    match report.status {
        Status::Success => Ok(report.message),
        Status::Error => bail!("{}", report.message),
    }
}
