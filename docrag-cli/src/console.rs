//! Interactive console.

use anyhow::Result;
use docrag::{QueryEngine, Settings};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::render;

const HISTORY_SHOWN: usize = 5;

const HELP: &str = "\
Commands:
  :index <path>   index a file
  :reset          remove every indexed document
  :stats          show the number of stored chunks
  :history        show recent queries
  :quit           leave the console
Anything else is answered as a question.";

pub async fn run(engine: &QueryEngine, settings: &Settings) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let mut queries: Vec<String> = Vec::new();

    println!("docrag console, collection '{}'. Type :help for commands.", engine.collection());
    if engine.entities_enabled() {
        println!("Entity extraction is on.");
    }

    loop {
        let line = match rl.readline("docrag> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        match line.split_once(char::is_whitespace).unwrap_or((line, "")) {
            (":quit" | ":exit", _) => break,
            (":help", _) => println!("{HELP}"),
            (":index", "") => println!("Usage: :index <path>"),
            (":index", path) => {
                let report = engine.index_document(path.trim(), None).await;
                println!("{}", render::index_report(&report));
            }
            (":reset", _) => println!("{}", engine.reset_index().await.message),
            (":stats", _) => match engine.stats().await {
                Ok(stats) => println!("{}", render::stats(&stats)),
                Err(e) => println!("Error: {e}"),
            },
            (":history", _) => println!("{}", render::history(&queries, HISTORY_SHOWN)),
            (command, _) if command.starts_with(':') => {
                println!("Unknown command {command}. Type :help for commands.")
            }
            _ => {
                let response = engine.query(line, settings.rag.top_k).await;
                queries.push(line.to_string());
                println!("{}", render::response(&response));
            }
        }
    }

    Ok(())
}
