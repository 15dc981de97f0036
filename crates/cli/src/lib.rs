pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "souq",
    about = "Souq shopping assistant operator CLI",
    long_about = "Inspect configuration, manage the product index, query the catalog, and replay conversations without the HTTP server.",
    after_help = "Examples:\n  souq doctor --json\n  souq index --rebuild\n  souq search \"red shoes\" --top-k 3\n  souq chat \"أريد حذاء\" --language ar"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate config, catalog, index, transcript store and LLM readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Apply pending database migrations for the SQLite transcript store")]
    Migrate,
    #[command(about = "Load the persisted product index, rebuilding it when stale")]
    Index {
        #[arg(long, help = "Discard the persisted index and re-embed the whole catalog")]
        rebuild: bool,
    },
    #[command(about = "Run a semantic catalog search")]
    Search {
        query: String,
        #[arg(long, help = "Number of results (defaults to index.top_k)")]
        top_k: Option<usize>,
    },
    #[command(about = "Run one message through the conversation pipeline and print the reply")]
    Chat {
        text: String,
        #[arg(long, default_value = "cli")]
        user: String,
        #[arg(long, help = "Skip language detection and answer in this language (en, ar, ...)")]
        language: Option<String>,
    },
    #[command(about = "Show the most recent voice transcripts")]
    Transcripts {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    commands::init_logging();

    let result = match cli.command {
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Migrate => commands::migrate::run(),
        Command::Index { rebuild } => commands::index::run(rebuild),
        Command::Search { query, top_k } => commands::search::run(&query, top_k),
        Command::Chat { text, user, language } => {
            commands::chat::run(&text, &user, language.as_deref())
        }
        Command::Transcripts { limit } => commands::transcripts::run(limit),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
