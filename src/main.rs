//! # Archive QA CLI (`aqa`)
//!
//! Command-line interface to the archive question-answering service.
//!
//! ## Usage
//!
//! ```bash
//! aqa --config ./config/aqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `aqa init` | Create the SQLite database and run schema migrations |
//! | `aqa ask "<question>"` | Answer one question and print the response JSON |
//! | `aqa classify "<question>"` | Print the classifier output for a question |
//! | `aqa serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! aqa init --config ./config/aqa.toml
//!
//! # Ask a question, continuing an existing conversation
//! aqa ask "Who flew with Epstein and Maxwell in 1999?" --session 6f1c2a9e-demo
//!
//! # Inspect how a question is classified (no config needed)
//! aqa classify "When did Jeffrey Epstein die?"
//!
//! # Serve POST /api/ask
//! aqa serve --config ./config/aqa.toml
//! ```

use std::path::PathBuf;

use archive_qa::{ask, config, logging, migrate, server};
use clap::{Parser, Subcommand};

/// Archive QA: retrieval-augmented question answering over an archive of
/// OCR'd documents and flight manifests.
#[derive(Parser)]
#[command(
    name = "aqa",
    about = "Archive QA: grounded question answering over a document archive",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/aqa.toml")]
    config: PathBuf,

    /// Log filter (e.g. `debug`, `archive_qa=trace`). Overrides `RUST_LOG`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, the archive and conversation tables,
    /// and the full-text indexes. Safe to run repeatedly.
    Init,

    /// Answer a question and print the response as JSON.
    Ask {
        /// The question text.
        question: String,

        /// Continue an existing session instead of starting a new one.
        #[arg(long)]
        session: Option<String>,
    },

    /// Show how a question is classified: keywords, synonyms, intent, subject.
    Classify {
        /// The question text.
        question: String,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.as_deref())?;

    // Commands that don't require config
    if let Commands::Classify { question } = &cli.command {
        return ask::run_classify(question);
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ask { question, session } => {
            ask::run_ask(&cfg, &question, session).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Classify { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
