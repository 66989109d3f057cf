//! # Code Harness CLI (`chx`)
//!
//! The `chx` binary answers questions about a building-code corpus that has
//! already been ingested into SQLite. It provides commands for retrieval-only
//! search, full question answering and direct section lookup.
//!
//! ## Usage
//!
//! ```bash
//! chx --config ./config/chx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chx search "<query>"` | Ranked hits, no generation |
//! | `chx query "<question>"` | Answer with citations and references |
//! | `chx section <number>` | One section with parent, children and references |
//! | `chx completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Hybrid search (vector + keyword, fused with RRF)
//! chx search "sprinkler spacing" --config ./config/chx.toml
//!
//! # Vector-only search
//! chx search "egress width" --mode vector
//!
//! # Answer a question as JSON
//! chx query "What does section 101 cover?" --json
//!
//! # Look up a section in chapter 3
//! chx section 303.1 --chapter 3
//! ```
//!
//! Logs go to stderr. Set `CHX_LOG` (e.g. `CHX_LOG=code_harness=debug`) to
//! change the level; the default is `warn`.

mod config;
mod db;
mod embedding;
mod generation;
mod harness;
mod query;
mod search;
mod section;
mod sqlite_store;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Code Harness CLI: retrieval and context assembly over a building-code corpus.
///
/// All commands except `completions` read a TOML configuration file given
/// by `--config`. See `config/chx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "chx",
    about = "Code Harness: grounded answers over a building-code corpus",
    version,
    long_about = "Code Harness retrieves sections, tables and figures from an ingested \
    building-code corpus with hybrid search, expands them with their hierarchy and \
    cross-references, and answers questions with citations."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/chx.toml`.
    #[arg(long, global = true, default_value = "./config/chx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Search the corpus without generating an answer.
    ///
    /// Prints ranked hits with their score, section number and an excerpt.
    Search {
        /// The search query.
        query: String,

        /// Search mode: `hybrid` or `vector`.
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Maximum number of results. Defaults to `retrieval.max_hits`.
        #[arg(long)]
        limit: Option<usize>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question with citations.
    ///
    /// Runs retrieval, reference resolution and context expansion, then
    /// generates an answer. Falls back to the text of the top hits when
    /// no generation provider is configured or it fails.
    Query {
        /// The question.
        question: String,

        /// Search mode: `hybrid` or `vector`.
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Maximum number of hits. Defaults to `retrieval.max_hits`.
        #[arg(long)]
        max_hits: Option<usize>,

        /// Skip ancestor/descendant expansion.
        #[arg(long)]
        no_context: bool,

        /// Skip cross-reference resolution.
        #[arg(long)]
        no_references: bool,

        /// Print the full result as JSON instead of Markdown.
        #[arg(long)]
        json: bool,
    },

    /// Show one section by number.
    Section {
        /// Section number, e.g. `101.1`.
        number: String,

        /// Restrict the lookup to one chapter.
        #[arg(long)]
        chapter: Option<i64>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell. Detected from `$SHELL` when omitted.
        #[arg(value_enum)]
        shell: Option<Shell>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CHX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        let shell = shell.unwrap_or_else(|| Shell::from_env().unwrap_or(Shell::Bash));
        let mut cmd = Cli::command();
        let bin_name = cmd.get_name().to_string();
        clap_complete::generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Search {
            query,
            mode,
            limit,
            json,
        } => {
            search::run_search(&cfg, &query, &mode, limit, json).await?;
        }
        Commands::Query {
            question,
            mode,
            max_hits,
            no_context,
            no_references,
            json,
        } => {
            let args = query::QueryArgs {
                mode,
                max_hits,
                no_context,
                no_references,
                json,
            };
            query::run_query(&cfg, &question, &args).await?;
        }
        Commands::Section {
            number,
            chapter,
            json,
        } => {
            section::run_section(&cfg, &number, chapter, json).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
