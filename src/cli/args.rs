//! CLI argument parsing using clap.
//!
//! Contains the Cli struct, Commands enum, and shared argument groups.

use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

const AFTER_HELP: &str = "\
Quick Start:
  $ querydoc init                              # Create .querydoc/settings.toml
  $ querydoc index extracted/report.json       # Build the index for one document
  $ querydoc search --doc report \"sample size\" # Ranked passages, no language model
  $ querydoc ask --doc report \"What was measured?\"
  $ querydoc ask --all \"Which study used a control group?\"
  $ querydoc serve --all                       # POST /ask on 127.0.0.1:8000";

/// Question answering over extracted documents
#[derive(Parser, Debug)]
#[command(
    name = "querydoc",
    version = env!("CARGO_PKG_VERSION"),
    about = "Question answering over documents with coarse-to-fine retrieval",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = AFTER_HELP
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .querydoc directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration
    #[command(about = "Display active settings")]
    Config,

    /// Index one extracted document
    #[command(about = "Build (or reuse) the section and chunk index for a document")]
    Index {
        /// Extraction record: JSON with file_path, toc and pages_text
        #[arg(value_name = "EXTRACTED_JSON")]
        input: PathBuf,

        /// Rebuild even if a current index exists
        #[arg(short, long)]
        force: bool,

        /// Indexing deadline in seconds (overrides config)
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Number of embedding threads (overrides config)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Disable the progress spinner
        #[arg(long)]
        no_progress: bool,
    },

    /// Retrieve passages without calling the language model
    #[command(about = "Show ranked passages for a question")]
    Search(QueryArgs),

    /// Answer a question from indexed documents
    #[command(about = "Answer a question with citations")]
    Ask(QueryArgs),

    /// Serve question answering over HTTP
    #[command(about = "Answer questions via POST /ask until Ctrl+C")]
    Serve(ServeArgs),

    /// List indexed documents
    #[command(about = "List documents with a stored index")]
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Delete a document's index
    #[command(about = "Delete the stored index of a document")]
    Delete {
        /// Document id or extracted file name
        document: String,
    },
}

/// Which indexed documents a query runs against.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct QueryTarget {
    /// Document id or extracted file name
    #[arg(short, long, value_name = "DOCUMENT")]
    pub doc: Option<String>,

    /// Query every indexed document together
    #[arg(long)]
    pub all: bool,
}

/// Retrieval overrides shared by query commands.
#[derive(Args, Debug, Clone, Default)]
pub struct RetrievalArgs {
    /// Skip the section stage and rank every chunk
    #[arg(long)]
    pub no_coarse: bool,

    /// Sections kept by the coarse stage (overrides config)
    #[arg(long)]
    pub k_sections: Option<usize>,

    /// Passages kept by the fine stage (overrides config)
    #[arg(long)]
    pub k_chunks: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    #[command(flatten)]
    pub target: QueryTarget,

    /// The question
    pub question: String,

    #[command(flatten)]
    pub retrieval: RetrievalArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub target: QueryTarget,

    #[command(flatten)]
    pub retrieval: RetrievalArgs,

    /// Listen address (overrides config)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}
