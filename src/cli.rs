use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "vajra",
    about = "Grounded legal answers from the BNS, BSA and BNSS"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Path to a config.toml (defaults to <data dir>/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Embed corpus entries and write their vector indices
    Build(BuildArgs),
    /// Answer a legal question grounded in the corpora
    Ask(AskArgs),
    /// Show the sections retrieved for a query, without generating
    Search(SearchArgs),
    /// Find sections whose title or description contains a term
    Find(FindArgs),
    /// Show configured corpora and models
    Status(StatusArgs),
    /// Interactive question-and-answer session
    Chat,
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Build --

#[derive(Debug, Parser)]
pub struct BuildArgs {
    /// Build only this corpus
    #[arg(short = 'c', long)]
    pub corpus: Option<String>,
}

// -- Ask --

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question, in any language
    pub query: String,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Results per corpus (defaults to retrieval.top_k)
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Find --

#[derive(Debug, Parser)]
pub struct FindArgs {
    /// Case-insensitive substring to look for
    pub term: String,

    /// Search only within this corpus
    #[arg(short = 'c', long)]
    pub corpus: Option<String>,

    /// Maximum matches shown per corpus
    #[arg(short = 'n', long, default_value = "5")]
    pub limit: usize,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "vajra",
            &mut std::io::stdout(),
        );
    }
}

// -- Chat --

/// One line typed into the interactive `chat` session.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatCommand<'a> {
    Empty,
    Quit,
    Help,
    Sections,
    Examples,
    /// `find <term>` or its alias `search <term>`.
    Find(&'a str),
    Ask(&'a str),
}

impl<'a> ChatCommand<'a> {
    pub fn parse(line: &'a str) -> Self {
        let input = line.trim();
        let (head, rest) = input
            .split_once(char::is_whitespace)
            .map_or((input, ""), |(head, rest)| (head, rest.trim()));

        match head.to_lowercase().as_str() {
            "" => Self::Empty,
            "quit" | "exit" if rest.is_empty() => Self::Quit,
            "help" if rest.is_empty() => Self::Help,
            "sections" if rest.is_empty() => Self::Sections,
            "examples" if rest.is_empty() => Self::Examples,
            "find" | "search" if !rest.is_empty() => Self::Find(rest),
            _ => Self::Ask(input),
        }
    }
}
