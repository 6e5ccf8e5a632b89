use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::cache::DEFAULT_MAX_ENTRIES;

/// Ask questions about PubMed abstracts, or translate them into Dutch.
///
/// Configuration via environment variables:
/// - `OPENAI_API_KEY`: required for `ask` and `translate`
/// - `OPENAI_MODEL`: chat model (default: gpt-4)
/// - `OPENAI_BASE_URL`: OpenAI-compatible API base (default: https://api.openai.com/v1)
#[derive(Parser, Debug)]
#[command(name = "pmqa", version)]
pub struct Cli {
    #[command(flatten)]
    pub opts: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct GlobalOpts {
    /// Cache file holding abstracts, answers and translations
    #[arg(long, env = "PMQA_CACHE", default_value = "pmqa_cache.json", global = true)]
    pub cache: PathBuf,

    /// Keep the cache in memory only for this run
    #[arg(long, global = true)]
    pub no_cache_file: bool,

    /// Entries kept per cache partition before the oldest are evicted (0 = unbounded)
    #[arg(long, default_value_t = DEFAULT_MAX_ENTRIES, global = true)]
    pub max_entries: usize,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 300, global = true)]
    pub timeout: u64,

    /// Print the result as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer a question using the abstracts of the given PMIDs
    Ask(AskArgs),
    /// Translate the abstracts of the given PMIDs into Dutch
    Translate(TranslateArgs),
    /// Only fetch and show the combined abstracts
    Abstracts(PmidArgs),
}

#[derive(Args, Debug)]
pub struct PmidArgs {
    /// Comma-separated PMIDs, e.g. "31452104, 30318529"
    #[arg(short, long)]
    pub pmids: String,
}

#[derive(Args, Debug)]
pub struct AskArgs {
    /// Comma-separated PMIDs, e.g. "31452104, 30318529"
    #[arg(short, long)]
    pub pmids: String,

    /// Question about the abstracts
    #[arg(short, long)]
    pub question: String,
}

#[derive(Args, Debug)]
pub struct TranslateArgs {
    /// Comma-separated PMIDs, e.g. "31452104, 30318529"
    #[arg(short, long)]
    pub pmids: String,

    /// Fail instead of embedding a placeholder when an abstract cannot be translated
    #[arg(long)]
    pub strict: bool,
}
