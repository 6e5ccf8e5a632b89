mod app;
mod cache;
mod cli;
mod llm;
mod normalize;
mod pubmed;
mod qa;
mod translate;

pub const USER_AGENT: &str = concat!("pmqa/", env!("CARGO_PKG_VERSION"));

use std::process::ExitCode;

use clap::Parser;
use cli::Cli;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("pmqa=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    info!(command = ?cli.command, "starting pmqa");

    match app::run(&cli).await {
        Ok(output) => {
            println!("{output}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            if let Some(hint) = e.hint() {
                eprintln!("hint: {hint}");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
