//! CLI entry point for the schema generator.
//!
//! Exit codes:
//! - 0: generation succeeded
//! - 1: parse or I/O failure (reported via anyhow)
//! - 2: argument validation error (clap handles this automatically)

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the schema description (CSDL XML or OpenAPI YAML).
    #[arg(long)]
    input: PathBuf,

    /// Directory to emit generated modules into (created if absent).
    #[arg(long)]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    msgraph_codegen::run(&cli.input, &cli.output)
}
