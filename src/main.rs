use anyhow::Result;
use clap::{Parser, Subcommand};

use imgbench::batch::{self, BatchArgs};
use imgbench::bench::{self, SweepArgs};

#[derive(Parser)]
#[command(name = "imgbench", about = "Encode and compress benchmarks for raw image buffers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sweep encoder qualities/flags and compressor levels over one buffer
    Sweep(SweepArgs),

    /// Encode and compress every file of a directory on a worker pool
    Batch(BatchArgs),
}

fn main() -> Result<()> {
    // stdout carries the report rows, logs go to stderr
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Sweep(args) => bench::run(args),
        Command::Batch(args) => batch::run(args),
    }
}
