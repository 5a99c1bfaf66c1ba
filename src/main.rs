//! partrescue - signature-based partition table recovery
//!
//! Scans disk images for lost partitions by their filesystem
//! signatures and backup sectors, rebuilds a consistent table, and can
//! write it back. The image is opened read-only unless writing is
//! requested explicitly.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use partrescue::cli::{self, Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(EnvFilter::from_default_env().add_directive("partrescue=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan(args) => cli::run_scan(&args, cli.verbose),
        Commands::Recover(args) => cli::run_recover(&args, cli.verbose),
        Commands::Show(args) => cli::run_show(&args),
    }
}
