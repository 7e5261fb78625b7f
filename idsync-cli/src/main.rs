//! idsync: deploy database scripts and rules to an identity tenant, with
//! automatic rollback on failure.
//!
//! # Usage
//!
//! ```text
//! idsync deploy --manifest <path> [--tenant <domain>] [--concurrency <n>] [--dry-run] [--json]
//! idsync rollback [--tenant <domain>]
//! idsync validate --manifest <path>
//! ```

mod commands;
mod gateway;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{deploy::DeployArgs, rollback::RollbackArgs, validate::ValidateArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "idsync",
    version,
    about = "Deploy custom database scripts and rules to an identity tenant",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply a manifest to the tenant, rolling back on any failure.
    Deploy(DeployArgs),

    /// Finish a rollback that a failed deployment could not complete.
    Rollback(RollbackArgs),

    /// Parse and check a manifest without contacting the tenant.
    Validate(ValidateArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let json = matches!(&cli.command, Commands::Deploy(args) if args.json);
    init_tracing(json);

    match cli.command {
        Commands::Deploy(args) => args.run(),
        Commands::Rollback(args) => args.run(),
        Commands::Validate(args) => args.run(),
    }
}

/// Log to stderr so stdout stays clean for reports. `RUST_LOG` overrides the
/// default `info` filter.
fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
