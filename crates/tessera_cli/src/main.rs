//! Tessera CLI
//!
//! Command-line migration tools for the Tessera adapter.
//!
//! # Commands
//!
//! - `migrate:create <name>` - Write an empty migration file
//! - `migrate` - Apply pending migrations as one batch
//! - `migrate:status` - List applied, pending and missing migrations
//! - `migrate:fresh` - Drop everything and re-apply all migrations
//! - `migrate:down` - Revert the latest batch
//! - `migrate:refresh` - Revert every batch, then migrate
//! - `migrate:reset` - Revert every batch

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tessera_core::{Adapter, AdapterConfig, AdapterResult, DestroyReport};
use tracing_subscriber::EnvFilter;

/// Tessera database migration tools.
#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Connection string, `<backend>:<location>`
    #[arg(global = true, short, long, default_value = "document:./data")]
    database: String,

    /// Directory holding migration files
    #[arg(global = true, short, long, default_value = "./migrations")]
    migrations_dir: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an empty migration file named with a timestamp prefix
    #[command(name = "migrate:create")]
    Create {
        /// Migration name, e.g. `add_index`
        name: String,
    },

    /// Apply all pending migrations as one batch
    Migrate,

    /// Show applied, pending and missing migrations
    #[command(name = "migrate:status")]
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Drop every collection and re-apply all migrations
    #[command(name = "migrate:fresh")]
    Fresh {
        /// Acknowledge that all data will be deleted
        #[arg(long)]
        force_accept_warning: bool,
    },

    /// Revert the latest batch
    #[command(name = "migrate:down")]
    Down,

    /// Revert every batch, then apply all migrations
    #[command(name = "migrate:refresh")]
    Refresh,

    /// Revert every batch
    #[command(name = "migrate:reset")]
    Reset,

    /// Show version information
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = AdapterConfig::from_url(&cli.database)?.migration_dir(&cli.migrations_dir);

    match cli.command {
        Commands::Create { name } => {
            // Writing a file needs no connection.
            let adapter = Adapter::new(config);
            commands::migrate::create(&adapter, &name)?;
        }
        Commands::Migrate => with_adapter(config, commands::migrate::run)?,
        Commands::Status { format } => {
            with_adapter(config, |adapter| commands::migrate::status(adapter, &format))?;
        }
        Commands::Fresh {
            force_accept_warning,
        } => with_adapter(config, |adapter| {
            commands::migrate::fresh(adapter, force_accept_warning)
        })?,
        Commands::Down => with_adapter(config, commands::migrate::down)?,
        Commands::Refresh => with_adapter(config, commands::migrate::refresh)?,
        Commands::Reset => with_adapter(config, commands::migrate::reset)?,
        Commands::Version => {
            println!("Tessera CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Tessera Core v{}", tessera_core::VERSION);
        }
    }

    Ok(())
}

/// Connects, runs `f`, then closes the adapter even if `f` failed.
fn with_adapter(
    config: AdapterConfig,
    f: impl FnOnce(&Adapter) -> Result<(), Box<dyn std::error::Error>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let adapter = Adapter::open(config)?;
    let result = f(&adapter);
    finish(result, adapter.destroy())
}

/// Combines a command's outcome with the teardown that followed it.
///
/// A command error outranks a teardown error; the latter is only logged.
fn finish(
    result: Result<(), Box<dyn std::error::Error>>,
    teardown: AdapterResult<DestroyReport>,
) -> Result<(), Box<dyn std::error::Error>> {
    match teardown {
        Ok(report) if !report.leaked.is_empty() => {
            tracing::warn!(leaked = report.leaked.len(), "sessions were open at exit");
        }
        Ok(_) => {}
        Err(e) if result.is_err() => tracing::error!(error = %e, "teardown failed"),
        Err(e) => return Err(e.into()),
    }
    result
}
