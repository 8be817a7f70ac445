//! InstallGraph CLI - Command-line interface
//!
//! Runs download, version-list and asset pipelines from the terminal.

mod commands;
mod console;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use installgraph::config::{config_file_path, ConfigFile};
use installgraph::logging::init_logging;

use commands::assets::AssetsArgs;
use commands::config::ConfigCommands;
use commands::download::DownloadArgs;
use commands::versions::VersionsArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "installgraph", version, about = "Dependency-aware game download pipelines")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download files with retries, mirrors and checksum verification
    Download(DownloadArgs),

    /// List installable loader versions
    Versions(VersionsArgs),

    /// Verify assets and download the missing ones
    Assets(AssetsArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            eprintln!("  caused by: {}", cause);
            source = cause.source();
        }
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.unwrap_or_else(config_file_path);

    let pipeline = match cli.command {
        Commands::Config { command } => return commands::config::run(command, &config_path),
        other => other,
    };

    let config = if config_path.exists() {
        ConfigFile::load_from(&config_path)?
    } else {
        ConfigFile::default()
    };
    let _logging = init_logging(&config.logging, cli.verbose)?;

    match pipeline {
        Commands::Download(args) => commands::download::run(args, config),
        Commands::Versions(args) => commands::versions::run(args, config),
        Commands::Assets(args) => commands::assets::run(args, config),
        Commands::Config { .. } => Ok(()),
    }
}
