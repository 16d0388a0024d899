//! orgsync - Keep the Dataspot organisation hierarchy in line with the
//! Staatskalender records published on ODS.

use clap::{Parser, Subcommand};

mod commands;
mod config;
mod error;
mod logging;

use config::Config;
use error::CliResult;
use logging::LogFormat;

/// orgsync - Organisation structure synchronization
#[derive(Parser)]
#[command(name = "orgsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the catalog with the organisation source
    Sync(commands::sync::SyncArgs),

    /// Inspect the mapping table
    Mapping(commands::mapping::MappingArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<i32> {
    let config = Config::from_env()?;
    logging::init_logging(&config.log_filter, cli.log_format);
    tracing::debug!(?config, "Loaded configuration");

    match cli.command {
        Commands::Sync(args) => commands::sync::execute(args, &config).await,
        Commands::Mapping(args) => commands::mapping::execute(args, &config),
    }
}
