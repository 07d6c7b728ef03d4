//! kinv - build and query kernel inventories from the command line.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::build::BuildArgs;
use commands::common::PathOverrides;
use commands::config::ConfigCommands;
use commands::search::SearchArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "kinv")]
#[command(version, about = "Time-indexed inventory of mission kernel files")]
struct Cli {
    /// Kernel data root (overrides KINV_DATA_ROOT and the settings file)
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Directory of <mission>.json config files
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Directory for the database and memo cache
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build the kernel database and write it to the cache directory
    Build(BuildArgs),

    /// Search for kernels by mission or instrument, type and time range
    Search(SearchArgs),

    /// Show the location and contents of the kernel database
    Status,

    /// Print the coverage windows of a single kernel file
    Coverage {
        /// Path to a CK or SPK file
        file: PathBuf,
    },

    /// Inspect mission configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    let overrides = PathOverrides {
        data_root: cli.data_root,
        config_dir: cli.config_dir,
        cache_dir: cli.cache_dir,
    };

    match cli.command {
        Commands::Build(args) => commands::build::run(&overrides, args),
        Commands::Search(args) => commands::search::run(&overrides, args),
        Commands::Status => commands::status::run(&overrides),
        Commands::Coverage { file } => commands::coverage::run(&overrides, &file),
        Commands::Config { command } => commands::config::run(&overrides, command),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
