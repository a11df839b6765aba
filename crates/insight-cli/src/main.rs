//! Insight CLI - Command-line client for Insight document storage
//!
//! Provides commands for:
//! - Logging in with the device-code flow (or client credentials)
//! - Uploading local files and directories
//! - Listing, downloading and deleting remote inodes
//! - Viewing and editing the configuration file

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use insight_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{auth::AuthCommand, configure::ConfigureCommand, file::FileCommand, CliContext};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "insight", version, about = "Command-line client for Insight")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(flatten)]
    Auth(AuthCommand),
    /// View and edit configuration
    #[command(subcommand)]
    Configure(ConfigureCommand),
    /// Upload, list, download and delete files
    #[command(subcommand)]
    File(FileCommand),
}

fn init_tracing(verbose: u8, configured_level: &str) {
    let level = match verbose {
        0 => configured_level,
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let logging_level = Config::load_or_default(&config_path).logging.level;
    init_tracing(cli.verbose, &logging_level);

    let format = OutputFormat::from_flag(cli.json);
    let ctx = CliContext::new(config_path, format);

    let result = match &cli.command {
        Commands::Auth(cmd) => cmd.execute(&ctx).await,
        Commands::Configure(cmd) => cmd.execute(&ctx).await,
        Commands::File(cmd) => cmd.execute(&ctx).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            format.formatter().error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
