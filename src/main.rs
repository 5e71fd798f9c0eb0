use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use orderbridge::config::DEFAULT_CONFIG_FILE;
use orderbridge::observability::LogFormat;
use orderbridge::reconcile::Task;

mod cmd;

#[derive(Parser)]
#[command(name = "orderbridge")]
#[command(version, about = "Mirror platform orders and dispatch state into a spreadsheet ledger")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE, env = "ORDERBRIDGE_CONFIG")]
    pub config: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Console log format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the scheduler and run until Ctrl-C
    Run {
        /// Also serve the status endpoint on 127.0.0.1:<port>
        #[arg(long)]
        http_port: Option<u16>,
    },
    /// Create the database and seed the line counters
    Init,
    /// Run one task once and print its report
    Once {
        #[arg(value_enum)]
        task: Task,
    },
    /// Show line counters and open record counts
    Status,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration (secrets masked)
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default orderbridge.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    match &cli.command {
        Commands::Run { http_port } => cmd::cmd_run(&cli, *http_port).await?,
        Commands::Init => cmd::cmd_init(&cli).await?,
        Commands::Once { task } => cmd::cmd_once(&cli, *task).await?,
        Commands::Status => cmd::cmd_status(&cli).await?,
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
