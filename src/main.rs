use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use signal_engine::{
    commands::{process_signals, reconcile_signals},
    config::AppConfig,
    context::AppContext,
};

#[derive(Parser)]
#[command(name = "signal-engine")]
#[command(about = "Derives, persists and verifies daily trading signals")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the position state machine and extend the signal ledgers
    Process {
        /// Comma separated security codes (defaults to the full universe)
        #[arg(long, value_delimiter = ',')]
        codes: Vec<String>,
    },
    /// Verify ledgers against the reference feed and record statistics
    Reconcile {
        /// Comma separated security codes (defaults to the full universe)
        #[arg(long, value_delimiter = ',')]
        codes: Vec<String>,
    },
    /// Process then reconcile in one pass
    RunAll {
        /// Comma separated security codes (defaults to the full universe)
        #[arg(long, value_delimiter = ',')]
        codes: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;
    let app_context = AppContext::initialize(config).await?;

    info!("Starting signal engine. Not financial advice. Use at your own risk.");

    match cli.command {
        Commands::Process { codes } => {
            process_signals::run(&app_context, &codes).await?;
        }
        Commands::Reconcile { codes } => {
            reconcile_signals::run(&app_context, &codes).await?;
        }
        Commands::RunAll { codes } => {
            process_signals::run(&app_context, &codes).await?;
            reconcile_signals::run(&app_context, &codes).await?;
        }
    }

    Ok(())
}
