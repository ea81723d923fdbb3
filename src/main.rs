use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod app;
mod commands;
mod config;

use app::App;
use commands::{
    CaseCommand, CaseSubcommand, ConfigCommand, HexagramCommand, SettingCommand, SyncCommand,
};
use config::Config;

#[derive(Parser)]
#[command(name = "xj")]
#[command(version)]
#[command(about = "Local-first divination case book", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record and browse divination cases
    Case(CaseCommand),

    /// Browse hexagram reference data
    Hexagram(HexagramCommand),

    /// Read and write local settings
    Setting(SettingCommand),

    /// Manage configuration
    Config(ConfigCommand),

    /// Sync with remote server
    Sync(SyncCommand),
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("xuanji=info,xuanji_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Save config path for the config command
    let cli_config_path = cli.config.clone();

    // Load configuration
    let config = Config::load(cli.config)?;

    let command = match cli.command {
        Some(Commands::Config(cmd)) => {
            cmd.run(&config, cli_config_path)?;
            return Ok(());
        }
        Some(command) => command,
        None => {
            println!("Use --help to see available commands");
            return Ok(());
        }
    };

    let app = App::open(config).await?;

    // Auto-sync BEFORE read commands
    if is_read_command(&command) {
        app.try_auto_sync().await;
    }

    let result = match &command {
        Commands::Case(cmd) => cmd.run(&app).await,
        Commands::Hexagram(cmd) => cmd.run(&app).await,
        Commands::Setting(cmd) => cmd.run(&app).await,
        Commands::Sync(cmd) => cmd.run(&app).await.map_err(Into::into),
        Commands::Config(_) => Ok(()),
    };

    // Auto-sync AFTER write commands (only if command succeeded)
    if result.is_ok() && is_write_command(&command) {
        app.try_auto_sync().await;
    }

    result
}

/// Returns true if the command is a read operation that should sync before execution.
fn is_read_command(cmd: &Commands) -> bool {
    matches!(
        cmd,
        Commands::Case(c) if matches!(c.command,
            CaseSubcommand::List { .. } | CaseSubcommand::Show { .. })
    ) || matches!(cmd, Commands::Hexagram(_))
}

/// Returns true if the command is a write operation that should sync after execution.
/// Settings stay local and never trigger a sync.
fn is_write_command(cmd: &Commands) -> bool {
    matches!(
        cmd,
        Commands::Case(c) if matches!(c.command,
            CaseSubcommand::Add { .. } | CaseSubcommand::Note { .. } | CaseSubcommand::Delete { .. })
    )
}
