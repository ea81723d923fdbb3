//! Sync CLI commands for synchronizing with the server.

use clap::{Args, Subcommand};
use std::sync::Arc;
use std::time::Duration;

use xuanji_core::{AutoSync, SyncError, SyncResult};

use super::OutputFormat;
use crate::app::App;

/// Sync with remote server
#[derive(Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Subcommand)]
enum SyncSubcommand {
    /// Re-download every table that is behind the server
    Full {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Upload local changes and apply remote ones (the default)
    Incremental {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show sync configuration and per-table status
    Status {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Upload every local row of a table
    Push {
        /// Table name
        table: String,
    },

    /// Run incremental sync periodically until interrupted
    Watch {
        /// Seconds between runs (defaults to sync.auto_sync_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },
}

impl SyncCommand {
    pub async fn run(&self, app: &App) -> Result<(), SyncCommandError> {
        match &self.command {
            None => self.incremental(app, &OutputFormat::Text).await,
            Some(SyncSubcommand::Incremental { format }) => self.incremental(app, format).await,
            Some(SyncSubcommand::Full { format }) => {
                let engine = app.sync_engine()?;
                println!("Running full sync against {}...", engine.client().server_url());
                report(&engine.full_sync().await?, format)
            }
            Some(SyncSubcommand::Status { format }) => self.status(app, format).await,
            Some(SyncSubcommand::Push { table }) => {
                let engine = app.sync_engine()?;
                println!("Pushing {}...", table);
                report(&engine.push_table(table).await?, &OutputFormat::Text)
            }
            Some(SyncSubcommand::Watch { interval }) => self.watch(app, *interval).await,
        }
    }

    async fn incremental(&self, app: &App, format: &OutputFormat) -> Result<(), SyncCommandError> {
        let engine = app.sync_engine()?;
        println!("Syncing with {}...", engine.client().server_url());
        report(&engine.incremental_sync().await?, format)
    }

    async fn status(&self, app: &App, format: &OutputFormat) -> Result<(), SyncCommandError> {
        let sync = &app.config.sync;
        let engine = match app.sync_engine() {
            Ok(engine) => engine,
            Err(SyncError::NotConfigured) => {
                println!("Status: Not configured");
                println!();
                println!("To enable sync, add to your config file:");
                println!();
                println!("  sync:");
                println!("    server_url: \"https://sync.example.com\"");
                println!("    api_key: \"your-api-key\"");
                println!("    auto_sync: false");
                println!();
                println!("Or set environment variables:");
                println!("  XJ_SYNC_URL");
                println!("  XJ_SYNC_API_KEY");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let tables = engine.status().await?;

        if let OutputFormat::Json = format {
            let json = serde_json::to_string_pretty(&tables).map_err(SyncCommandError::Output)?;
            println!("{}", json);
            return Ok(());
        }

        println!("Sync Configuration");
        println!("==================");
        println!();
        println!("Server:    {}", engine.client().server_url());
        match &sync.api_key {
            Some(key) if !key.is_empty() => {
                let shown: String = key.chars().take(8).collect();
                println!("API Key:   {}...", shown);
            }
            _ => println!("API Key:   (none)"),
        }
        println!(
            "Auto-sync: {}",
            if sync.auto_sync {
                format!("every {}s", sync.auto_sync_interval_secs)
            } else {
                "disabled".to_string()
            }
        );
        println!("Conflicts: {}", sync.settings.conflict_policy);
        print!("Server status: ");
        match engine.client().check_health().await {
            Ok(()) => println!("✓ reachable"),
            Err(e) => println!("✗ {}", e),
        }
        println!();

        println!(
            "{:<12}  {:<10}  {:<20}  {:>7}  {:>6}",
            "TABLE", "VERSION", "LAST SYNC", "PENDING", "ERRORS"
        );
        println!("{}", "-".repeat(63));
        for status in &tables {
            let last_sync = status
                .last_sync_time
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "{:<12}  {:<10}  {:<20}  {:>7}  {:>6}",
                status.table_name,
                status.sync_version.to_string(),
                last_sync,
                status.pending_changes,
                status.sync_errors
            );
        }
        Ok(())
    }

    async fn watch(&self, app: &App, interval: Option<u64>) -> Result<(), SyncCommandError> {
        let engine = Arc::new(app.sync_engine()?);
        let interval = interval
            .map(Duration::from_secs)
            .unwrap_or_else(|| app.config.sync.auto_sync_interval());

        println!(
            "Syncing with {} every {}s. Press Ctrl-C to stop.",
            engine.client().server_url(),
            interval.as_secs()
        );
        let mut auto = AutoSync::spawn(engine, interval);
        tokio::signal::ctrl_c().await.map_err(SyncCommandError::Signal)?;

        println!("Stopping...");
        auto.shutdown().await;
        Ok(())
    }
}

fn report(result: &SyncResult, format: &OutputFormat) -> Result<(), SyncCommandError> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(result).map_err(SyncCommandError::Output)?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            let mark = if result.success { "✓" } else { "✗" };
            println!("  {} {}", mark, result);
            if !result.stats.modified_tables.is_empty() {
                let tables: Vec<&str> = result
                    .stats
                    .modified_tables
                    .iter()
                    .map(String::as_str)
                    .collect();
                println!("  updated: {}", tables.join(", "));
            }
            if result.stats.conflicts > 0 {
                println!("  kept {} local change(s) over remote ones", result.stats.conflicts);
            }
        }
    }
    Ok(())
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    Sync(SyncError),
    Output(serde_json::Error),
    Signal(std::io::Error),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::Sync(e) => write!(f, "{}", e),
            SyncCommandError::Output(e) => write!(f, "Failed to render output: {}", e),
            SyncCommandError::Signal(e) => write!(f, "Failed to listen for Ctrl-C: {}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::Sync(e) => Some(e),
            SyncCommandError::Output(e) => Some(e),
            SyncCommandError::Signal(e) => Some(e),
        }
    }
}

impl From<SyncError> for SyncCommandError {
    fn from(e: SyncError) -> Self {
        SyncCommandError::Sync(e)
    }
}
