use clap::{Args, Subcommand};
use std::path::PathBuf;

use super::OutputFormat;
use crate::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        cli_config_path: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            let expected =
                                cli_config_path.unwrap_or_else(Config::default_config_path);
                            println!("Config file: {} (not found)", expected.display());
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!();

                        println!("cache.max_entries: {}", config.cache_max_entries.value);
                        println!("  source: {}", config.cache_max_entries.source);
                        println!("cache.default_ttl_secs: {}", config.cache_default_ttl_secs);
                        println!();

                        let sync = &config.sync;
                        println!(
                            "sync.server_url: {}",
                            sync.server_url.as_deref().unwrap_or("(not set)")
                        );
                        println!(
                            "sync.api_key: {}",
                            if sync.api_key.is_some() { "(set)" } else { "(not set)" }
                        );
                        println!("sync.auto_sync: {}", sync.auto_sync);
                        println!("sync.auto_sync_interval_secs: {}", sync.auto_sync_interval_secs);
                        println!("sync.request_timeout_secs: {}", sync.settings.request_timeout_secs);
                        println!("sync.probe_timeout_secs: {}", sync.settings.probe_timeout_secs);
                        println!("sync.change_batch_limit: {}", sync.settings.change_batch_limit);
                        println!("sync.upload_batch_size: {}", sync.settings.upload_batch_size);
                        println!("sync.conflict_policy: {}", sync.settings.conflict_policy);
                        println!(
                            "sync.synced_retention_days: {}",
                            sync.settings.synced_retention_days
                        );
                    }
                }
                Ok(())
            }
        }
    }
}
