use clap::{Args, Subcommand};

use xuanji_core::{PageRequest, Setting};

use super::OutputFormat;
use crate::app::App;

#[derive(Args)]
pub struct SettingCommand {
    #[command(subcommand)]
    pub command: SettingSubcommand,
}

#[derive(Subcommand)]
pub enum SettingSubcommand {
    /// Print one setting
    Get {
        key: String,
    },

    /// Create or replace a setting
    Set {
        key: String,
        value: String,
    },

    /// List all settings
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl SettingCommand {
    pub async fn run(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        let repo = app.repo::<Setting>();

        match &self.command {
            SettingSubcommand::Get { key } => match repo.find_by_id(key).await? {
                Some(setting) => {
                    println!("{}", setting.value);
                    Ok(())
                }
                None => Err(format!("Setting not found: {}", key).into()),
            },

            SettingSubcommand::Set { key, value } => {
                if key.trim().is_empty() {
                    return Err("Setting key cannot be empty".into());
                }
                if !repo.save(&Setting::new(key.trim(), value.as_str())).await {
                    return Err(format!("Failed to save setting: {}", key).into());
                }
                println!("{} = {}", key.trim(), value);
                Ok(())
            }

            SettingSubcommand::List { format } => {
                let settings = repo.find_all(&PageRequest::new()).await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&settings)?);
                    }
                    OutputFormat::Text => {
                        if settings.is_empty() {
                            println!("No settings");
                        }
                        for setting in &settings {
                            println!("{} = {}", setting.key, setting.value);
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
