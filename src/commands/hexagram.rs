use clap::{Args, Subcommand};

use xuanji_core::{Filter, Hexagram, PageRequest, Trigram, Value};

use super::OutputFormat;
use crate::app::App;

#[derive(Args)]
pub struct HexagramCommand {
    #[command(subcommand)]
    pub command: HexagramSubcommand,
}

#[derive(Subcommand)]
pub enum HexagramSubcommand {
    /// List hexagrams in King Wen order
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Only hexagrams containing this trigram (upper or lower)
        #[arg(long)]
        trigram: Option<i64>,
    },

    /// Show a hexagram's details
    Show {
        /// King Wen number or name
        identifier: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl HexagramCommand {
    pub async fn run(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        let repo = app.repo::<Hexagram>();

        match &self.command {
            HexagramSubcommand::List { format, trigram } => {
                let hexagrams = match trigram {
                    Some(trigram) => {
                        let filter = Filter::new(
                            "upper_trigram_id = ? OR lower_trigram_id = ?",
                            vec![Value::from(*trigram), Value::from(*trigram)],
                        )
                        .order_by("id");
                        repo.find_where(&filter).await?
                    }
                    None => repo.find_all(&PageRequest::new().order_by("id")).await?,
                };

                if hexagrams.is_empty() {
                    println!("No hexagrams found. Run `xj sync full` to download reference data.");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&hexagrams)?);
                    }
                    OutputFormat::Text => {
                        println!("{:>3}  {:<24}  CODE", "#", "NAME");
                        println!("{}", "-".repeat(40));
                        for hexagram in &hexagrams {
                            println!(
                                "{:>3}  {:<24}  {}",
                                hexagram.id, hexagram.name, hexagram.binary_code
                            );
                        }
                        println!("\nTotal: {} hexagram(s)", hexagrams.len());
                    }
                }
                Ok(())
            }

            HexagramSubcommand::Show { identifier, format } => {
                // Try the King Wen number first, then fall back to name lookup
                let hexagram = match identifier.parse::<i64>() {
                    Ok(id) => repo.find_by_id(&id).await?,
                    Err(_) => {
                        let filter = Filter::new(
                            "name = ? COLLATE NOCASE",
                            vec![Value::from(identifier.as_str())],
                        )
                        .limit(1);
                        repo.find_where(&filter).await?.into_iter().next()
                    }
                };

                let hexagram = match hexagram {
                    Some(h) => h,
                    None => return Err(format!("Hexagram not found: {}", identifier).into()),
                };

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&hexagram)?);
                    }
                    OutputFormat::Text => {
                        print!("{}", hexagram);
                        let trigrams = app.repo::<Trigram>();
                        let upper = trigrams.find_by_id(&hexagram.upper_trigram_id).await?;
                        let lower = trigrams.find_by_id(&hexagram.lower_trigram_id).await?;
                        if let (Some(upper), Some(lower)) = (upper, lower) {
                            println!("\nUpper: {}", upper);
                            println!("Lower: {}", lower);
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
