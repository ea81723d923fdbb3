use clap::{Args, Subcommand};
use std::io::{self, Write};

use xuanji_core::{DivinationCase, DivinationMethod, Filter, Value};

use super::{truncate, OutputFormat};
use crate::app::App;

#[derive(Args)]
pub struct CaseCommand {
    #[command(subcommand)]
    pub command: CaseSubcommand,
}

#[derive(Subcommand)]
pub enum CaseSubcommand {
    /// Record a new case
    Add {
        /// Short title for the case
        title: String,

        /// Divination method (bazi, qimen, ziwei, liuyao, meihua)
        #[arg(long, short)]
        method: DivinationMethod,

        /// The question asked
        #[arg(long, short)]
        question: Option<String>,

        /// Resulting hexagram number
        #[arg(long)]
        hexagram: Option<i64>,

        /// Method-specific chart as JSON
        #[arg(long)]
        payload: Option<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,

        /// Tags (can be repeated)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },

    /// List cases, newest first
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Filter by method
        #[arg(long, short)]
        method: Option<DivinationMethod>,

        /// Page number (1-based)
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Cases per page
        #[arg(long, default_value_t = 20)]
        size: u32,
    },

    /// Show a case's details
    Show {
        /// Case ID
        id: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Replace a case's notes
    Note {
        /// Case ID
        id: String,

        /// New notes
        notes: String,
    },

    /// Delete a case
    Delete {
        /// Case ID
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl CaseCommand {
    pub async fn run(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        let repo = app.repo::<DivinationCase>();

        match &self.command {
            CaseSubcommand::Add {
                title,
                method,
                question,
                hexagram,
                payload,
                notes,
                tags,
            } => {
                if title.trim().is_empty() {
                    return Err("Case title cannot be empty".into());
                }

                let mut case = DivinationCase::new(*method, title.trim());
                if let Some(question) = question {
                    case = case.with_question(question);
                }
                if let Some(hexagram) = hexagram {
                    case = case.with_hexagram(*hexagram);
                }
                if let Some(payload) = payload {
                    let payload: serde_json::Value = serde_json::from_str(payload)
                        .map_err(|e| format!("Invalid payload JSON: {}", e))?;
                    case = case.with_payload(payload);
                }
                if let Some(notes) = notes {
                    case = case.with_notes(notes);
                }
                if !tags.is_empty() {
                    case = case.with_tags(tags.clone());
                }

                if !repo.save(&case).await {
                    return Err("Failed to save case".into());
                }
                println!("Created case:");
                println!("{}", case);
                Ok(())
            }

            CaseSubcommand::List {
                format,
                method,
                page,
                size,
            } => {
                let filter = match method {
                    Some(method) => Filter::new("method = ?", vec![Value::from(method.to_string())]),
                    None => Filter::new("1 = 1", Vec::new()),
                }
                .order_by("created_at DESC");
                let result = repo.find_paged(*page, *size, Some(&filter)).await?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&result)?);
                    }
                    OutputFormat::Text => {
                        if result.items.is_empty() {
                            println!("No cases found");
                            return Ok(());
                        }
                        println!("{:<36}  {:<8}  {:<30}  CREATED", "ID", "METHOD", "TITLE");
                        println!("{}", "-".repeat(96));
                        for case in &result.items {
                            println!(
                                "{:<36}  {:<8}  {:<30}  {}",
                                case.id,
                                case.method,
                                truncate(&case.title, 30),
                                case.created_at.format("%Y-%m-%d %H:%M")
                            );
                        }
                        println!(
                            "\nPage {} of {} ({} case(s))",
                            result.page,
                            result.total_pages.max(1),
                            result.total
                        );
                    }
                }
                Ok(())
            }

            CaseSubcommand::Show { id, format } => match repo.find_by_id(id).await? {
                Some(case) => {
                    match format {
                        OutputFormat::Json => {
                            println!("{}", serde_json::to_string_pretty(&case)?);
                        }
                        OutputFormat::Text => {
                            println!("{}", case);
                        }
                    }
                    Ok(())
                }
                None => Err(format!("Case not found: {}", id).into()),
            },

            CaseSubcommand::Note { id, notes } => {
                let mut case = match repo.find_by_id(id).await? {
                    Some(case) => case,
                    None => return Err(format!("Case not found: {}", id).into()),
                };
                case.notes = Some(notes.clone());
                case.touch();

                if !repo.update(&case).await {
                    return Err(format!("Failed to update case: {}", id).into());
                }
                println!("Updated case:");
                println!("{}", case);
                Ok(())
            }

            CaseSubcommand::Delete { id, force } => {
                let case = match repo.find_by_id(id).await? {
                    Some(case) => case,
                    None => return Err(format!("Case not found: {}", id).into()),
                };

                // Confirm deletion unless --force is used
                if !force {
                    print!("Delete case '{}'? [y/N] ", case.title);
                    io::stdout().flush()?;

                    let mut input = String::new();
                    io::stdin().read_line(&mut input)?;

                    if !input.trim().eq_ignore_ascii_case("y") {
                        println!("Deletion cancelled.");
                        return Ok(());
                    }
                }

                if !repo.delete(&case.id).await {
                    return Err(format!("Failed to delete case: {}", id).into());
                }
                println!("Deleted case: {}", case.title);
                Ok(())
            }
        }
    }
}
