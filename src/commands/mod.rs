use clap::ValueEnum;

mod case;
mod config_cmd;
mod hexagram;
mod setting;
mod sync_cmd;

pub use case::{CaseCommand, CaseSubcommand};
pub use config_cmd::ConfigCommand;
pub use hexagram::HexagramCommand;
pub use setting::SettingCommand;
pub use sync_cmd::SyncCommand;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Shortens `s` to at most `max` characters for table output.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a question about work", 10), "a quest...");
        assert_eq!(truncate("乾为天乾为天乾为天", 5), "乾为...");
    }
}
