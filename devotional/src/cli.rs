//! Command line arguments.
//!
//! Every flag can also come from the environment (or a `.env` file).

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use devotional_core::{ClaudeGeneratorConfig, ControllerConfig};
use std::path::PathBuf;

/// Daily devotional generator with novelty checking
#[derive(Parser, Debug, Clone)]
#[command(name = "devotional")]
#[command(about = "Generate one original devotional per day without repeats")]
pub struct Cli {
    /// Path to the history file
    #[arg(
        long,
        global = true,
        env = "DEVOTIONAL_HISTORY_PATH",
        default_value = "data/history.json"
    )]
    pub history: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Generate, validate and record today's devotional
    Generate(GenerateArgs),

    /// Validate a candidate JSON file against history without recording it
    Check(CheckArgs),

    /// Show history statistics
    Stats,

    /// Remove history entries older than a retention window
    Prune(PruneArgs),
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Day to generate for (YYYY-MM-DD); defaults to today
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Directory for the JSON and Markdown output
    #[arg(long, env = "DEVOTIONAL_OUTPUT_DIR", default_value = "devotionals")]
    pub output_dir: PathBuf,

    /// Draft/validate cycles before the fallback draft is forced
    #[arg(long, env = "DEVOTIONAL_MAX_ATTEMPTS", default_value = "5")]
    pub max_attempts: usize,

    /// Maximum words in the devotional body
    #[arg(long, env = "DEVOTIONAL_WORD_LIMIT", default_value = "400")]
    pub word_limit: usize,

    /// Claude model for the primary generator
    #[arg(long, env = "DEVOTIONAL_MODEL")]
    pub model: Option<String>,

    /// Claude model tried when the primary model fails
    #[arg(long, env = "DEVOTIONAL_FALLBACK_MODEL")]
    pub fallback_model: Option<String>,

    /// Theme rotation, comma separated
    #[arg(long, env = "DEVOTIONAL_THEMES", value_delimiter = ',')]
    pub themes: Vec<String>,
}

impl GenerateArgs {
    /// The instant the devotional is generated for.
    ///
    /// An explicit date maps to midnight UTC of that day.
    pub fn instant(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or(now)
    }

    pub fn controller_config(&self) -> ControllerConfig {
        let themes: Vec<String> = self
            .themes
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let config = ControllerConfig::default().with_max_attempts(self.max_attempts);
        if themes.is_empty() {
            config
        } else {
            config.with_themes(themes)
        }
    }

    /// Generator configs in priority order.
    pub fn generator_configs(&self) -> Vec<ClaudeGeneratorConfig> {
        let base = ClaudeGeneratorConfig::default().with_word_limit(self.word_limit);

        let mut configs = vec![match &self.model {
            Some(model) => base.clone().with_model(model),
            None => base.clone(),
        }];
        if let Some(fallback) = &self.fallback_model {
            if Some(fallback) != self.model.as_ref() {
                configs.push(base.with_model(fallback));
            }
        }
        configs
    }
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Candidate JSON file with title, content/body, reference and theme
    pub candidate: PathBuf,

    /// Judge the candidate as of this day (YYYY-MM-DD) instead of its own date
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

#[derive(Args, Debug, Clone)]
pub struct PruneArgs {
    /// Keep entries used within this many days
    #[arg(long, env = "DEVOTIONAL_RETENTION_DAYS", default_value = "365")]
    pub days: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("devotional").chain(args.iter().copied()))
            .expect("arguments should parse")
    }

    fn generate_args(args: &[&str]) -> GenerateArgs {
        let mut full = vec!["generate"];
        full.extend_from_slice(args);
        match parse(&full).command {
            Command::Generate(args) => args,
            other => panic!("expected generate, got {other:?}"),
        }
    }

    #[test]
    fn test_generate_flags() {
        let args = generate_args(&[
            "--date",
            "2025-03-02",
            "--max-attempts",
            "3",
            "--themes",
            "hope, joy,,peace",
            "--model",
            "claude-a",
            "--fallback-model",
            "claude-b",
        ]);

        assert_eq!(args.date, NaiveDate::from_ymd_opt(2025, 3, 2));
        let config = args.controller_config();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.themes, vec!["hope", "joy", "peace"]);

        let models: Vec<_> = args
            .generator_configs()
            .into_iter()
            .map(|c| c.model)
            .collect();
        assert_eq!(
            models,
            vec![Some("claude-a".to_string()), Some("claude-b".to_string())]
        );
    }

    #[test]
    fn test_same_fallback_model_is_not_duplicated() {
        let args = generate_args(&["--model", "m", "--fallback-model", "m"]);
        assert_eq!(args.generator_configs().len(), 1);
    }

    #[test]
    fn test_instant_defaults_to_now() {
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 14, 5, 0).unwrap();
        assert_eq!(generate_args(&[]).instant(now), now);

        let args = generate_args(&["--date", "2025-01-10"]);
        assert_eq!(
            args.instant(now),
            Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_global_history_flag_after_subcommand() {
        let cli = parse(&["stats", "--history", "/tmp/h.json"]);
        assert_eq!(cli.history, PathBuf::from("/tmp/h.json"));
        assert!(matches!(cli.command, Command::Stats));
    }

    #[test]
    fn test_prune_days() {
        match parse(&["prune", "--days", "90"]).command {
            Command::Prune(args) => assert_eq!(args.days, 90),
            other => panic!("expected prune, got {other:?}"),
        }
    }
}
