//! Subcommand implementations.

use crate::cli::{CheckArgs, GenerateArgs, PruneArgs};
use anyhow::{bail, Context};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use devotional_core::{
    CandidateContent, ClaudeGenerator, Devotional, DevotionalWriter, GeneratorChain,
    HistoryStore, NoveltyConfig, NoveltyValidator, RegenerationController, Verdict,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Run the regeneration loop once and write the result.
pub async fn generate(history: &Path, args: &GenerateArgs) -> anyhow::Result<()> {
    if std::env::var("ANTHROPIC_API_KEY").is_err() {
        bail!(
            "ANTHROPIC_API_KEY environment variable not set. \
             Set it in .env file or with: export ANTHROPIC_API_KEY=your_key_here"
        );
    }

    let mut chain = GeneratorChain::new();
    for config in args.generator_configs() {
        chain.push(Box::new(ClaudeGenerator::from_env(config)?));
    }
    info!(providers = ?chain.names(), "generator chain ready");

    let mut store = HistoryStore::load(history);
    let controller = RegenerationController::new(chain, args.controller_config());
    let outcome = controller.run(&mut store, args.instant(Utc::now())).await?;

    // History is already saved at this point; a failed write below leaves the
    // entry recorded but unpublished, and the next run will treat it as used.
    let writer = DevotionalWriter::new(&args.output_dir);
    let (json, markdown) = publish(&writer, &outcome.devotional)?;

    let devotional = &outcome.devotional;
    println!("{}", devotional.title);
    if let Some(reference) = &devotional.reference {
        println!("  Reference: {reference}");
    }
    println!("  Words:     {}", devotional.word_count);
    println!(
        "  Attempts:  {}{}",
        outcome.attempts(),
        if outcome.fallback { " (fallback)" } else { "" }
    );
    println!("  JSON:      {}", json.display());
    println!("  Markdown:  {}", markdown.display());
    Ok(())
}

fn publish(
    writer: &DevotionalWriter,
    devotional: &Devotional,
) -> anyhow::Result<(PathBuf, PathBuf)> {
    let recorded = || {
        format!(
            "\"{}\" for {} is recorded in history but its output was not written",
            devotional.title, devotional.date
        )
    };
    let json = writer.write_json(devotional).with_context(recorded)?;
    let markdown = writer.write_markdown(devotional).with_context(recorded)?;
    Ok((json, markdown))
}

/// Candidate file accepted by `check`. Takes the output JSON as well as a
/// hand-written draft.
#[derive(Debug, Deserialize)]
struct CandidateFile {
    title: String,
    #[serde(default, alias = "body")]
    content: String,
    #[serde(default, alias = "scripture", alias = "topic")]
    reference: Option<String>,
    #[serde(default)]
    theme: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

impl CandidateFile {
    fn into_candidate(self, date: DateTime<Utc>) -> CandidateContent {
        CandidateContent {
            title: self.title,
            reference: self.reference,
            body: self.content,
            theme: self.theme,
            date,
        }
    }
}

/// `2025-03-02` or an RFC 3339 timestamp.
fn parse_instant(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date {s:?}"))?;
    Ok(midnight(day))
}

fn midnight(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Validate a candidate file against history. Returns whether it would be
/// accepted; nothing is recorded.
pub fn check(history: &Path, args: &CheckArgs) -> anyhow::Result<bool> {
    let content = fs::read_to_string(&args.candidate)
        .with_context(|| format!("failed to read {}", args.candidate.display()))?;
    let file: CandidateFile = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", args.candidate.display()))?;

    let date = match (args.date, file.date.as_deref()) {
        (Some(day), _) => midnight(day),
        (None, Some(s)) => parse_instant(s)?,
        (None, None) => Utc::now(),
    };
    let candidate = file.into_candidate(date);

    let store = HistoryStore::load(history);
    let validator = NoveltyValidator::new(NoveltyConfig::default());

    match validator.validate(&candidate, store.record()) {
        Verdict::Accepted => {
            println!("ACCEPTED  {}", candidate.title);
            Ok(true)
        }
        Verdict::Rejected(rejection) => {
            println!("REJECTED  {}", candidate.title);
            println!("  {}: {}", rejection.code(), rejection);
            Ok(false)
        }
    }
}

pub fn stats(history: &Path) -> anyhow::Result<()> {
    let store = HistoryStore::load(history);
    println!("History: {}", store.path().display());
    println!("{}", store.stats());
    Ok(())
}

pub fn prune(history: &Path, args: &PruneArgs) -> anyhow::Result<()> {
    let mut store = HistoryStore::load(history);
    let report = store.prune(Duration::days(i64::from(args.days)), Utc::now())?;
    println!(
        "Removed {} entries ({} titles, {} hashes, {} references, {} themes)",
        report.total(),
        report.titles,
        report.content_hashes,
        report.references,
        report.themes
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use devotional_core::testing::sample_draft;
    use tempfile::TempDir;

    #[test]
    fn test_parse_instant_accepts_both_forms() {
        assert_eq!(
            parse_instant("2025-03-02").unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_instant("2025-03-02T06:30:00Z").unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 2, 6, 30, 0).unwrap()
        );
        assert!(parse_instant("March 2").is_err());
    }

    #[test]
    fn test_check_reads_output_json_and_rejects_repeat() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let history = temp_dir.path().join("history.json");
        let candidate_path = temp_dir.path().join("candidate.json");

        fs::write(
            &candidate_path,
            r#"{
                "date": "2025-03-02",
                "title": "Walking in Faith",
                "content": "One step, then another.",
                "reference": "John 3:16",
                "wordCount": 4,
                "prayer": "Lead me."
            }"#,
        )
        .unwrap();

        let args = CheckArgs {
            candidate: candidate_path,
            date: None,
        };
        assert!(check(&history, &args).unwrap());

        let mut store = HistoryStore::load(&history);
        let earlier = midnight(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        store
            .append(&CandidateContent::new("Walking in Faith", "Earlier body", earlier))
            .unwrap();
        assert!(!check(&history, &args).unwrap());
    }

    fn walking_in_faith() -> Devotional {
        // A provider that echoes artifact fields back in its extras
        let draft = sample_draft("Walking in Faith", "John 3:16", "One step, then another.")
            .with_extra("date", "1999-01-01")
            .with_extra("title", "Shadow Title");
        let day = midnight(NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
        let candidate = CandidateContent::new("Walking in Faith", &draft.body, day)
            .with_reference("John 3:16");
        Devotional::from_accepted(&draft, &candidate, false)
    }

    #[test]
    fn test_check_reads_written_devotional_with_extras() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let writer = DevotionalWriter::new(temp_dir.path().join("out"));
        let (json, _) = publish(&writer, &walking_in_faith()).unwrap();

        let args = CheckArgs {
            candidate: json,
            date: None,
        };
        assert!(check(&temp_dir.path().join("history.json"), &args).unwrap());
    }

    #[test]
    fn test_failed_publish_says_history_was_recorded() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let blocked = temp_dir.path().join("out");
        fs::write(&blocked, "not a directory").unwrap();

        let err = publish(&DevotionalWriter::new(&blocked), &walking_in_faith()).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("recorded in history"), "{message}");
        assert!(message.contains("2025-03-02"), "{message}");
    }
}
