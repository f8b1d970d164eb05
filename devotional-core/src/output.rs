//! The published devotional and its on-disk renderings.

use crate::candidate::CandidateContent;
use crate::generator::Draft;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors from writing output files.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Keys the artifact already writes, plus the aliases readers accept for
/// them. Extras under these names would produce duplicate JSON keys.
const RESERVED_KEYS: &[&str] = &[
    "date",
    "title",
    "content",
    "body",
    "reference",
    "scripture",
    "topic",
    "theme",
    "wordCount",
    "generatedBy",
    "fallback",
];

/// A devotional ready to publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Devotional {
    pub date: NaiveDate,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    pub word_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_by: Option<String>,
    /// Whether this was force-accepted after every attempt was rejected.
    #[serde(default)]
    pub fallback: bool,
    /// Passthrough fields from the generator.
    #[serde(flatten)]
    pub extras: BTreeMap<String, Value>,
}

impl Devotional {
    /// Assemble from the accepted candidate and the draft it came from.
    ///
    /// Title, body and reference come from the candidate, which may differ
    /// from the draft on the fallback path.
    pub fn from_accepted(draft: &Draft, candidate: &CandidateContent, fallback: bool) -> Self {
        Self {
            date: candidate.date.date_naive(),
            title: candidate.title.clone(),
            content: candidate.body.clone(),
            reference: candidate.reference().map(str::to_string),
            theme: candidate.theme().map(str::to_string),
            word_count: word_count(&candidate.body),
            generated_by: draft.generated_by.clone(),
            fallback,
            extras: draft
                .extras
                .iter()
                .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }
}

/// Number of whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Shorten `text` to at most `max_words` words.
///
/// Text within the limit is returned unchanged. Otherwise the cut falls on
/// the last sentence end inside the limit, or at the limit itself with an
/// ellipsis when no sentence ends early enough.
pub fn trim_to_word_limit(text: &str, max_words: usize) -> String {
    let ends = word_end_offsets(text);
    if ends.len() <= max_words {
        return text.to_string();
    }
    if max_words == 0 {
        return String::new();
    }

    let prefix = &text[..ends[max_words - 1]];
    match last_sentence_end(prefix) {
        Some(end) => prefix[..end].to_string(),
        None => format!("{}…", prefix.trim_end()),
    }
}

/// Byte offset just past each word.
fn word_end_offsets(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if in_word {
                ends.push(i);
                in_word = false;
            }
        } else {
            in_word = true;
        }
    }
    if in_word {
        ends.push(text.len());
    }
    ends
}

/// Byte offset just past the last `.`, `!` or `?`, including any closing
/// quotes or brackets that follow it.
fn last_sentence_end(text: &str) -> Option<usize> {
    let pos = text.rfind(['.', '!', '?'])?;
    let mut end = pos + 1;
    for c in text[end..].chars() {
        if matches!(c, '"' | '\'' | '”' | '’' | ')') {
            end += c.len_utf8();
        } else {
            break;
        }
    }
    Some(end)
}

/// Render a devotional as Markdown.
pub fn render_markdown(devotional: &Devotional) -> String {
    let mut md = String::new();

    md.push_str(&format!("# {}\n\n", devotional.title));
    md.push_str(&format!("*{}*\n\n", devotional.date.format("%A, %B %-d, %Y")));

    if let Some(reference) = &devotional.reference {
        md.push_str(&format!("> **{reference}**\n\n"));
    }

    md.push_str(devotional.content.trim());
    md.push('\n');

    for (key, value) in &devotional.extras {
        md.push_str(&format!("\n## {}\n\n", heading(key)));
        match value {
            Value::String(s) => {
                md.push_str(s.trim());
                md.push('\n');
            }
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(s) => md.push_str(&format!("- {s}\n")),
                        other => md.push_str(&format!("- {other}\n")),
                    }
                }
            }
            other => {
                md.push_str(&other.to_string());
                md.push('\n');
            }
        }
    }

    if let Some(theme) = &devotional.theme {
        md.push_str(&format!("\n---\n*Theme: {theme}*\n"));
    }

    md
}

/// `reflection_questions` -> `Reflection Questions`.
fn heading(key: &str) -> String {
    key.split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Writes devotionals into a directory, one file per day and format.
#[derive(Debug, Clone)]
pub struct DevotionalWriter {
    dir: PathBuf,
}

impl DevotionalWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn json_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    pub fn markdown_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.md", date.format("%Y-%m-%d")))
    }

    /// Write `<dir>/<date>.json`.
    pub fn write_json(&self, devotional: &Devotional) -> Result<PathBuf, OutputError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.json_path(devotional.date);
        fs::write(&path, serde_json::to_string_pretty(devotional)?)?;
        info!(path = %path.display(), "wrote devotional JSON");
        Ok(path)
    }

    /// Write `<dir>/<date>.md`.
    pub fn write_markdown(&self, devotional: &Devotional) -> Result<PathBuf, OutputError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.markdown_path(devotional.date);
        fs::write(&path, render_markdown(devotional))?;
        info!(path = %path.display(), "wrote devotional Markdown");
        Ok(path)
    }
}
