//! Durable history of accepted devotionals.
//!
//! The history file is a single JSON document that is rewritten in full on
//! every mutation. It is loaded once per run. Damaged entries are skipped
//! and a damaged document is moved aside, so neither stops generation nor
//! gets overwritten; a failed write always aborts the run.

use crate::candidate::CandidateContent;
use crate::text::{content_hash, normalize};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Maximum entries kept in `recentReferences`.
pub const RECENT_REFERENCE_CAP: usize = 180;

/// Errors from writing the history file.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to write history file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize history: {0}")]
    Json(#[from] serde_json::Error),
}

/// A title that has been published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleEntry {
    pub title: String,
    #[serde(with = "lenient_date")]
    pub date_used: DateTime<Utc>,
    #[serde(default)]
    pub theme: Option<String>,
}

/// Hash of a published body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashEntry {
    pub hash: String,
    #[serde(with = "lenient_date")]
    pub date_used: DateTime<Utc>,
}

/// A scripture or topic reference that has been used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceEntry {
    pub reference: String,
    #[serde(with = "lenient_date")]
    pub date_used: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

/// A theme category and the title that used it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeEntry {
    pub category: String,
    #[serde(with = "lenient_date")]
    pub date_used: DateTime<Utc>,
    #[serde(default)]
    pub title: String,
}

/// Everything the novelty checks know about past output.
///
/// Missing lists load as empty, entries that cannot be read are skipped, and
/// `topicReferences` from older files is merged into `scriptureReferences`,
/// so older or hand-edited files still parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawHistory")]
pub struct HistoryRecord {
    pub titles: Vec<TitleEntry>,
    pub content_hashes: Vec<HashEntry>,
    pub scripture_references: Vec<ReferenceEntry>,
    pub recent_references: Vec<ReferenceEntry>,
    pub themes: Vec<ThemeEntry>,
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(rename = "totalDevotionals")]
    pub total_devotionals: usize,
}

/// The document as read from disk, before entry-level validation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawHistory {
    titles: Value,
    content_hashes: Value,
    scripture_references: Value,
    topic_references: Value,
    recent_references: Value,
    themes: Value,
    last_updated: Value,
}

impl From<RawHistory> for HistoryRecord {
    fn from(raw: RawHistory) -> Self {
        let mut scripture_references: Vec<ReferenceEntry> =
            entries("scriptureReferences", raw.scripture_references);
        let topic_references: Vec<ReferenceEntry> =
            entries("topicReferences", raw.topic_references);
        if !topic_references.is_empty() {
            scripture_references.extend(topic_references);
            scripture_references.sort_by(|a, b| {
                a.date_used
                    .cmp(&b.date_used)
                    .then_with(|| a.reference.cmp(&b.reference))
            });
            scripture_references.dedup();
        }

        let mut record = Self {
            titles: entries("titles", raw.titles),
            content_hashes: entries("contentHashes", raw.content_hashes),
            scripture_references,
            recent_references: entries("recentReferences", raw.recent_references),
            themes: entries("themes", raw.themes),
            last_updated: serde_json::from_value::<Option<DateTime<Utc>>>(raw.last_updated)
                .ok()
                .flatten(),
            total_devotionals: 0,
        };
        record.enforce_recent_cap();
        record.total_devotionals = record.titles.len();
        record
    }
}

/// Parse a history list entry by entry, skipping entries that do not parse.
fn entries<T: DeserializeOwned>(list: &str, value: Value) -> Vec<T> {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => return Vec::new(),
        _ => {
            warn!(list, "history list is not an array, ignoring it");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(list, index, error = %e, "skipping unreadable history entry");
                None
            }
        })
        .collect()
}

impl HistoryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push the entries derived from an accepted candidate.
    ///
    /// Does not touch disk; [`HistoryStore::append`] wraps this with a save.
    pub fn record_candidate(&mut self, candidate: &CandidateContent) {
        let date_used = candidate.date;
        let theme = candidate.theme().map(str::to_string);

        self.titles.push(TitleEntry {
            title: candidate.title.trim().to_string(),
            date_used,
            theme: theme.clone(),
        });

        self.content_hashes.push(HashEntry {
            hash: content_hash(&candidate.body),
            date_used,
        });

        if let Some(reference) = candidate.reference() {
            let entry = ReferenceEntry {
                reference: reference.to_string(),
                date_used,
                theme: theme.clone(),
            };
            self.scripture_references.push(entry.clone());
            self.recent_references.push(entry);
            self.enforce_recent_cap();
        }

        if let Some(category) = theme {
            self.themes.push(ThemeEntry {
                category,
                date_used,
                title: candidate.title.trim().to_string(),
            });
        }
    }

    /// Drop the oldest `recentReferences` beyond the cap.
    fn enforce_recent_cap(&mut self) {
        let len = self.recent_references.len();
        if len > RECENT_REFERENCE_CAP {
            self.recent_references.drain(..len - RECENT_REFERENCE_CAP);
        }
    }

    /// Remove entries used before `cutoff` from the four long-lived lists.
    ///
    /// Each list is filtered by its own `dateUsed`. `recentReferences` is
    /// bounded by its cap and is left alone.
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> PruneReport {
        fn retain<T>(list: &mut Vec<T>, keep: impl Fn(&T) -> bool) -> usize {
            let before = list.len();
            list.retain(|e| keep(e));
            before - list.len()
        }

        PruneReport {
            titles: retain(&mut self.titles, |e| e.date_used >= cutoff),
            content_hashes: retain(&mut self.content_hashes, |e| e.date_used >= cutoff),
            references: retain(&mut self.scripture_references, |e| e.date_used >= cutoff),
            themes: retain(&mut self.themes, |e| e.date_used >= cutoff),
        }
    }

    /// Last `title_window` titles and last `reference_window` recent
    /// references, oldest first.
    pub fn recent_snapshot(&self, title_window: usize, reference_window: usize) -> RecentSnapshot {
        RecentSnapshot {
            titles: tail(&self.titles, title_window)
                .iter()
                .map(|e| e.title.clone())
                .collect(),
            references: tail(&self.recent_references, reference_window)
                .iter()
                .map(|e| e.reference.clone())
                .collect(),
        }
    }

    /// Last `n` theme categories, oldest first.
    pub fn recent_themes(&self, n: usize) -> Vec<String> {
        tail(&self.themes, n)
            .iter()
            .map(|e| e.category.clone())
            .collect()
    }

    /// The most recent use of a reference inside `recentReferences`.
    pub fn last_reference_use(&self, reference: &str) -> Option<&ReferenceEntry> {
        let wanted = normalize(reference);
        self.recent_references
            .iter()
            .rev()
            .find(|e| normalize(&e.reference) == wanted)
    }

    /// Summary counts for display.
    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            total_devotionals: self.titles.len(),
            content_hashes: self.content_hashes.len(),
            references: self.scripture_references.len(),
            recent_references: self.recent_references.len(),
            themes: self.themes.len(),
            first_used: self.titles.iter().map(|e| e.date_used).min(),
            last_used: self.titles.iter().map(|e| e.date_used).max(),
            last_updated: self.last_updated,
        }
    }
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

/// Recent activity used to build prompt exclusions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentSnapshot {
    pub titles: Vec<String>,
    pub references: Vec<String>,
}

/// How many entries each list lost during a prune.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub titles: usize,
    pub content_hashes: usize,
    pub references: usize,
    pub themes: usize,
}

impl PruneReport {
    pub fn total(&self) -> usize {
        self.titles + self.content_hashes + self.references + self.themes
    }
}

/// Summary of a history record.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStats {
    pub total_devotionals: usize,
    pub content_hashes: usize,
    pub references: usize,
    pub recent_references: usize,
    pub themes: usize,
    pub first_used: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl fmt::Display for HistoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let date = |d: Option<DateTime<Utc>>| {
            d.map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string())
        };

        writeln!(f, "Devotionals:        {}", self.total_devotionals)?;
        writeln!(f, "Content hashes:     {}", self.content_hashes)?;
        writeln!(f, "References:         {}", self.references)?;
        writeln!(
            f,
            "Recent references:  {}/{}",
            self.recent_references, RECENT_REFERENCE_CAP
        )?;
        writeln!(f, "Themes:             {}", self.themes)?;
        writeln!(f, "First used:         {}", date(self.first_used))?;
        writeln!(f, "Last used:          {}", date(self.last_used))?;
        write!(f, "Last updated:       {}", date(self.last_updated))
    }
}

/// File-backed owner of the [`HistoryRecord`].
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    record: HistoryRecord,
}

impl HistoryStore {
    /// Load the history at `path`.
    ///
    /// A missing file yields an empty record. Individual entries that cannot
    /// be read are skipped. A file that is not a history document at all is
    /// moved aside to `<path>.corrupt` so the next save cannot destroy it,
    /// and an empty record is used. An unreadable file is logged and also
    /// yields an empty record.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let record = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<HistoryRecord>(&content) {
                Ok(record) => {
                    debug!(
                        path = %path.display(),
                        titles = record.titles.len(),
                        recent_references = record.recent_references.len(),
                        "loaded history"
                    );
                    record
                }
                Err(e) => {
                    let backup = sibling_path(&path, "corrupt");
                    match fs::rename(&path, &backup) {
                        Ok(()) => warn!(
                            path = %path.display(),
                            backup = %backup.display(),
                            error = %e,
                            "history file is corrupt, moved it aside"
                        ),
                        Err(rename_err) => warn!(
                            path = %path.display(),
                            error = %e,
                            rename_error = %rename_err,
                            "history file is corrupt and could not be moved aside"
                        ),
                    }
                    HistoryRecord::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no history file yet, starting fresh");
                HistoryRecord::new()
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "could not read history file, starting with empty history"
                );
                HistoryRecord::new()
            }
        };

        Self { path, record }
    }

    /// Wrap an existing record without reading disk.
    pub fn from_record(path: impl Into<PathBuf>, record: HistoryRecord) -> Self {
        Self {
            path: path.into(),
            record,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> &HistoryRecord {
        &self.record
    }

    /// Recompute derived fields and atomically rewrite the whole file.
    ///
    /// The document is written to a sibling temporary file and renamed over
    /// the target, so readers never observe a partial write.
    pub fn save(&mut self) -> Result<(), HistoryError> {
        self.record.total_devotionals = self.record.titles.len();
        self.record.last_updated = Some(Utc::now());

        let content = serde_json::to_string_pretty(&self.record)?;
        let io_err = |source| HistoryError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = sibling_path(&self.path, "tmp");
        if let Err(e) = fs::write(&tmp, content).and_then(|()| fs::rename(&tmp, &self.path)) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }

        debug!(
            path = %self.path.display(),
            total = self.record.total_devotionals,
            "saved history"
        );
        Ok(())
    }

    /// Record an accepted candidate and persist.
    pub fn append(&mut self, candidate: &CandidateContent) -> Result<(), HistoryError> {
        self.record.record_candidate(candidate);
        self.save()
    }

    /// See [`HistoryRecord::recent_snapshot`].
    pub fn recent_snapshot(&self, title_window: usize, reference_window: usize) -> RecentSnapshot {
        self.record.recent_snapshot(title_window, reference_window)
    }

    /// See [`HistoryRecord::recent_themes`].
    pub fn recent_themes(&self, n: usize) -> Vec<String> {
        self.record.recent_themes(n)
    }

    /// Remove entries older than `retention` relative to `now`, then save.
    pub fn prune(
        &mut self,
        retention: Duration,
        now: DateTime<Utc>,
    ) -> Result<PruneReport, HistoryError> {
        let report = self.record.prune_before(now - retention);
        info!(
            removed = report.total(),
            titles = report.titles,
            content_hashes = report.content_hashes,
            references = report.references,
            themes = report.themes,
            "pruned history"
        );
        self.save()?;
        Ok(report)
    }

    pub fn stats(&self) -> HistoryStats {
        self.record.stats()
    }
}

/// `data/history.json` -> `data/history.json.<suffix>`.
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Dates are written as RFC 3339. On read, bare `YYYY-MM-DD` dates are also
/// accepted and taken as midnight UTC.
mod lenient_date {
    use chrono::{DateTime, NaiveDate, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
            .ok_or_else(|| de::Error::custom(format!("invalid date: {raw}")))
    }
}
