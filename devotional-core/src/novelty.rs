//! Novelty checks for candidate devotionals.
//!
//! The validator is a pure function of a candidate and a history record. It
//! runs three checks in a fixed order and stops at the first failure:
//!
//! 1. title uniqueness (exact, then similar)
//! 2. content freshness (normalized body hash)
//! 3. reference cooldown

use crate::candidate::CandidateContent;
use crate::config::NoveltyConfig;
use crate::history::HistoryRecord;
use crate::text::{content_hash, normalize, similarity_with};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Machine-readable rejection reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    ExactTitleMatch,
    TitleTooSimilar,
    ContentDuplicated,
    ReferenceRecentlyUsed,
}

impl RejectionCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionCode::ExactTitleMatch => "EXACT_TITLE_MATCH",
            RejectionCode::TitleTooSimilar => "TITLE_TOO_SIMILAR",
            RejectionCode::ContentDuplicated => "CONTENT_DUPLICATED",
            RejectionCode::ReferenceRecentlyUsed => "REFERENCE_RECENTLY_USED",
        }
    }
}

impl fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a candidate was rejected, with the history data that caused it.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    ExactTitleMatch {
        matched_title: String,
    },
    TitleTooSimilar {
        matched_title: String,
        similarity: f64,
    },
    ContentDuplicated {
        previously_used: DateTime<Utc>,
    },
    ReferenceRecentlyUsed {
        reference: String,
        previously_used: DateTime<Utc>,
    },
}

impl Rejection {
    pub fn code(&self) -> RejectionCode {
        match self {
            Rejection::ExactTitleMatch { .. } => RejectionCode::ExactTitleMatch,
            Rejection::TitleTooSimilar { .. } => RejectionCode::TitleTooSimilar,
            Rejection::ContentDuplicated { .. } => RejectionCode::ContentDuplicated,
            Rejection::ReferenceRecentlyUsed { .. } => RejectionCode::ReferenceRecentlyUsed,
        }
    }

    /// The previously used title, if this is a title rejection.
    pub fn matched_title(&self) -> Option<&str> {
        match self {
            Rejection::ExactTitleMatch { matched_title }
            | Rejection::TitleTooSimilar { matched_title, .. } => Some(matched_title),
            _ => None,
        }
    }

    /// When the conflicting content was previously used, if known.
    pub fn previously_used(&self) -> Option<DateTime<Utc>> {
        match self {
            Rejection::ContentDuplicated { previously_used }
            | Rejection::ReferenceRecentlyUsed {
                previously_used, ..
            } => Some(*previously_used),
            _ => None,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::ExactTitleMatch { matched_title } => {
                write!(f, "title already used: \"{matched_title}\"")
            }
            Rejection::TitleTooSimilar {
                matched_title,
                similarity,
            } => write!(
                f,
                "title is {:.0}% similar to \"{matched_title}\"",
                similarity * 100.0
            ),
            Rejection::ContentDuplicated { previously_used } => write!(
                f,
                "identical content was used on {}",
                previously_used.format("%Y-%m-%d")
            ),
            Rejection::ReferenceRecentlyUsed {
                reference,
                previously_used,
            } => write!(
                f,
                "\"{reference}\" was used on {}",
                previously_used.format("%Y-%m-%d")
            ),
        }
    }
}

/// Outcome of validating one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted,
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Verdict::Accepted => None,
            Verdict::Rejected(r) => Some(r),
        }
    }

    pub fn code(&self) -> Option<RejectionCode> {
        self.rejection().map(Rejection::code)
    }
}

/// Decides whether a candidate is novel enough to publish.
#[derive(Debug, Clone, Default)]
pub struct NoveltyValidator {
    config: NoveltyConfig,
}

impl NoveltyValidator {
    pub fn new(config: NoveltyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NoveltyConfig {
        &self.config
    }

    /// Run all checks in order; the first failure wins.
    pub fn validate(&self, candidate: &CandidateContent, history: &HistoryRecord) -> Verdict {
        let rejection = self
            .check_title(candidate, history)
            .or_else(|| self.check_content(candidate, history))
            .or_else(|| self.check_reference(candidate, history));

        match rejection {
            Some(r) => Verdict::Rejected(r),
            None => Verdict::Accepted,
        }
    }

    fn check_title(
        &self,
        candidate: &CandidateContent,
        history: &HistoryRecord,
    ) -> Option<Rejection> {
        let title = normalize(&candidate.title);

        if let Some(entry) = history.titles.iter().find(|e| normalize(&e.title) == title) {
            return Some(Rejection::ExactTitleMatch {
                matched_title: entry.title.clone(),
            });
        }

        let threshold = self.config.title_similarity_threshold;
        history
            .titles
            .iter()
            .map(|e| {
                let score = similarity_with(&candidate.title, &e.title, self.config.min_token_len);
                (e, score)
            })
            .filter(|(_, score)| *score >= threshold)
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(entry, score)| Rejection::TitleTooSimilar {
                matched_title: entry.title.clone(),
                similarity: score,
            })
    }

    fn check_content(
        &self,
        candidate: &CandidateContent,
        history: &HistoryRecord,
    ) -> Option<Rejection> {
        let hash = content_hash(&candidate.body);
        history
            .content_hashes
            .iter()
            .find(|e| e.hash == hash)
            .map(|e| Rejection::ContentDuplicated {
                previously_used: e.date_used,
            })
    }

    fn check_reference(
        &self,
        candidate: &CandidateContent,
        history: &HistoryRecord,
    ) -> Option<Rejection> {
        let reference = candidate.reference()?;
        let entry = history.last_reference_use(reference)?;

        let elapsed = candidate.date.signed_duration_since(entry.date_used);
        (elapsed < self.config.reference_cooldown).then(|| Rejection::ReferenceRecentlyUsed {
            reference: entry.reference.clone(),
            previously_used: entry.date_used,
        })
    }
}
