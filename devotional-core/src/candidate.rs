//! A generated devotional that has not been accepted yet.

use chrono::{DateTime, Utc};

/// Transient content under evaluation.
///
/// `date` is the instant the content is generated for. It becomes the
/// `dateUsed` of every history entry the candidate produces and is the
/// "now" that reference cooldowns are measured against.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateContent {
    pub title: String,
    pub reference: Option<String>,
    pub body: String,
    pub theme: Option<String>,
    pub date: DateTime<Utc>,
}

impl CandidateContent {
    pub fn new(title: impl Into<String>, body: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            reference: None,
            body: body.into(),
            theme: None,
            date,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    /// The reference, if present and not blank.
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref().map(str::trim).filter(|r| !r.is_empty())
    }

    /// The theme, if present and not blank.
    pub fn theme(&self) -> Option<&str> {
        self.theme.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}
