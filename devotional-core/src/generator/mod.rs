//! Content generators.
//!
//! The regeneration loop only sees the [`Generator`] trait. Provider choice
//! is a strategy object: a single [`ClaudeGenerator`], or a
//! [`GeneratorChain`] that falls through an ordered list of providers.

mod chain;
mod claude;

pub use self::chain::GeneratorChain;
pub use self::claude::{ClaudeGenerator, ClaudeGeneratorConfig};

use crate::candidate::CandidateContent;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from producing a draft.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Claude API error: {0}")]
    Client(#[from] ::claude::Error),

    #[error("Failed to parse generated draft: {0}")]
    Parse(String),

    #[error("Generated draft is unusable: {0}")]
    InvalidDraft(String),

    #[error("Generator unavailable: {0}")]
    Unavailable(String),

    #[error("All providers failed: {}", describe_failures(.0))]
    AllProvidersFailed(Vec<(String, GeneratorError)>),
}

fn describe_failures(failures: &[(String, GeneratorError)]) -> String {
    if failures.is_empty() {
        return "no providers configured".to_string();
    }
    failures
        .iter()
        .map(|(name, e)| format!("{name}: {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// What the next draft must avoid, and what it should lean toward.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptConstraints {
    /// The day the devotional is written for.
    pub date: Option<NaiveDate>,

    /// Titles that must not be reused or closely paraphrased.
    pub excluded_titles: Vec<String>,

    /// Scripture or topic references that must not be used.
    pub excluded_references: Vec<String>,

    /// Themes the draft may pick from.
    pub theme_hints: Vec<String>,

    /// Free-text instruction added after a rejection.
    pub additional_constraint: Option<String>,
}

impl PromptConstraints {
    /// No exclusions, hints or extra instructions; only the date.
    pub fn unconstrained(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Self::default()
        }
    }

    /// Whether nothing beyond the date is being asked of the generator.
    pub fn is_unconstrained(&self) -> bool {
        self.excluded_titles.is_empty()
            && self.excluded_references.is_empty()
            && self.theme_hints.is_empty()
            && self.additional_constraint.is_none()
    }
}

/// Raw output of a generator, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub title: String,
    pub reference: Option<String>,
    pub body: String,
    pub theme: Option<String>,

    /// Provider-specific fields (prayer, reflection questions, ...) carried
    /// unchanged into the output artifact.
    pub extras: BTreeMap<String, Value>,

    /// Name of the provider or model that produced the draft.
    pub generated_by: Option<String>,
}

impl Draft {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            reference: None,
            body: body.into(),
            theme: None,
            extras: BTreeMap::new(),
            generated_by: None,
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

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn with_generated_by(mut self, source: impl Into<String>) -> Self {
        self.generated_by = Some(source.into());
        self
    }

    /// The candidate the validator will judge.
    pub fn to_candidate(&self, date: DateTime<Utc>) -> CandidateContent {
        CandidateContent {
            title: self.title.trim().to_string(),
            reference: self.reference.clone(),
            body: self.body.clone(),
            theme: self.theme.clone(),
            date,
        }
    }
}

/// A source of devotional drafts.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce one draft honoring `constraints` as well as the provider can.
    async fn generate(&self, constraints: &PromptConstraints) -> Result<Draft, GeneratorError>;

    /// Name used in logs and in the output artifact.
    fn name(&self) -> &str;
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for Box<G> {
    async fn generate(&self, constraints: &PromptConstraints) -> Result<Draft, GeneratorError> {
        (**self).generate(constraints).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
