//! Bounded regeneration loop.
//!
//! The controller turns an unconstrained generator into one that
//! (probabilistically) avoids repeating itself:
//!
//! ```text
//! Drafting -> Validating -> Accepted
//!                 |
//!                 v
//!            Tightening -> Drafting ...
//!
//! after max_attempts rejections: Fallback -> Accepted
//! ```
//!
//! Each rejection feeds the rejected title and reference back into the next
//! prompt's exclusion lists. If every attempt is rejected, one unconstrained
//! draft is force-accepted with a date suffix on its title.

use crate::candidate::CandidateContent;
use crate::config::ControllerConfig;
use crate::generator::{Draft, Generator, GeneratorError, PromptConstraints};
use crate::history::{HistoryError, HistoryStore};
use crate::novelty::{NoveltyValidator, Rejection, Verdict};
use crate::output::Devotional;
use crate::text::normalize;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("generator failed: {0}")]
    Generator(#[from] GeneratorError),

    #[error("history error: {0}")]
    History(#[from] HistoryError),
}

/// States of the regeneration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Drafting,
    Validating,
    Tightening,
    Fallback,
    Accepted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Drafting => "drafting",
            RunState::Validating => "validating",
            RunState::Tightening => "tightening",
            RunState::Fallback => "fallback",
            RunState::Accepted => "accepted",
        };
        f.write_str(s)
    }
}

/// A rejected attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedAttempt {
    pub attempt: usize,
    pub title: String,
    pub reference: Option<String>,
    pub rejection: Rejection,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The artifact to publish.
    pub devotional: Devotional,

    /// The candidate that was recorded in history.
    pub candidate: CandidateContent,

    /// Calls made to the generator, including the fallback call.
    pub generator_calls: usize,

    /// Rejected attempts, in order.
    pub rejections: Vec<RejectedAttempt>,

    /// Every state the loop passed through.
    pub transitions: Vec<RunState>,

    /// Whether the result was force-accepted.
    pub fallback: bool,
}

impl RunOutcome {
    /// Validated attempts before acceptance or fallback.
    pub fn attempts(&self) -> usize {
        if self.fallback {
            self.rejections.len()
        } else {
            self.rejections.len() + 1
        }
    }
}

/// Drives a [`Generator`] against the [`NoveltyValidator`].
pub struct RegenerationController<G> {
    generator: G,
    validator: NoveltyValidator,
    config: ControllerConfig,
}

impl<G: Generator> RegenerationController<G> {
    pub fn new(generator: G, config: ControllerConfig) -> Self {
        let validator = NoveltyValidator::new(config.novelty.clone());
        Self {
            generator,
            validator,
            config,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn validator(&self) -> &NoveltyValidator {
        &self.validator
    }

    /// Produce and record one devotional for `date`.
    ///
    /// The generator is called at most `max_attempts` times before the
    /// fallback call. Generator failures are not retried here and abort the
    /// run, as do history write failures.
    pub async fn run(
        &self,
        store: &mut HistoryStore,
        date: DateTime<Utc>,
    ) -> Result<RunOutcome, RunError> {
        let mut transitions = Vec::new();
        let mut rejections: Vec<RejectedAttempt> = Vec::new();
        let mut exclusions = ExclusionSet::new(self, store, date);

        for attempt in 1..=self.config.max_attempts {
            enter(&mut transitions, RunState::Drafting, attempt);
            let constraints = exclusions.constraints();
            let draft = self.generator.generate(&constraints).await?;
            let candidate = draft.to_candidate(date);

            enter(&mut transitions, RunState::Validating, attempt);
            match self.validator.validate(&candidate, store.record()) {
                Verdict::Accepted => {
                    store.append(&candidate)?;
                    enter(&mut transitions, RunState::Accepted, attempt);
                    info!(
                        attempt,
                        title = %candidate.title,
                        reference = candidate.reference().unwrap_or("-"),
                        generator = self.generator.name(),
                        "devotional accepted"
                    );

                    return Ok(RunOutcome {
                        devotional: Devotional::from_accepted(&draft, &candidate, false),
                        candidate,
                        generator_calls: attempt,
                        rejections,
                        transitions,
                        fallback: false,
                    });
                }
                Verdict::Rejected(rejection) => {
                    warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        code = %rejection.code(),
                        detail = %rejection,
                        title = %candidate.title,
                        "draft rejected"
                    );
                    enter(&mut transitions, RunState::Tightening, attempt);
                    exclusions.tighten(&candidate, &rejection);
                    rejections.push(RejectedAttempt {
                        attempt,
                        title: candidate.title.clone(),
                        reference: candidate.reference().map(str::to_string),
                        rejection,
                    });
                }
            }
        }

        enter(&mut transitions, RunState::Fallback, self.config.max_attempts + 1);
        let draft = self
            .generator
            .generate(&PromptConstraints::unconstrained(date.date_naive()))
            .await?;
        let candidate = fallback_candidate(&draft, date);
        store.append(&candidate)?;
        enter(&mut transitions, RunState::Accepted, self.config.max_attempts + 1);
        warn!(
            attempts = self.config.max_attempts,
            title = %candidate.title,
            "all attempts rejected, force-accepted fallback draft"
        );

        Ok(RunOutcome {
            devotional: Devotional::from_accepted(&draft, &candidate, true),
            candidate,
            generator_calls: self.config.max_attempts + 1,
            rejections,
            transitions,
            fallback: true,
        })
    }

    /// Theme rotation minus recently used themes. If everything was used
    /// recently, the full rotation is offered.
    fn theme_hints(&self, store: &HistoryStore) -> Vec<String> {
        let recent: Vec<String> = store
            .recent_themes(self.config.theme_window)
            .iter()
            .map(|t| normalize(t))
            .collect();

        let fresh: Vec<String> = self
            .config
            .themes
            .iter()
            .filter(|t| !recent.contains(&normalize(t)))
            .cloned()
            .collect();

        if fresh.is_empty() {
            self.config.themes.clone()
        } else {
            fresh
        }
    }
}

fn enter(transitions: &mut Vec<RunState>, state: RunState, attempt: usize) {
    debug!(%state, attempt, "regeneration state");
    transitions.push(state);
}

/// The forced candidate: the draft with its title date-suffixed.
fn fallback_candidate(draft: &Draft, date: DateTime<Utc>) -> CandidateContent {
    let mut candidate = draft.to_candidate(date);
    candidate.title = format!("{} ({})", candidate.title, date.format("%Y-%m-%d"));
    candidate
}

/// Exclusions that grow as attempts are rejected.
///
/// The history snapshot is always sent in full; it is already bounded by the
/// configured windows. Only the titles and references collected from this
/// run's rejected drafts are capped.
struct ExclusionSet {
    date: DateTime<Utc>,
    history_titles: Vec<String>,
    history_references: Vec<String>,
    rejected_titles: Vec<String>,
    rejected_references: Vec<String>,
    theme_hints: Vec<String>,
    additional_constraint: Option<String>,
    max_titles: usize,
    max_references: usize,
}

impl ExclusionSet {
    fn new<G: Generator>(
        controller: &RegenerationController<G>,
        store: &HistoryStore,
        date: DateTime<Utc>,
    ) -> Self {
        let config = &controller.config;
        let snapshot = store.recent_snapshot(config.title_window, config.reference_window);
        Self {
            date,
            history_titles: dedup_normalized(snapshot.titles),
            history_references: dedup_normalized(snapshot.references),
            rejected_titles: Vec::new(),
            rejected_references: Vec::new(),
            theme_hints: controller.theme_hints(store),
            additional_constraint: None,
            max_titles: config.max_excluded_titles,
            max_references: config.max_excluded_references,
        }
    }

    /// Fold a rejected candidate into the exclusions.
    fn tighten(&mut self, candidate: &CandidateContent, rejection: &Rejection) {
        let mut titles = vec![candidate.title.clone()];
        if let Some(matched) = rejection.matched_title() {
            titles.push(matched.to_string());
        }
        for title in titles {
            if !contains_normalized(&self.history_titles, &title) {
                push_bounded(&mut self.rejected_titles, title, self.max_titles);
            }
        }

        if let Some(reference) = candidate.reference() {
            if !contains_normalized(&self.history_references, reference) {
                push_bounded(
                    &mut self.rejected_references,
                    reference.to_string(),
                    self.max_references,
                );
            }
        }

        self.additional_constraint = Some(format!(
            "Your previous draft was rejected ({}: {}). \
             Produce a distinctly different title and passage.",
            rejection.code(),
            rejection
        ));
    }

    fn constraints(&self) -> PromptConstraints {
        PromptConstraints {
            date: Some(self.date.date_naive()),
            excluded_titles: [&self.history_titles[..], &self.rejected_titles[..]].concat(),
            excluded_references: [&self.history_references[..], &self.rejected_references[..]]
                .concat(),
            theme_hints: self.theme_hints.clone(),
            additional_constraint: self.additional_constraint.clone(),
        }
    }
}

fn contains_normalized(list: &[String], item: &str) -> bool {
    let key = normalize(item);
    list.iter().any(|existing| normalize(existing) == key)
}

/// Keep the last occurrence of each item, in order.
fn dedup_normalized(items: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        push_bounded(&mut out, item, usize::MAX);
    }
    out
}

/// Append `item` as the newest entry, dropping an older duplicate and then
/// the oldest entries beyond `max`.
fn push_bounded(list: &mut Vec<String>, item: String, max: usize) {
    let key = normalize(&item);
    list.retain(|existing| normalize(existing) != key);
    list.push(item);
    if list.len() > max {
        list.drain(..list.len() - max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryRecord;
    use crate::novelty::RejectionCode;
    use crate::testing::{sample_draft, ScriptedGenerator};
    use chrono::TimeZone;

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 2, 6, 0, 0).unwrap()
    }

    fn store_with(titles: &[&str]) -> (tempfile::TempDir, HistoryStore) {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let mut record = HistoryRecord::new();
        for (i, title) in titles.iter().enumerate() {
            let used = date() - chrono::Duration::days(60);
            let candidate = CandidateContent::new(*title, format!("old body {i}"), used)
                .with_reference(format!("Old Ref {i}"))
                .with_theme("hope");
            record.record_candidate(&candidate);
        }
        let store = HistoryStore::from_record(dir.path().join("history.json"), record);
        (dir, store)
    }

    #[test]
    fn test_push_bounded_dedups_and_caps() {
        let mut list = vec!["A".to_string(), "B".to_string()];
        push_bounded(&mut list, "a".to_string(), 3);
        assert_eq!(list, vec!["B", "a"]);

        push_bounded(&mut list, "C".to_string(), 3);
        push_bounded(&mut list, "D".to_string(), 3);
        assert_eq!(list, vec!["a", "C", "D"]);
    }

    #[tokio::test]
    async fn test_accepts_first_novel_draft() {
        let (_dir, mut store) = store_with(&["Walking in Faith"]);
        let generator = ScriptedGenerator::new(vec![sample_draft(
            "Morning Mercies",
            "Lamentations 3:22",
            "His mercies are new every morning.",
        )]);
        let controller = RegenerationController::new(generator, ControllerConfig::default());

        let outcome = controller.run(&mut store, date()).await.unwrap();

        assert!(!outcome.fallback);
        assert_eq!(outcome.generator_calls, 1);
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(
            outcome.transitions,
            vec![RunState::Drafting, RunState::Validating, RunState::Accepted]
        );
        assert_eq!(outcome.devotional.title, "Morning Mercies");
        assert_eq!(store.record().titles.len(), 2);
    }

    #[tokio::test]
    async fn test_first_prompt_carries_history_and_theme_hints() {
        let (_dir, mut store) = store_with(&["Walking in Faith", "Anchored Hope"]);
        let generator =
            ScriptedGenerator::new(vec![sample_draft("Fresh", "Micah 6:8", "Do justice.")]);
        let config = ControllerConfig::default()
            .with_themes(vec!["hope".into(), "joy".into()]);
        let controller = RegenerationController::new(generator, config);

        controller.run(&mut store, date()).await.unwrap();

        let calls = controller.generator().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].excluded_titles, vec!["Walking in Faith", "Anchored Hope"]);
        assert_eq!(calls[0].excluded_references, vec!["Old Ref 0", "Old Ref 1"]);
        assert_eq!(calls[0].theme_hints, vec!["joy"]);
        assert_eq!(calls[0].additional_constraint, None);
        assert_eq!(calls[0].date, Some(date().date_naive()));
    }

    #[tokio::test]
    async fn test_rejection_tightens_next_prompt() {
        let (_dir, mut store) = store_with(&["Walking in Faith"]);
        let generator = ScriptedGenerator::new(vec![
            sample_draft("Walking in Faith", "Hebrews 11:1", "Different body entirely."),
            sample_draft("Rooted and Grounded", "Colossians 2:7", "Roots go deep."),
        ]);
        let controller = RegenerationController::new(generator, ControllerConfig::default());

        let outcome = controller.run(&mut store, date()).await.unwrap();

        assert_eq!(outcome.rejections.len(), 1);
        assert_eq!(
            outcome.rejections[0].rejection.code(),
            RejectionCode::ExactTitleMatch
        );
        assert_eq!(
            outcome.transitions,
            vec![
                RunState::Drafting,
                RunState::Validating,
                RunState::Tightening,
                RunState::Drafting,
                RunState::Validating,
                RunState::Accepted,
            ]
        );

        let calls = controller.generator().calls();
        let second = &calls[1];
        assert!(second.excluded_references.contains(&"Hebrews 11:1".to_string()));
        let extra = second.additional_constraint.as_deref().unwrap();
        assert!(extra.contains("EXACT_TITLE_MATCH"));
        assert!(extra.contains("distinctly different title and passage"));
    }

    #[tokio::test]
    async fn test_only_rejected_exclusions_are_bounded() {
        let titles: Vec<String> = (0..20).map(|i| format!("History Title Number {i}")).collect();
        let title_refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        let (_dir, mut store) = store_with(&title_refs);

        // Each draft repeats a stored title outside the snapshot window.
        let drafts = (0..6)
            .map(|i| sample_draft(&titles[i], &format!("Rejected {i}"), &format!("body {i}")))
            .collect();
        let mut config = ControllerConfig::default()
            .with_windows(10, 30)
            .with_max_attempts(5);
        config.max_excluded_titles = 3;
        config.max_excluded_references = 2;
        let controller = RegenerationController::new(ScriptedGenerator::new(drafts), config);

        controller.run(&mut store, date()).await.unwrap();

        let calls = controller.generator().calls();
        for call in &calls[..5] {
            assert_eq!(call.excluded_titles[..10], titles[10..]);
            assert!(call.excluded_titles.len() <= 10 + 3);
            assert!(call.excluded_references.len() <= 20 + 2);
        }

        // After four rejections only the newest three rejected titles remain.
        assert_eq!(
            calls[4].excluded_titles[10..],
            [
                "History Title Number 1".to_string(),
                "History Title Number 2".to_string(),
                "History Title Number 3".to_string(),
            ]
        );
        assert_eq!(
            calls[4].excluded_references[20..],
            ["Rejected 2".to_string(), "Rejected 3".to_string()]
        );
    }

    #[tokio::test]
    async fn test_rejected_titles_already_in_snapshot_are_not_repeated() {
        let (_dir, mut store) = store_with(&["Walking in Faith"]);
        let generator = ScriptedGenerator::new(vec![
            sample_draft("Walking in Faith", "Old Ref 0", "Another body."),
            sample_draft("Morning Bread", "Matthew 6:11", "Daily portion."),
        ]);
        let controller = RegenerationController::new(generator, ControllerConfig::default());

        controller.run(&mut store, date()).await.unwrap();

        let second = &controller.generator().calls()[1];
        assert_eq!(second.excluded_titles, vec!["Walking in Faith"]);
        assert_eq!(second.excluded_references, vec!["Old Ref 0"]);
    }

    #[tokio::test]
    async fn test_fallback_after_max_attempts() {
        let (_dir, mut store) = store_with(&["Walking in Faith"]);
        let mut drafts: Vec<Draft> = (0..3)
            .map(|i| sample_draft("Walking in Faith", &format!("Ref {i}"), &format!("b{i}")))
            .collect();
        drafts.push(sample_draft("Walking in Faith", "John 15:5", "Abide in the vine."));
        let generator = ScriptedGenerator::new(drafts);
        let config = ControllerConfig::default().with_max_attempts(3);
        let controller = RegenerationController::new(generator, config);

        let outcome = controller.run(&mut store, date()).await.unwrap();

        assert!(outcome.fallback);
        assert_eq!(outcome.generator_calls, 4);
        assert_eq!(controller.generator().call_count(), 4);
        assert_eq!(outcome.rejections.len(), 3);
        assert_eq!(outcome.candidate.title, "Walking in Faith (2025-03-02)");
        assert!(outcome.devotional.fallback);
        assert_eq!(
            outcome.transitions[outcome.transitions.len() - 2..],
            [RunState::Fallback, RunState::Accepted]
        );

        let last_call = controller.generator().calls().pop().unwrap();
        assert!(last_call.is_unconstrained());

        // Exactly one new entry.
        assert_eq!(store.record().titles.len(), 2);
        assert_eq!(store.record().content_hashes.len(), 2);
    }

    #[tokio::test]
    async fn test_generator_failure_aborts_without_recording() {
        let (_dir, mut store) = store_with(&["Walking in Faith"]);
        let generator = ScriptedGenerator::named("flaky").then_fail("503 from provider");
        let controller = RegenerationController::new(generator, ControllerConfig::default());

        let result = controller.run(&mut store, date()).await;

        assert!(matches!(result, Err(RunError::Generator(_))));
        assert_eq!(controller.generator().call_count(), 1);
        assert_eq!(store.record().titles.len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_generator_failure_aborts() {
        let (_dir, mut store) = store_with(&["Walking in Faith"]);
        let generator = ScriptedGenerator::new(vec![sample_draft("Walking in Faith", "R", "b")]);
        let config = ControllerConfig::default().with_max_attempts(1);
        let controller = RegenerationController::new(generator, config);

        let result = controller.run(&mut store, date()).await;
        assert!(matches!(result, Err(RunError::Generator(_))));
        assert_eq!(store.record().titles.len(), 1);
    }

    #[tokio::test]
    async fn test_theme_hints_fall_back_to_full_rotation() {
        let (_dir, mut store) = store_with(&["Anchored Hope"]);
        let generator = ScriptedGenerator::new(vec![sample_draft("New", "Isaiah 40:31", "Wait.")]);
        let config = ControllerConfig::default().with_themes(vec!["Hope".into()]);
        let controller = RegenerationController::new(generator, config);

        controller.run(&mut store, date()).await.unwrap();
        assert_eq!(controller.generator().calls()[0].theme_hints, vec!["Hope"]);
    }
}
