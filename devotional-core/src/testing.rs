//! Testing utilities.
//!
//! - `ScriptedGenerator` for deterministic runs without API calls
//! - `sample_draft` for tests that don't care about wording

use crate::generator::{Draft, Generator, GeneratorError, PromptConstraints};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// A scripted step: either a draft or a failure message.
#[derive(Debug, Clone)]
enum Step {
    Draft(Draft),
    Fail(String),
}

/// A generator that returns scripted drafts in order.
///
/// Every call's constraints are recorded so tests can inspect how the
/// prompt tightened between attempts. Once the script runs out, calls fail
/// with [`GeneratorError::Unavailable`].
pub struct ScriptedGenerator {
    name: String,
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<PromptConstraints>>,
}

impl ScriptedGenerator {
    /// Create a generator that returns `drafts` in order.
    pub fn new(drafts: Vec<Draft>) -> Self {
        Self {
            name: "scripted".to_string(),
            steps: Mutex::new(drafts.into_iter().map(Step::Draft).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create an empty script with a custom name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::new(Vec::new())
        }
    }

    /// Queue a draft.
    pub fn then_draft(self, draft: Draft) -> Self {
        lock(&self.steps).push_back(Step::Draft(draft));
        self
    }

    /// Queue a failure.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        lock(&self.steps).push_back(Step::Fail(message.into()));
        self
    }

    /// Constraints passed to each call so far, in order.
    pub fn calls(&self) -> Vec<PromptConstraints> {
        lock(&self.calls).clone()
    }

    /// Number of `generate` calls so far.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Scripted steps not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.steps).len()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, constraints: &PromptConstraints) -> Result<Draft, GeneratorError> {
        lock(&self.calls).push(constraints.clone());

        match lock(&self.steps).pop_front() {
            Some(Step::Draft(draft)) => Ok(draft),
            Some(Step::Fail(message)) => Err(GeneratorError::Unavailable(message)),
            None => Err(GeneratorError::Unavailable(
                "no more scripted drafts".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A draft with a reference and theme, for tests that don't care about the
/// exact wording.
pub fn sample_draft(title: &str, reference: &str, body: &str) -> Draft {
    Draft::new(title, body)
        .with_reference(reference)
        .with_theme("faith")
        .with_extra("prayer", "Lord, make me attentive today.")
}
