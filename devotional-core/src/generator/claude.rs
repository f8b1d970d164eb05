//! Devotional drafts from the Claude Messages API.

use super::{Draft, Generator, GeneratorError, PromptConstraints};
use crate::output::trim_to_word_limit;
use crate::prompt;
use ::claude::{Claude, Message, Request};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Configuration for [`ClaudeGenerator`].
#[derive(Debug, Clone)]
pub struct ClaudeGeneratorConfig {
    /// Model override; the client's default model is used otherwise.
    pub model: Option<String>,

    /// Maximum tokens for the response.
    pub max_tokens: usize,

    /// Sampling temperature. High by default since variety is the point.
    pub temperature: f32,

    /// Length the prompt asks for.
    pub word_target: usize,

    /// Bodies longer than this are trimmed at a sentence boundary.
    pub word_limit: usize,
}

impl Default for ClaudeGeneratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 2048,
            temperature: 0.9,
            word_target: 300,
            word_limit: 400,
        }
    }
}

impl ClaudeGeneratorConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_word_limit(mut self, word_limit: usize) -> Self {
        self.word_limit = word_limit;
        self.word_target = self.word_target.min(word_limit);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }
}

/// Generates drafts by prompting Claude for a JSON object.
pub struct ClaudeGenerator {
    client: Claude,
    config: ClaudeGeneratorConfig,
    name: String,
}

impl ClaudeGenerator {
    pub fn new(client: Claude, config: ClaudeGeneratorConfig) -> Self {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| client.model().to_string());
        Self {
            client,
            config,
            name: format!("claude:{model}"),
        }
    }

    /// Create from environment (ANTHROPIC_API_KEY).
    pub fn from_env(config: ClaudeGeneratorConfig) -> Result<Self, GeneratorError> {
        Ok(Self::new(Claude::from_env()?, config))
    }

    fn build_request(&self, constraints: &PromptConstraints) -> Request {
        let mut request = Request::new(vec![Message::user(prompt::user_prompt(constraints))])
            .with_system(prompt::system_prompt(self.config.word_target))
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);
        if let Some(model) = &self.config.model {
            request = request.with_model(model);
        }
        request
    }
}

#[async_trait]
impl Generator for ClaudeGenerator {
    async fn generate(&self, constraints: &PromptConstraints) -> Result<Draft, GeneratorError> {
        let request = self.build_request(constraints);
        debug!(
            generator = %self.name,
            excluded_titles = constraints.excluded_titles.len(),
            excluded_references = constraints.excluded_references.len(),
            "requesting draft"
        );

        let response = self.client.complete_with_retry(&request).await?;
        parse_draft(&response.text, self.config.word_limit, &response.model)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Response shape requested by the prompt. Unknown fields are kept as extras.
#[derive(Debug, Deserialize)]
struct RawDraft {
    #[serde(default)]
    title: String,
    #[serde(default, alias = "scripture", alias = "topic")]
    reference: Option<String>,
    #[serde(default, alias = "body")]
    content: String,
    #[serde(default)]
    theme: Option<String>,
    #[serde(flatten)]
    extras: BTreeMap<String, Value>,
}

/// Turn a model reply into a [`Draft`].
fn parse_draft(text: &str, word_limit: usize, model: &str) -> Result<Draft, GeneratorError> {
    let json_str = extract_json(text);
    let raw: RawDraft = serde_json::from_str(json_str)
        .map_err(|e| GeneratorError::Parse(format!("{e}: {json_str}")))?;

    let title = raw.title.trim();
    if title.is_empty() {
        return Err(GeneratorError::InvalidDraft("missing title".to_string()));
    }
    let body = raw.content.trim();
    if body.is_empty() {
        return Err(GeneratorError::InvalidDraft("missing content".to_string()));
    }

    let mut draft = Draft::new(title, trim_to_word_limit(body, word_limit))
        .with_generated_by(model);
    draft.reference = raw
        .reference
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    draft.theme = raw
        .theme
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty());
    draft.extras = raw
        .extras
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .collect();

    Ok(draft)
}

/// Extract JSON from a response that might have markdown code blocks.
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // Prose around a bare object
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return &text[start..=end];
        }
    }

    text
}
