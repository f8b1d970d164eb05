//! Tunables for novelty checking and the regeneration loop.

use chrono::Duration;

/// Thresholds used by the [`NoveltyValidator`](crate::novelty::NoveltyValidator).
#[derive(Debug, Clone, PartialEq)]
pub struct NoveltyConfig {
    /// Titles scoring at or above this Jaccard similarity are rejected.
    pub title_similarity_threshold: f64,

    /// Minimum time before a reference may be used again.
    pub reference_cooldown: Duration,

    /// Tokens of this many characters or fewer are ignored by the
    /// similarity metric.
    pub min_token_len: usize,
}

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            title_similarity_threshold: 0.7,
            reference_cooldown: Duration::days(21),
            min_token_len: 3,
        }
    }
}

impl NoveltyConfig {
    pub fn with_title_similarity_threshold(mut self, threshold: f64) -> Self {
        self.title_similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_reference_cooldown(mut self, cooldown: Duration) -> Self {
        self.reference_cooldown = cooldown;
        self
    }
}

/// Configuration for the [`RegenerationController`](crate::controller::RegenerationController).
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Draft/validate cycles before falling back.
    pub max_attempts: usize,

    /// Recent titles taken from history for the first prompt.
    pub title_window: usize,

    /// Recent references taken from history for the first prompt.
    pub reference_window: usize,

    /// Cap on excluded titles sent in any prompt.
    pub max_excluded_titles: usize,

    /// Cap on excluded references sent in any prompt.
    pub max_excluded_references: usize,

    /// Themes used within this many accepted entries are not hinted.
    pub theme_window: usize,

    /// Theme rotation offered to the generator as hints.
    pub themes: Vec<String>,

    /// Validator thresholds.
    pub novelty: NoveltyConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            title_window: 10,
            reference_window: 30,
            max_excluded_titles: 15,
            max_excluded_references: 45,
            theme_window: 7,
            themes: default_themes(),
            novelty: NoveltyConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of attempts before the fallback path. At least one.
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_themes(mut self, themes: Vec<String>) -> Self {
        self.themes = themes;
        self
    }

    pub fn with_novelty(mut self, novelty: NoveltyConfig) -> Self {
        self.novelty = novelty;
        self
    }

    pub fn with_windows(mut self, title_window: usize, reference_window: usize) -> Self {
        self.title_window = title_window;
        self.reference_window = reference_window;
        self
    }
}

fn default_themes() -> Vec<String> {
    [
        "faith",
        "hope",
        "love",
        "grace",
        "forgiveness",
        "gratitude",
        "peace",
        "perseverance",
        "wisdom",
        "humility",
        "prayer",
        "service",
        "courage",
        "joy",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.max_excluded_titles, 15);
        assert_eq!(config.max_excluded_references, 45);
        assert_eq!(config.novelty.title_similarity_threshold, 0.7);
        assert_eq!(config.novelty.reference_cooldown, Duration::days(21));
        assert!(!config.themes.is_empty());
    }

    #[test]
    fn test_max_attempts_is_at_least_one() {
        let config = ControllerConfig::new().with_max_attempts(0);
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn test_threshold_is_clamped() {
        let config = NoveltyConfig::default().with_title_similarity_threshold(1.5);
        assert_eq!(config.title_similarity_threshold, 1.0);
    }
}
