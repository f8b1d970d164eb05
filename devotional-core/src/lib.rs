//! Daily devotional generation with history-backed novelty checking.
//!
//! This crate provides:
//! - A durable history of accepted devotionals (titles, content hashes,
//!   references, themes)
//! - A pure novelty validator (title similarity, duplicate content,
//!   reference cooldown)
//! - A bounded regeneration loop around a pluggable [`Generator`]
//! - JSON and Markdown output
//!
//! # Quick Start
//!
//! ```ignore
//! use devotional_core::{ClaudeGenerator, ControllerConfig, HistoryStore, RegenerationController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = HistoryStore::load("data/history.json");
//!     let generator = ClaudeGenerator::from_env(Default::default())?;
//!     let controller = RegenerationController::new(generator, ControllerConfig::default());
//!
//!     let outcome = controller.run(&mut store, chrono::Utc::now()).await?;
//!     println!("{}", outcome.devotional.title);
//!     Ok(())
//! }
//! ```

pub mod candidate;
pub mod config;
pub mod controller;
pub mod generator;
pub mod history;
pub mod novelty;
pub mod output;
pub mod prompt;
pub mod testing;
pub mod text;

// Primary public API
pub use candidate::CandidateContent;
pub use config::{ControllerConfig, NoveltyConfig};
pub use controller::{RegenerationController, RejectedAttempt, RunError, RunOutcome, RunState};
pub use generator::{
    ClaudeGenerator, ClaudeGeneratorConfig, Draft, Generator, GeneratorChain, GeneratorError,
    PromptConstraints,
};
pub use history::{HistoryError, HistoryRecord, HistoryStats, HistoryStore, PruneReport};
pub use novelty::{NoveltyValidator, Rejection, RejectionCode, Verdict};
pub use output::{Devotional, DevotionalWriter, OutputError};
pub use testing::ScriptedGenerator;
