//! Ordered provider fallback.

use super::{Draft, Generator, GeneratorError, PromptConstraints};
use async_trait::async_trait;
use tracing::warn;

/// Tries each provider in order and returns the first draft produced.
///
/// Each provider handles its own retries; the chain only moves on once a
/// provider has given up.
#[derive(Default)]
pub struct GeneratorChain {
    providers: Vec<Box<dyn Generator>>,
}

impl GeneratorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider at the lowest priority.
    pub fn with(mut self, provider: impl Generator + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn push(&mut self, provider: Box<dyn Generator>) {
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider names in priority order.
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

#[async_trait]
impl Generator for GeneratorChain {
    async fn generate(&self, constraints: &PromptConstraints) -> Result<Draft, GeneratorError> {
        let mut failures = Vec::new();

        for provider in &self.providers {
            match provider.generate(constraints).await {
                Ok(mut draft) => {
                    if draft.generated_by.is_none() {
                        draft.generated_by = Some(provider.name().to_string());
                    }
                    return Ok(draft);
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "provider failed, trying next");
                    failures.push((provider.name().to_string(), e));
                }
            }
        }

        Err(GeneratorError::AllProvidersFailed(failures))
    }

    fn name(&self) -> &str {
        "chain"
    }
}
