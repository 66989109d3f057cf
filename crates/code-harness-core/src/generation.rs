//! Answer generation seam.
//!
//! The workflow hands an assembled prompt to a [`GenerationProvider`];
//! concrete providers live in the app crate.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::RetrievalResult;

/// A text generation backend.
///
/// Implementations must return within `timeout`, failing with
/// [`RetrievalError::Timeout`](crate::error::RetrievalError::Timeout) when
/// the budget is exceeded and
/// [`RetrievalError::ProviderUnavailable`](crate::error::RetrievalError::ProviderUnavailable)
/// when the backend cannot be reached.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o"`).
    fn model_name(&self) -> &str;
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str, timeout: Duration) -> RetrievalResult<String>;
}
