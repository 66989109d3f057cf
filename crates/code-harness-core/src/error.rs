//! Classified error taxonomy for the retrieval core.
//!
//! Every core operation returns [`RetrievalResult`]. Recoverable
//! conditions (missing embedding credentials, generation timeout) are
//! absorbed by the stage that owns them and surfaced as a fallback flag;
//! the rest propagate to the caller unchanged.

/// Errors raised by the retrieval and context assembly engine.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// Embedding or generation provider unreachable or misconfigured.
    #[error("provider unavailable: {reason}")]
    ProviderUnavailable { reason: String },

    /// The similarity index, text index or hierarchy tables cannot be queried.
    #[error("index unavailable: {reason}")]
    IndexUnavailable { reason: String },

    /// Cyclic or inconsistent hierarchy/reference data.
    #[error("corpus integrity error: {details}")]
    CorpusIntegrity { details: String },

    /// The generation call exceeded its time budget.
    #[error("provider timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    /// Malformed query options.
    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },
}

impl RetrievalError {
    pub fn provider(reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            reason: reason.into(),
        }
    }

    pub fn index(reason: impl Into<String>) -> Self {
        Self::IndexUnavailable {
            reason: reason.into(),
        }
    }

    pub fn integrity(details: impl Into<String>) -> Self {
        Self::CorpusIntegrity {
            details: details.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
        }
    }

    /// Stable snake_case label, used in logs and by callers that branch on kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::IndexUnavailable { .. } => "index_unavailable",
            Self::CorpusIntegrity { .. } => "corpus_integrity",
            Self::Timeout { .. } => "timeout",
            Self::InvalidQuery { .. } => "invalid_query",
        }
    }

    /// Whether a stage may absorb this error with an explicit fallback.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable { .. } | Self::Timeout { .. })
    }
}

pub type RetrievalResult<T> = Result<T, RetrievalError>;
