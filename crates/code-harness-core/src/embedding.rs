//! Embedding provider trait, embedding client and vector utilities.
//!
//! Concrete providers (OpenAI, Ollama) live in the `code-harness` app
//! crate. This module defines the seam they plug into and the
//! [`EmbeddingClient`] the query workflow embeds through.
//!
//! # Deterministic fallback
//!
//! When no provider credentials are configured and the configuration
//! permits it, [`EmbeddingClient::embed`] returns [`fallback_embedding`]:
//! a vector derived from SHA-256 over the whitespace-normalized text.
//! Equal inputs always produce equal vectors, so retrieval stays
//! reproducible without a live model.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::error::{RetrievalError, RetrievalResult};
use crate::text::normalize_whitespace;

/// Trait for embedding providers.
///
/// Implementations fail with [`RetrievalError::ProviderUnavailable`]
/// when the backing model cannot be reached.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a single text.
    async fn embed(&self, text: &str) -> RetrievalResult<Vec<f32>>;
}

/// Builds the provider on first use.
///
/// Returning `Ok(None)` means "no valid credentials configured", which
/// the client may answer with the deterministic fallback.
pub type ProviderFactory =
    Box<dyn Fn() -> RetrievalResult<Option<Arc<dyn EmbeddingProvider>>> + Send + Sync>;

/// Process-lifetime embedding client.
///
/// Constructed once by the caller and passed by reference into the
/// workflow. The provider is built lazily on the first call to
/// [`embed`](Self::embed) and reused afterwards; concurrent first use
/// still constructs it exactly once.
pub struct EmbeddingClient {
    factory: ProviderFactory,
    provider: OnceLock<Option<Arc<dyn EmbeddingProvider>>>,
    allow_fallback: bool,
    fallback_dims: usize,
}

impl EmbeddingClient {
    /// Create a client whose provider is built lazily by `factory`.
    pub fn new(factory: ProviderFactory, allow_fallback: bool, fallback_dims: usize) -> Self {
        Self {
            factory,
            provider: OnceLock::new(),
            allow_fallback,
            fallback_dims,
        }
    }

    /// Create a client around an already-built provider.
    pub fn with_provider(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let dims = provider.dims();
        let client = Self::new(Box::new(|| Ok(None)), false, dims);
        let _ = client.provider.set(Some(provider));
        client
    }

    /// Create a client with no provider that always uses the fallback.
    pub fn fallback_only(dims: usize) -> Self {
        Self::new(Box::new(|| Ok(None)), true, dims)
    }

    fn provider(&self) -> Option<Arc<dyn EmbeddingProvider>> {
        self.provider
            .get_or_init(|| match (self.factory)() {
                Ok(provider) => provider,
                Err(e) => {
                    warn!(error = %e, "embedding provider could not be constructed");
                    None
                }
            })
            .clone()
    }

    /// Whether embeddings currently come from the deterministic fallback.
    pub fn uses_fallback(&self) -> bool {
        self.provider().is_none() && self.allow_fallback
    }

    /// Dimensionality of the vectors this client produces.
    pub fn dims(&self) -> usize {
        self.provider()
            .map(|p| p.dims())
            .unwrap_or(self.fallback_dims)
    }

    /// Embed `text` through the provider, or the fallback when permitted.
    pub async fn embed(&self, text: &str) -> RetrievalResult<Vec<f32>> {
        match self.provider() {
            Some(provider) => provider.embed(text).await,
            None if self.allow_fallback => {
                debug!(dims = self.fallback_dims, "using deterministic fallback embedding");
                Ok(fallback_embedding(text, self.fallback_dims))
            }
            None => Err(RetrievalError::provider(
                "no embedding provider configured and fallback is disabled",
            )),
        }
    }
}

/// Deterministic pseudo-embedding of `text` with `dims` components in `[-1, 1]`.
///
/// The normalized text is hashed with SHA-256 together with a block
/// counter; each digest byte becomes one component. Empty text yields the
/// zero vector.
///
/// ```rust
/// use code_harness_core::embedding::fallback_embedding;
///
/// let a = fallback_embedding("foo", 64);
/// assert_eq!(a, fallback_embedding("  foo ", 64));
/// assert_ne!(a, fallback_embedding("bar", 64));
/// ```
pub fn fallback_embedding(text: &str, dims: usize) -> Vec<f32> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return vec![0.0; dims];
    }

    let mut out = Vec::with_capacity(dims);
    let mut block: u32 = 0;
    while out.len() < dims {
        let mut hasher = Sha256::new();
        hasher.update(block.to_le_bytes());
        hasher.update(normalized.as_bytes());
        let digest = hasher.finalize();
        for byte in digest.iter() {
            if out.len() == dims {
                break;
            }
            out.push((*byte as f32 / 255.0) * 2.0 - 1.0);
        }
        block += 1;
    }
    out
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use code_harness_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, and zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine distance, `1 - cosine_similarity`, in `[0.0, 2.0]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b) as f64
}
