//! # Code Harness Core
//!
//! Retrieval and context assembly for a hierarchical document corpus:
//! data models, error taxonomy, store abstraction, hybrid search with
//! Reciprocal Rank Fusion, context expansion, reference resolution and the
//! query workflow that ties them together.
//!
//! This crate contains no tokio, sqlx, network or filesystem
//! dependencies. Storage and model providers plug in through the
//! [`store::CorpusStore`], [`embedding::EmbeddingProvider`] and
//! [`generation::GenerationProvider`] traits.

pub mod context;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod references;
pub mod search;
pub mod store;
pub mod text;
pub mod workflow;

pub use error::{RetrievalError, RetrievalResult};
