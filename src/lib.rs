//! # Code Harness
//!
//! Retrieval and context assembly over a building-code corpus.
//!
//! Code Harness reads a corpus of sections, tables and figures that a
//! separate ingestion process has written to SQLite, and answers questions
//! about it. Retrieval combines embedding similarity with FTS5 keyword
//! search through Reciprocal Rank Fusion; hits are expanded with their
//! ancestors, descendants and cross-references before an answer is
//! generated.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────┐   ┌────────────┐
//! │   CLI    │──▶│  code-harness-core    │──▶│ SqliteStore │
//! │  (chx)   │   │ search/context/refs/  │   │ FTS5 + BLOB │
//! └──────────┘   │ workflow              │   └────────────┘
//!                └──────────┬────────────┘
//!                           ▼
//!                 ┌───────────────────┐
//!                 │ Embedding / LLM   │
//!                 │ OpenAI, Ollama    │
//!                 └───────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Read-only database connection |
//! | [`sqlite_store`] | `CorpusStore` over SQLite |
//! | [`embedding`] | Embedding providers (OpenAI, Ollama) |
//! | [`generation`] | Answer generation provider |
//! | [`harness`] | Process-lifetime dependencies |
//! | [`search`] | Retrieval-only search |
//! | [`query`] | Question answering |
//! | [`section`] | Direct section lookup |

pub mod config;
pub mod db;
pub mod embedding;
pub mod generation;
pub mod harness;
pub mod query;
pub mod search;
pub mod section;
pub mod sqlite_store;
