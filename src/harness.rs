//! Process-lifetime dependencies shared by every command.
//!
//! A [`Harness`] is opened once from the configuration and passed by
//! reference to the entry points in [`crate::search`], [`crate::query`]
//! and [`crate::section`]. It owns the read-only SQLite store, the
//! embedding client and the optional generation provider.

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use code_harness_core::embedding::EmbeddingClient;
use code_harness_core::generation::GenerationProvider;
use code_harness_core::workflow::QueryWorkflow;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedding_client;
use crate::generation::create_generation_provider;
use crate::sqlite_store::SqliteStore;

/// Store, embedding client and generation provider built from one [`Config`].
pub struct Harness {
    config: Config,
    store: SqliteStore,
    embedder: EmbeddingClient,
    generator: Option<Arc<dyn GenerationProvider>>,
}

impl Harness {
    /// Connect to the corpus database and build the providers.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let generator = create_generation_provider(&config.generation)?;
        debug!(
            db = %config.db.path.display(),
            embedding = %config.embedding.provider,
            generation = generator.as_ref().map(|g| g.model_name()).unwrap_or("disabled"),
            "harness opened"
        );
        Ok(Self {
            config: config.clone(),
            store: SqliteStore::new(pool),
            embedder: create_embedding_client(&config.embedding),
            generator,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn embedder(&self) -> &EmbeddingClient {
        &self.embedder
    }

    /// A query workflow over this harness's dependencies.
    pub fn workflow(&self) -> QueryWorkflow<'_, SqliteStore> {
        QueryWorkflow::new(&self.store, &self.embedder, self.config.workflow_settings())
            .with_generator(self.generator.as_deref())
    }

    /// Close the connection pool.
    pub async fn close(self) {
        self.store.pool().close().await;
    }
}
