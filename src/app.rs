//! Shared application state.
//!
//! [`AppContext`] bundles the store, the providers, the key pools and the
//! progress board. The CLI builds one per command; the server builds one at
//! startup and shares it across handlers behind an `Arc`.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use repolens_core::embedding::EmbeddingProvider;
use repolens_core::generation::GenerationProvider;
use repolens_core::keyring::KeyRotationManager;
use repolens_core::models::Project;
use repolens_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::github::{GithubClient, RepoSource};
use crate::progress::{FanOut, IngestProgressReporter, StatusBoard};
use crate::sqlite_store::SqliteStore;
use crate::upstream::pool_from_env;

/// Returned when a project id does not resolve. The server maps it to 404.
#[derive(Debug, thiserror::Error)]
#[error("Project not found: {0}")]
pub struct ProjectNotFound(pub String);

pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub source: Arc<dyn RepoSource>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn GenerationProvider>,
    pub embedding_keys: Arc<KeyRotationManager>,
    pub generation_keys: Arc<KeyRotationManager>,
    pub status: Arc<StatusBoard>,
}

impl AppContext {
    /// Open the database and build providers from `config` and the environment.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

        let embedding_keys = Arc::new(pool_from_env(&config.embedding.keys));
        let generation_keys = Arc::new(pool_from_env(&config.generation.keys));
        if config.embedding.is_enabled() && embedding_keys.is_empty() && !embedding_keys.has_fallback()
        {
            tracing::warn!(
                prefix = %config.embedding.keys.env_prefix,
                "embedding is enabled but no API keys were found"
            );
        }
        if config.generation.is_enabled()
            && generation_keys.is_empty()
            && !generation_keys.has_fallback()
        {
            tracing::warn!(
                prefix = %config.generation.keys.env_prefix,
                "generation is enabled but no API keys were found"
            );
        }

        let embedder = create_embedder(&config.embedding, embedding_keys.clone())?;
        let generator = create_generator(&config.generation, generation_keys.clone())?;
        let source: Arc<dyn RepoSource> = Arc::new(GithubClient::new(&config.github)?);

        Ok(Self {
            config,
            store,
            source,
            embedder,
            generator,
            embedding_keys,
            generation_keys,
            status: Arc::new(StatusBoard::new()),
        })
    }

    /// Look up a project, failing with [`ProjectNotFound`].
    pub async fn project(&self, id: &str) -> Result<Project> {
        self.store
            .get_project(id)
            .await?
            .ok_or_else(|| anyhow!(ProjectNotFound(id.to_string())))
    }

    /// A reporter that updates the status board and also forwards to `extra`.
    pub fn progress_with(&self, extra: Arc<dyn IngestProgressReporter>) -> FanOut {
        FanOut(vec![self.status.clone(), extra])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::index_project;
    use crate::progress::{IngestPhase, NoProgress};
    use crate::test_support::*;

    #[tokio::test]
    async fn progress_with_updates_the_status_board() {
        let ctx = context(
            FakeRepo::with_files(&[("src/lib.rs", "pub fn login() {}")]),
            Arc::new(KeywordEmbedder::new(&["login"])),
            Arc::new(ScriptedGenerator::new("Exports login.")),
        );
        let project = Project::new("widgets", REPO_URL, "main");
        ctx.store.create_project(&project).await.unwrap();

        let reporter = ctx.progress_with(Arc::new(NoProgress));
        index_project(&ctx, &project, &reporter).await.unwrap();

        let status = ctx.status.get(&project.id).unwrap();
        assert_eq!(status.phase, IngestPhase::Finished);
    }

    #[tokio::test]
    async fn missing_project_is_typed() {
        let ctx = context(
            FakeRepo::default(),
            Arc::new(KeywordEmbedder::new(&[])),
            Arc::new(ScriptedGenerator::new("")),
        );
        let err = ctx.project("nope").await.unwrap_err();
        assert_eq!(err.to_string(), "Project not found: nope");
        assert!(err.downcast_ref::<ProjectNotFound>().is_some());
    }
}
