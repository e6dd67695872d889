//! Fixtures shared by the pipeline unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use repolens_core::embedding::EmbeddingProvider;
use repolens_core::error::UpstreamError;
use repolens_core::generation::GenerationProvider;
use repolens_core::keyring::KeyRotationManager;
use repolens_core::store::memory::InMemoryStore;

use crate::app::AppContext;
use crate::config::Config;
use crate::github::{CommitInfo, RepoFile, RepoRef, RepoSource};
use crate::progress::StatusBoard;

pub const REPO_URL: &str = "https://github.com/acme/widgets";

/// Repository served from memory. `None` content stands for a binary file.
#[derive(Default)]
pub struct FakeRepo {
    pub files: Vec<(String, Option<String>)>,
    pub commits: Vec<CommitInfo>,
    pub diffs: HashMap<String, String>,
}

impl FakeRepo {
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), Some(c.to_string())))
                .collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl RepoSource for FakeRepo {
    async fn list_files(&self, _repo: &RepoRef, _branch: &str) -> Result<Vec<RepoFile>> {
        Ok(self
            .files
            .iter()
            .map(|(path, content)| RepoFile {
                path: path.clone(),
                size: content.as_ref().map_or(0, |c| c.len() as u64),
            })
            .collect())
    }

    async fn fetch_file(
        &self,
        _repo: &RepoRef,
        path: &str,
        _branch: &str,
    ) -> Result<Option<String>> {
        self.files
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, c)| c.clone())
            .ok_or_else(|| anyhow!("no such file: {}", path))
    }

    async fn list_commits(
        &self,
        _repo: &RepoRef,
        _branch: &str,
        limit: usize,
    ) -> Result<Vec<CommitInfo>> {
        Ok(self.commits.iter().take(limit).cloned().collect())
    }

    async fn fetch_diff(&self, _repo: &RepoRef, sha: &str) -> Result<String> {
        self.diffs
            .get(sha)
            .cloned()
            .ok_or_else(|| anyhow!("no diff for {}", sha))
    }
}

pub fn commit(sha: &str, day: u32) -> CommitInfo {
    CommitInfo {
        sha: sha.to_string(),
        message: format!("commit {}", sha),
        author_name: "Ada".to_string(),
        author_avatar: crate::github::DEFAULT_AVATAR.to_string(),
        date: Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap(),
    }
}

/// Embeds text as keyword counts over a fixed vocabulary.
/// Fails for any text containing `FAIL_EMBED`.
pub struct KeywordEmbedder {
    pub vocab: Vec<&'static str>,
    pub calls: Mutex<Vec<String>>,
}

impl KeywordEmbedder {
    pub fn new(vocab: &[&'static str]) -> Self {
        Self {
            vocab: vocab.to_vec(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }

    fn dims(&self) -> usize {
        self.vocab.len()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        self.calls.lock().unwrap().push(text.to_string());
        if text.contains("FAIL_EMBED") {
            return Err(UpstreamError::QuotaExhausted);
        }
        let lower = text.to_lowercase();
        Ok(self
            .vocab
            .iter()
            .map(|w| lower.matches(w).count() as f32)
            .collect())
    }
}

/// Answers every prompt with a fixed reply, recording the prompts.
/// Fails for any prompt containing `FAIL_SUMMARY`.
pub struct ScriptedGenerator {
    pub reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.contains("FAIL_SUMMARY") {
            return Err(UpstreamError::from_status(429, "slow down"));
        }
        Ok(self.reply.clone())
    }
}

pub fn test_config() -> Config {
    let mut config: Config = toml::from_str("[db]\npath = \"unused.sqlite\"\n").unwrap();
    config.generation.commit_pause_ms = 0;
    config
}

pub fn context(
    repo: FakeRepo,
    embedder: Arc<KeywordEmbedder>,
    generator: Arc<ScriptedGenerator>,
) -> AppContext {
    AppContext {
        config: test_config(),
        store: Arc::new(InMemoryStore::default()),
        source: Arc::new(repo),
        embedder,
        generator,
        embedding_keys: Arc::new(KeyRotationManager::new(vec![], None)),
        generation_keys: Arc::new(KeyRotationManager::new(vec![], None)),
        status: Arc::new(StatusBoard::new()),
    }
}
