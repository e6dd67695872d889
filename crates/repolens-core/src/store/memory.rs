//! In-memory [`Store`] implementation for tests.
//!
//! Uses `Vec`s and a `HashMap` behind `std::sync::RwLock`.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{CommitRecord, ContentChunk, Project, QuestionRecord};
use crate::tree::FileNode;

use super::Store;

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    projects: RwLock<Vec<Project>>,
    trees: RwLock<HashMap<String, Vec<FileNode>>>,
    chunks: RwLock<Vec<ContentChunk>>,
    commits: RwLock<Vec<CommitRecord>>,
    questions: RwLock<Vec<QuestionRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_project(&self, project: &Project) -> Result<()> {
        let mut projects = self.projects.write().unwrap_or_else(PoisonError::into_inner);
        if projects.iter().any(|p| p.id == project.id) {
            bail!("project {} already exists", project.id);
        }
        projects.push(project.clone());
        Ok(())
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let projects = self.projects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(projects.iter().find(|p| p.id == id).cloned())
    }

    async fn list_projects(&self, include_archived: bool) -> Result<Vec<Project>> {
        let projects = self.projects.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<Project> = projects
            .iter()
            .filter(|p| include_archived || !p.is_archived())
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn archive_project(&self, id: &str) -> Result<bool> {
        let mut projects = self.projects.write().unwrap_or_else(PoisonError::into_inner);
        match projects.iter_mut().find(|p| p.id == id) {
            Some(p) => {
                p.archived_at.get_or_insert_with(Utc::now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_file_tree(&self, project_id: &str, tree: &[FileNode]) -> Result<()> {
        self.trees
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(project_id.to_string(), tree.to_vec());
        Ok(())
    }

    async fn get_file_tree(&self, project_id: &str) -> Result<Option<Vec<FileNode>>> {
        let trees = self.trees.read().unwrap_or_else(PoisonError::into_inner);
        Ok(trees.get(project_id).cloned())
    }

    async fn insert_chunk(&self, chunk: &ContentChunk) -> Result<()> {
        self.chunks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(chunk.clone());
        Ok(())
    }

    async fn list_chunks(&self, project_id: &str) -> Result<Vec<ContentChunk>> {
        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        Ok(chunks
            .iter()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn insert_commits(&self, commits: &[CommitRecord]) -> Result<usize> {
        let mut stored = self.commits.write().unwrap_or_else(PoisonError::into_inner);
        let mut inserted = 0;
        for c in commits {
            let exists = stored
                .iter()
                .any(|s| s.project_id == c.project_id && s.commit_hash == c.commit_hash);
            if !exists {
                stored.push(c.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn list_commits(&self, project_id: &str) -> Result<Vec<CommitRecord>> {
        let stored = self.commits.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<CommitRecord> = stored
            .iter()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.committed_at.cmp(&a.committed_at));
        Ok(out)
    }

    async fn save_question(&self, question: &QuestionRecord) -> Result<()> {
        self.questions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(question.clone());
        Ok(())
    }

    async fn list_questions(&self, project_id: &str) -> Result<Vec<QuestionRecord>> {
        let stored = self.questions.read().unwrap_or_else(PoisonError::into_inner);
        // Reverse insertion order so equal timestamps still list newest first.
        let mut out: Vec<QuestionRecord> = stored
            .iter()
            .rev()
            .filter(|q| q.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}
