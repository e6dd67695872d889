//! Storage abstraction for RepoLens.
//!
//! The [`Store`] trait covers everything the ingestion, commit-polling and
//! question-answering pipelines persist: projects, retrieval chunks,
//! summarized commits, saved questions, and each project's file tree.
//!
//! Implementations must be `Send + Sync` to work with async runtimes. The
//! SQLite backend lives in the app crate; [`memory::InMemoryStore`] backs
//! tests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CommitRecord, ContentChunk, Project, QuestionRecord};
use crate::tree::FileNode;

/// Abstract storage backend for RepoLens.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_project`](Store::create_project) | Insert a new project |
/// | [`get_project`](Store::get_project) | Look a project up by id |
/// | [`list_projects`](Store::list_projects) | Projects, newest first |
/// | [`archive_project`](Store::archive_project) | Soft-delete a project |
/// | [`set_file_tree`](Store::set_file_tree) / [`get_file_tree`](Store::get_file_tree) | Ingested file layout |
/// | [`insert_chunk`](Store::insert_chunk) / [`list_chunks`](Store::list_chunks) | Retrieval corpus |
/// | [`insert_commits`](Store::insert_commits) / [`list_commits`](Store::list_commits) | Commit summaries |
/// | [`save_question`](Store::save_question) / [`list_questions`](Store::list_questions) | Q&A history |
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_project(&self, project: &Project) -> Result<()>;

    async fn get_project(&self, id: &str) -> Result<Option<Project>>;

    /// All projects ordered by `created_at` descending. Archived projects
    /// are included only when `include_archived` is set.
    async fn list_projects(&self, include_archived: bool) -> Result<Vec<Project>>;

    /// Set `archived_at`. Returns `false` if the project does not exist.
    /// Archiving an archived project keeps the first timestamp.
    async fn archive_project(&self, id: &str) -> Result<bool>;

    async fn set_file_tree(&self, project_id: &str, tree: &[FileNode]) -> Result<()>;

    async fn get_file_tree(&self, project_id: &str) -> Result<Option<Vec<FileNode>>>;

    async fn insert_chunk(&self, chunk: &ContentChunk) -> Result<()>;

    /// Every chunk of the project in insertion order.
    async fn list_chunks(&self, project_id: &str) -> Result<Vec<ContentChunk>>;

    /// Insert commits, skipping any `(project_id, commit_hash)` already
    /// stored. Returns the number actually inserted.
    async fn insert_commits(&self, commits: &[CommitRecord]) -> Result<usize>;

    /// Commits of the project, newest `committed_at` first.
    async fn list_commits(&self, project_id: &str) -> Result<Vec<CommitRecord>>;

    async fn save_question(&self, question: &QuestionRecord) -> Result<()>;

    /// Saved questions of the project, newest first.
    async fn list_questions(&self, project_id: &str) -> Result<Vec<QuestionRecord>>;
}
