//! Core data models used throughout RepoLens.
//!
//! These types represent the projects, retrieval chunks, commits, and saved
//! questions that flow through the ingestion and question-answering pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A linked GitHub repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub github_url: String,
    pub branch: String,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn new(name: &str, github_url: &str, branch: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            github_url: github_url.trim_end_matches('/').to_string(),
            branch: branch.to_string(),
            created_at: Utc::now(),
            archived_at: None,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

/// One stored retrieval unit: a source file, its summary, and the
/// embedding of that summary.
///
/// Chunks are immutable once inserted. Re-indexing a project inserts new
/// rows rather than updating old ones.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentChunk {
    pub id: String,
    pub project_id: String,
    /// Repository-relative path of the source file.
    pub file_name: String,
    pub source_code: String,
    pub summary: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl ContentChunk {
    pub fn new(
        project_id: &str,
        file_name: &str,
        source_code: String,
        summary: String,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            file_name: file_name.to_string(),
            source_code,
            summary,
            embedding,
            created_at: Utc::now(),
        }
    }

    /// Text matched by the lexical scorer: raw content followed by the summary.
    pub fn lexical_text(&self) -> String {
        format!("{} {}", self.source_code, self.summary)
    }
}

/// A file cited by an answer, as returned to callers and saved with a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileReference {
    pub file_name: String,
    pub source_code: String,
    pub summary: String,
    pub score: f64,
}

/// A summarized commit of a project's repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitRecord {
    pub project_id: String,
    pub commit_hash: String,
    pub message: String,
    pub author_name: String,
    pub author_avatar: String,
    pub committed_at: DateTime<Utc>,
    pub summary: String,
}

/// A question asked about a project together with the generated answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionRecord {
    pub id: String,
    pub project_id: String,
    pub question: String,
    pub answer: String,
    pub files_referenced: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl QuestionRecord {
    pub fn new(project_id: &str, question: &str, answer: &str, files: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
            files_referenced: files,
            created_at: Utc::now(),
        }
    }
}
