//! SQLite-backed [`Store`] implementation.
//!
//! Timestamps are stored as Unix milliseconds, embeddings as little-endian
//! `f32` BLOBs, file trees and referenced-file lists as JSON text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use repolens_core::embedding::{blob_to_vec, vec_to_blob};
use repolens_core::models::{CommitRecord, ContentChunk, Project, QuestionRecord};
use repolens_core::store::Store;
use repolens_core::tree::FileNode;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn project_from_row(row: &SqliteRow) -> Project {
    Project {
        id: row.get("id"),
        name: row.get("name"),
        github_url: row.get("github_url"),
        branch: row.get("branch"),
        created_at: from_millis(row.get("created_at")),
        archived_at: row.get::<Option<i64>, _>("archived_at").map(from_millis),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_project(&self, project: &Project) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, name, github_url, branch, created_at, archived_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.github_url)
        .bind(&project.branch)
        .bind(project.created_at.timestamp_millis())
        .bind(project.archived_at.map(|t| t.timestamp_millis()))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert project {}", project.id))?;
        Ok(())
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let row = sqlx::query(
            "SELECT id, name, github_url, branch, created_at, archived_at FROM projects WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(project_from_row))
    }

    async fn list_projects(&self, include_archived: bool) -> Result<Vec<Project>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, github_url, branch, created_at, archived_at
            FROM projects
            WHERE ? OR archived_at IS NULL
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(include_archived)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(project_from_row).collect())
    }

    async fn archive_project(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE projects SET archived_at = COALESCE(archived_at, ?) WHERE id = ?",
        )
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_file_tree(&self, project_id: &str, tree: &[FileNode]) -> Result<()> {
        let json = serde_json::to_string(tree)?;
        sqlx::query("UPDATE projects SET file_tree = ? WHERE id = ?")
            .bind(json)
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_file_tree(&self, project_id: &str) -> Result<Option<Vec<FileNode>>> {
        let json: Option<Option<String>> =
            sqlx::query_scalar("SELECT file_tree FROM projects WHERE id = ?")
                .bind(project_id)
                .fetch_optional(&self.pool)
                .await?;

        match json.flatten() {
            Some(text) => {
                let tree = serde_json::from_str(&text)
                    .with_context(|| format!("Corrupt file tree for project {}", project_id))?;
                Ok(Some(tree))
            }
            None => Ok(None),
        }
    }

    async fn insert_chunk(&self, chunk: &ContentChunk) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chunks (id, project_id, file_name, source_code, summary, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.project_id)
        .bind(&chunk.file_name)
        .bind(&chunk.source_code)
        .bind(&chunk.summary)
        .bind(vec_to_blob(&chunk.embedding))
        .bind(chunk.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_chunks(&self, project_id: &str) -> Result<Vec<ContentChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, file_name, source_code, summary, embedding, created_at
            FROM chunks
            WHERE project_id = ?
            ORDER BY rowid ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ContentChunk {
                    id: row.get("id"),
                    project_id: row.get("project_id"),
                    file_name: row.get("file_name"),
                    source_code: row.get("source_code"),
                    summary: row.get("summary"),
                    embedding: blob_to_vec(&blob),
                    created_at: from_millis(row.get("created_at")),
                }
            })
            .collect())
    }

    async fn insert_commits(&self, commits: &[CommitRecord]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        for c in commits {
            let result = sqlx::query(
                r#"
                INSERT INTO commits (project_id, commit_hash, message, author_name,
                                     author_avatar, committed_at, summary)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(project_id, commit_hash) DO NOTHING
                "#,
            )
            .bind(&c.project_id)
            .bind(&c.commit_hash)
            .bind(&c.message)
            .bind(&c.author_name)
            .bind(&c.author_avatar)
            .bind(c.committed_at.timestamp_millis())
            .bind(&c.summary)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn list_commits(&self, project_id: &str) -> Result<Vec<CommitRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT project_id, commit_hash, message, author_name, author_avatar,
                   committed_at, summary
            FROM commits
            WHERE project_id = ?
            ORDER BY committed_at DESC, rowid ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| CommitRecord {
                project_id: row.get("project_id"),
                commit_hash: row.get("commit_hash"),
                message: row.get("message"),
                author_name: row.get("author_name"),
                author_avatar: row.get("author_avatar"),
                committed_at: from_millis(row.get("committed_at")),
                summary: row.get("summary"),
            })
            .collect())
    }

    async fn save_question(&self, question: &QuestionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO questions (id, project_id, question, answer, files_referenced, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&question.id)
        .bind(&question.project_id)
        .bind(&question.question)
        .bind(&question.answer)
        .bind(serde_json::to_string(&question.files_referenced)?)
        .bind(question.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_questions(&self, project_id: &str) -> Result<Vec<QuestionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, question, answer, files_referenced, created_at
            FROM questions
            WHERE project_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let files: String = row.get("files_referenced");
                Ok(QuestionRecord {
                    id: row.get("id"),
                    project_id: row.get("project_id"),
                    question: row.get("question"),
                    answer: row.get("answer"),
                    files_referenced: serde_json::from_str(&files)
                        .with_context(|| "Corrupt files_referenced column")?,
                    created_at: from_millis(row.get("created_at")),
                })
            })
            .collect()
    }
}
